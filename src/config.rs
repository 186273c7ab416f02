use anyhow::Result;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::CredentialTable;
use crate::classify::DEFAULT_CLASSIFIER_URL;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "CIVIC_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CIVIC_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Directory uploaded images are written to and served from
    #[arg(long, env = "CIVIC_UPLOADS_DIR", default_value = "uploads")]
    pub uploads_dir: PathBuf,

    /// Base URL used when building image links (defaults to http://localhost:<port>)
    #[arg(long, env = "CIVIC_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Image classification endpoint
    #[arg(long, env = "CIVIC_CLASSIFIER_URL", default_value = DEFAULT_CLASSIFIER_URL)]
    pub classifier_url: String,

    /// Seconds to wait for the classification service
    #[arg(long, env = "CIVIC_CLASSIFIER_TIMEOUT_SECS", default_value_t = 30)]
    pub classifier_timeout_secs: u64,

    /// JSON file with [{"username", "password"}] entries allowed to log in
    #[arg(long, env = "CIVIC_USERS_FILE")]
    pub users_file: Option<PathBuf>,

    /// Built web client to serve for unmatched paths
    #[arg(long, env = "CIVIC_CLIENT_DIR")]
    pub client_dir: Option<PathBuf>,

    /// Largest accepted multipart upload, in bytes
    #[arg(long, env = "CIVIC_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub uploads_dir: PathBuf,
    pub public_url: String,
    pub classifier_url: String,
    pub classifier_timeout: Duration,
    pub client_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    pub fn from_args(args: &ServeArgs) -> Self {
        ServerConfig {
            bind: format!("{}:{}", args.host, args.port),
            uploads_dir: args.uploads_dir.clone(),
            public_url: args
                .public_url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}", args.port)),
            classifier_url: args.classifier_url.clone(),
            classifier_timeout: Duration::from_secs(args.classifier_timeout_secs),
            client_dir: args.client_dir.clone(),
            max_upload_bytes: args.max_upload_bytes,
        }
    }
}

pub fn load_credentials(args: &ServeArgs) -> Result<CredentialTable> {
    match &args.users_file {
        Some(path) => {
            let table = CredentialTable::load(path)?;
            tracing::info!(users = table.len(), path = %path.display(), "Loaded credentials");
            Ok(table)
        }
        None => {
            tracing::warn!("No users file configured, every login will be rejected");
            Ok(CredentialTable::default())
        }
    }
}
