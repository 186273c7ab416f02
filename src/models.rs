use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::vote::VoteLedger;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IssueStatus {
    #[default]
    Submitted,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Rejected,
}

pub const VALID_STATUSES: [&str; 4] = ["Submitted", "In Progress", "Resolved", "Rejected"];

impl IssueStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueStatus::Submitted => "Submitted",
            IssueStatus::InProgress => "In Progress",
            IssueStatus::Resolved => "Resolved",
            IssueStatus::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "submitted" => Ok(IssueStatus::Submitted),
            "in progress" => Ok(IssueStatus::InProgress),
            "resolved" => Ok(IssueStatus::Resolved),
            "rejected" => Ok(IssueStatus::Rejected),
            _ => Err(format!(
                "Invalid status '{}'. Must be one of: {}",
                s,
                VALID_STATUSES.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Issue {
    pub id: i64,
    pub description: String,
    pub category: String,
    pub urgency: String,
    pub location: Location,
    pub image_url: String,
    pub status: IssueStatus,
    pub author: String,
    pub votes: VoteLedger,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// JSON form of an issue. The id is written under both `id` and `_id`; the web
/// client keys votes on `_id`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueJson<'a> {
    id: i64,
    #[serde(rename = "_id")]
    legacy_id: i64,
    description: &'a str,
    category: &'a str,
    urgency: &'a str,
    location: Location,
    image_url: &'a str,
    status: IssueStatus,
    author: &'a str,
    #[serde(flatten)]
    votes: &'a VoteLedger,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Serialize for Issue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        IssueJson {
            id: self.id,
            legacy_id: self.id,
            description: &self.description,
            category: &self.category,
            urgency: &self.urgency,
            location: self.location,
            image_url: &self.image_url,
            status: self.status,
            author: &self.author,
            votes: &self.votes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
        .serialize(serializer)
    }
}

/// Fields needed to insert an issue; id, status and votes are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub description: String,
    pub category: String,
    pub urgency: String,
    pub location: Location,
    pub image_url: String,
    pub author: String,
}
