use anyhow::Context;
use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::JsonRejection,
        FromRequestParts, Multipart, Path, State,
    },
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::classify::ImageUpload;
use crate::error::AppError;
use crate::models::{Issue, IssueStatus, Location, NewIssue};
use crate::vote::VoteDirection;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginUser {
    pub username: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub identity: String,
    pub user: LoginUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub user_id: String,
    pub vote_type: String,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Issue id from the path. A segment that is not an integer names no issue,
/// so it is rejected as not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueId(pub i64);

impl<S: Send + Sync> FromRequestParts<S> for IssueId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::not_found("?"))?;
        raw.trim()
            .parse()
            .map(IssueId)
            .map_err(|_| AppError::not_found(raw))
    }
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let Json(payload) = payload?;
    let identity = state
        .credentials
        .authenticate(&payload.username, &payload.password)
        .ok_or(AppError::Unauthorized)?;

    info!(user = identity.as_str(), "Login successful");
    Ok(Json(LoginResponse {
        identity: identity.0.clone(),
        user: LoginUser {
            username: identity.0,
        },
    }))
}

/// Raw multipart fields of an issue submission, before validation.
#[derive(Debug, Default)]
pub struct SubmissionForm {
    pub author: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub image: Option<ImageUpload>,
}

#[derive(Debug)]
pub struct Submission {
    pub author: String,
    pub location: Location,
    pub image: ImageUpload,
}

impl SubmissionForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = SubmissionForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let file_name = field.file_name().unwrap_or("upload").to_string();
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await?;
                    form.image = Some(ImageUpload {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                "author" => form.author = Some(text(field).await?),
                "lat" | "latitude" => form.lat = Some(text(field).await?),
                "lng" | "longitude" => form.lng = Some(text(field).await?),
                _ => {}
            }
        }

        Ok(form)
    }

    /// Checks author, then image, then coordinates.
    pub fn validate(self) -> Result<Submission, AppError> {
        let author = self
            .author
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| AppError::validation("Author is required."))?;

        let image = self
            .image
            .filter(|img| !img.bytes.is_empty())
            .ok_or_else(|| AppError::validation("Image is required."))?;

        let lat = parse_coordinate("lat", self.lat.as_deref(), 90.0)?;
        let lng = parse_coordinate("lng", self.lng.as_deref(), 180.0)?;

        Ok(Submission {
            author,
            location: Location { lat, lng },
            image,
        })
    }
}

fn parse_coordinate(name: &str, raw: Option<&str>, limit: f64) -> Result<f64, AppError> {
    let raw = raw.ok_or_else(|| AppError::validation(format!("{} is required.", name)))?;
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::validation(format!("{} must be a number, got '{}'.", name, raw)))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(AppError::validation(format!(
            "{} must be between -{} and {}.",
            name, limit, limit
        )));
    }
    Ok(value)
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    Ok(field.text().await?)
}

pub async fn create_issue(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Issue>), AppError> {
    let submission = SubmissionForm::read(multipart?).await?.validate()?;

    // Classification gates persistence: nothing is written if it fails.
    let classification = state.classifier.classify(&submission.image).await?;

    let stored = state
        .images
        .save(&submission.image.file_name, &submission.image.bytes)
        .await?;

    let new_issue = NewIssue {
        description: classification.description,
        category: classification.category,
        urgency: classification.urgency,
        location: submission.location,
        image_url: stored.url.clone(),
        author: submission.author,
    };

    let created = state
        .with_db(move |db| {
            let id = db.create_issue(&new_issue)?;
            db.get_issue(id)?
                .with_context(|| format!("Issue #{} missing after insert", id))
        })
        .await;

    match created {
        Ok(issue) => {
            info!(issue_id = issue.id, author = %issue.author, category = %issue.category, "Created issue");
            Ok((StatusCode::CREATED, Json(issue)))
        }
        Err(e) => {
            state.images.remove(&stored).await;
            Err(e)
        }
    }
}

pub async fn list_issues(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Issue>>, AppError> {
    let issues = state.with_db(|db| db.list_issues()).await?;
    Ok(Json(issues))
}

pub async fn list_issues_by_author(
    State(state): State<Arc<AppState>>,
    Path(author): Path<String>,
) -> Result<Json<Vec<Issue>>, AppError> {
    let issues = state
        .with_db(move |db| db.list_issues_by_author(&author))
        .await?;
    Ok(Json(issues))
}

pub async fn get_issue(
    State(state): State<Arc<AppState>>,
    IssueId(id): IssueId,
) -> Result<Json<Issue>, AppError> {
    let issue = state
        .with_db(move |db| db.get_issue(id))
        .await?
        .ok_or_else(|| AppError::not_found(id))?;
    Ok(Json(issue))
}

pub async fn vote(
    State(state): State<Arc<AppState>>,
    IssueId(id): IssueId,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> Result<Json<Issue>, AppError> {
    let Json(payload) = payload?;
    let voter = payload.user_id.trim().to_string();
    if voter.is_empty() {
        return Err(AppError::validation("userId is required."));
    }
    let direction: VoteDirection = payload.vote_type.parse().map_err(AppError::Validation)?;

    let issue = state
        .with_db(move |db| db.apply_vote(id, &voter, direction))
        .await?
        .ok_or_else(|| AppError::not_found(id))?;
    Ok(Json(issue))
}

pub async fn update_status(
    State(state): State<Arc<AppState>>,
    IssueId(id): IssueId,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Issue>, AppError> {
    let Json(payload) = payload?;
    let status: IssueStatus = payload.status.parse().map_err(AppError::Validation)?;

    let issue = state
        .with_db(move |db| db.update_status(id, status))
        .await?
        .ok_or_else(|| AppError::not_found(id))?;

    info!(issue_id = id, status = %status, "Updated issue status");
    Ok(Json(issue))
}
