//! GitHub REST client for the issue tracker seam.
//!
//! Configuration comes from [`TrackerConfig`]:
//! - `repo` - `owner/name` of the target repository (required)
//! - `api_url` - API root (default: `https://api.github.com`)
//! - `token` - bearer token, usually from `GITHUB_TOKEN`

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use super::{IssueTracker, LabelSpec, MilestoneSpec};
use crate::config::TrackerConfig;
use crate::models::RemoteRef;

const USER_AGENT: &str = concat!("plan-tracker/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// Remote tracker errors. The sync coordinator treats every variant as
/// "remote unavailable" for the item at hand.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: token missing or invalid")]
    Unauthorized,

    #[error("Rejected: {0}")]
    Unprocessable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    number: RemoteRef,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MilestoneResponse {
    number: i64,
    title: String,
}

/// Issue tracker backed by the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    api_url: String,
    repo: String,
    token: Option<String>,
    client: Client,
}

impl GitHubClient {
    pub fn from_config(config: &TrackerConfig) -> anyhow::Result<Self> {
        let repo = config
            .repo
            .clone()
            .ok_or_else(|| anyhow::anyhow!("No repository configured (set TRACKER_REPO)"))?;
        if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
            anyhow::bail!("Repository must be owner/name, got {:?}", repo);
        }
        Ok(Self::new(&config.api_url, repo, config.token.clone()))
    }

    /// Create with explicit configuration.
    pub fn new(api_url: impl Into<String>, repo: impl Into<String>, token: Option<String>) -> Self {
        Self {
            api_url: api_url.into(),
            repo: repo.into(),
            token,
            client: Client::new(),
        }
    }

    /// `<api_url>/repos/<owner>/<name>/<segments...>`, each segment encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url =
            Url::parse(&self.api_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.api_url.clone()))?
            .pop_if_empty()
            .push("repos")
            .extend(self.repo.split('/'))
            .extend(segments);
        Ok(url)
    }

    /// Build a request with the headers GitHub expects.
    fn request(&self, method: Method, segments: &[&str]) -> Result<reqwest::RequestBuilder, ClientError> {
        let url = self.url(segments)?;
        tracing::debug!("{} {}", method, url);
        let mut req = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    /// Handle response, converting HTTP errors to ClientError.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Handle a response whose body is not needed.
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<(), ClientError> {
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(ClientError::NotFound(body)),
        StatusCode::BAD_REQUEST => Err(ClientError::BadRequest(body)),
        StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
        StatusCode::UNPROCESSABLE_ENTITY => Err(ClientError::Unprocessable(body)),
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            Err(ClientError::RateLimited(body))
        }
        _ => Err(ClientError::Server(format!("{}: {}", status, body))),
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<RemoteRef, ClientError> {
        let response = self
            .request(Method::POST, &["issues"])?
            .json(&json!({ "title": title, "body": body, "labels": labels }))
            .send()
            .await?;
        let issue: IssueResponse = self.handle_response(response).await?;
        Ok(issue.number)
    }

    async fn edit_issue(&self, number: RemoteRef, body: &str) -> Result<(), ClientError> {
        let number = number.to_string();
        let response = self
            .request(Method::PATCH, &["issues", &number])?
            .json(&json!({ "body": body }))
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    async fn add_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError> {
        let number = number.to_string();
        let response = self
            .request(Method::POST, &["issues", &number, "labels"])?
            .json(&json!({ "labels": [label] }))
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    async fn remove_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError> {
        let number = number.to_string();
        let response = self
            .request(Method::DELETE, &["issues", &number, "labels", label])?
            .send()
            .await?;
        match self.handle_empty_response(response).await {
            Err(ClientError::NotFound(_)) => Ok(()),
            other => other,
        }
    }

    async fn close_issue(&self, number: RemoteRef) -> Result<(), ClientError> {
        let number = number.to_string();
        let response = self
            .request(Method::PATCH, &["issues", &number])?
            .json(&json!({ "state": "closed" }))
            .send()
            .await?;
        self.handle_empty_response(response).await
    }

    async fn list_labels(&self, number: RemoteRef) -> Result<BTreeSet<String>, ClientError> {
        let number = number.to_string();
        let response = self
            .request(Method::GET, &["issues", &number, "labels"])?
            .query(&[("per_page", "100")])
            .send()
            .await?;
        let labels: Vec<LabelResponse> = self.handle_response(response).await?;
        Ok(labels.into_iter().map(|l| l.name).collect())
    }

    async fn ensure_label(&self, label: &LabelSpec) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, &["labels"])?
            .json(&json!({
                "name": label.name,
                "color": label.color,
                "description": label.description,
            }))
            .send()
            .await?;
        match self.handle_empty_response(response).await {
            // Already exists; bring colour and description up to date.
            Err(ClientError::Unprocessable(_)) => {
                let response = self
                    .request(Method::PATCH, &["labels", &label.name])?
                    .json(&json!({
                        "color": label.color,
                        "description": label.description,
                    }))
                    .send()
                    .await?;
                self.handle_empty_response(response).await
            }
            other => other,
        }
    }

    async fn ensure_milestone(&self, milestone: &MilestoneSpec) -> Result<(), ClientError> {
        let response = self
            .request(Method::POST, &["milestones"])?
            .json(&json!({
                "title": milestone.title,
                "description": milestone.description,
            }))
            .send()
            .await?;
        match self.handle_empty_response(response).await {
            // Title taken; find that milestone and refresh its description.
            Err(ClientError::Unprocessable(_)) => {
                let response = self
                    .request(Method::GET, &["milestones"])?
                    .query(&[("state", "all"), ("per_page", "100")])
                    .send()
                    .await?;
                let existing: Vec<MilestoneResponse> = self.handle_response(response).await?;
                let number = existing
                    .into_iter()
                    .find(|m| m.title == milestone.title)
                    .map(|m| m.number.to_string())
                    .ok_or_else(|| ClientError::NotFound(format!("milestone {:?}", milestone.title)))?;

                let response = self
                    .request(Method::PATCH, &["milestones", &number])?
                    .json(&json!({ "description": milestone.description }))
                    .send()
                    .await?;
                self.handle_empty_response(response).await
            }
            other => other,
        }
    }
}
