use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One entry of a JSON:API `errors` array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("api error (http {status}) on {url}: {}", join_details(.errors))]
    Api {
        status: u16,
        url: String,
        errors: Vec<ApiErrorDetail>,
    },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },
    #[error("{0}")]
    Message(String),
}

impl ClientError {
    /// Structured detail texts reported by the API, when the failure carried any.
    pub fn details(&self) -> Vec<String> {
        match self {
            ClientError::Api { errors, .. } => errors
                .iter()
                .filter_map(|error| error.detail.clone().or_else(|| error.title.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn join_details(errors: &[ApiErrorDetail]) -> String {
    let details = errors
        .iter()
        .filter_map(|error| error.detail.as_deref().or(error.title.as_deref()))
        .collect::<Vec<_>>();
    if details.is_empty() {
        "no details".to_string()
    } else {
        details.join(", ")
    }
}
