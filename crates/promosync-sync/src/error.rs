use promosync_client::ClientError;
use promosync_core::{RelationType, ResourceType};
use thiserror::Error;

/// Generic text recorded for a failed promotion when the API gave no structured detail.
pub const GENERIC_WRITE_FAILURE: &str = "could not sync promotion";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unsupported custom rule predicate `{predicate}`")]
    UnsupportedPredicate { predicate: String },
    #[error("duplicate {resource} compare key `{key}`")]
    DuplicateCompareKey { resource: ResourceType, key: String },
    #[error("{relation} `{key}` has no counterpart in the target environment")]
    UnresolvedRelationship { relation: RelationType, key: String },
    #[error("{relation} `{id}` is missing from the source relationships")]
    UnknownSourceRelationship { relation: RelationType, id: String },
    #[error("promotion `{name}` is a {source_type} in the source but a {target_type} in the target")]
    KindMismatch {
        name: String,
        source_type: ResourceType,
        target_type: ResourceType,
    },
    #[error("could not decode {resource}: {message}")]
    Decode { resource: String, message: String },
    #[error(transparent)]
    Client(#[from] ClientError),
}

impl SyncError {
    /// Text reported for a failed promotion write. Client failures report the
    /// API's detail messages, or a generic message when there are none; local
    /// failures report themselves.
    pub fn write_detail(&self) -> String {
        let SyncError::Client(err) = self else {
            return self.to_string();
        };
        let details = err.details();
        if details.is_empty() {
            GENERIC_WRITE_FAILURE.to_string()
        } else {
            details.join(", ")
        }
    }
}
