use std::path::PathBuf;
use std::sync::mpsc::SendError;

use thiserror::Error;

use crate::progress::StatusMessage;

pub type Result<T> = std::result::Result<T, ProvaidError>;

#[derive(Error, Debug)]
pub enum ProvaidError {
    #[error("Malformed {kind} rule: {reason}")]
    MalformedRule { kind: &'static str, reason: String },
    #[error("Obligation references unknown attribute {name}[{index}]")]
    DanglingReference { name: String, index: usize },
    #[error("Duplicate attribute capsule {0} in one rule container")]
    DuplicateCapsule(String),
    #[error("Cannot resolve prefix of action name {0}")]
    UnknownPrefix(String),
    #[error("Expected exactly one {what}, found {count}")]
    NotUnique { what: String, count: usize },
    #[error("Case should be unreachable: {0}")]
    IllegalCase(String),
    #[error("The provenance graph contains a cycle among components: {0:?}")]
    CyclicGraph(Vec<String>),
    #[error("Cannot load rule database {path}: {reason}")]
    RuleDatabase { path: PathBuf, reason: String },
    #[error("Cannot load provenance graph from {url}: {reason}")]
    LoadGraph { url: String, reason: String },
    #[error(
        "No provenance client available for endpoint {0} (only file:// endpoints are served by this binary)"
    )]
    UnsupportedEndpoint(String),
    #[error("Error during propagation at component {component}: {reason}")]
    Propagation { component: String, reason: String },
    #[error("Could not send status message: {0}")]
    SendingStatusMessageFailed(String),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<SendError<StatusMessage>> for ProvaidError {
    fn from(e: SendError<StatusMessage>) -> Self {
        ProvaidError::SendingStatusMessageFailed(e.to_string())
    }
}
