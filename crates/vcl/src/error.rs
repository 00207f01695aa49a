//! Error types for the vclc compiler

use thiserror::Error;

#[derive(Debug, Error)]
pub enum VclError {
    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Invalid service: {0}")]
    InvalidService(String),

    #[error("Invalid snippet: {0}")]
    InvalidSnippet(String),
}

pub type Result<T> = std::result::Result<T, VclError>;
