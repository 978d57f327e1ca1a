//! Error types for taskorder
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown item, not initialized)
//! - 3: Hierarchy rejected (self reference, cycle, invalid parent, kept children)
//! - 4: Operation failed (io, lock, stale record, rebalance failure)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the taskorder CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const HIERARCHY_REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for ordering operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Store not initialized at {0}")]
    NotInitialized(PathBuf),

    // Hierarchy violations (exit code 3)
    #[error("Item {item_id} cannot be its own parent")]
    SelfReference { item_id: String },

    #[error("Setting parent of {item_id} to {parent_id} would create a cycle")]
    Cycle { item_id: String, parent_id: String },

    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    #[error("Item {item_id} still has {children} kept child item(s)")]
    HasKeptChildren { item_id: String, children: usize },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Stale record for {item_id}: expected version {expected}, found {found}")]
    StaleRecord {
        item_id: String,
        expected: u64,
        found: u64,
    },

    #[error("Rebalance failed for {scope}: {reason}")]
    RebalanceFailed { scope: String, reason: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            // User errors
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::ItemNotFound(_)
            | Error::NotInitialized(_) => exit_codes::USER_ERROR,

            // Hierarchy violations
            Error::SelfReference { .. }
            | Error::Cycle { .. }
            | Error::InvalidParent(_)
            | Error::HasKeptChildren { .. } => exit_codes::HIERARCHY_REJECTED,

            // Operation failures
            Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::StaleRecord { .. }
            | Error::RebalanceFailed { .. }
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// True for errors raised by the hierarchy guard or tombstone check
    pub fn is_hierarchy_violation(&self) -> bool {
        self.exit_code() == exit_codes::HIERARCHY_REJECTED
    }

    /// Structured payload for the JSON error envelope
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::SelfReference { item_id } => Some(serde_json::json!({ "item_id": item_id })),
            Error::Cycle { item_id, parent_id } => Some(serde_json::json!({
                "item_id": item_id,
                "parent_id": parent_id,
            })),
            Error::HasKeptChildren { item_id, children } => Some(serde_json::json!({
                "item_id": item_id,
                "children": children,
            })),
            Error::StaleRecord {
                item_id,
                expected,
                found,
            } => Some(serde_json::json!({
                "item_id": item_id,
                "expected": expected,
                "found": found,
            })),
            _ => None,
        }
    }
}

/// Result type alias for ordering operations
pub type Result<T> = std::result::Result<T, Error>;
