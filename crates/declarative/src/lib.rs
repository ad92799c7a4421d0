//! # Declarative
//!
//! Desired-state reconciliation for structured (JSON) documents.
//!
//! This crate answers one question: given the document a caller wants, the
//! document currently stored (if any) and whether the caller wants it to
//! exist, what single operation converges the two?
//!
//! ## Core Concepts
//!
//! - **RequestedState**: `Present` or `Absent`
//! - **Decision**: `NoOp`, `Create`, `Update { changes }` or `Delete`
//! - **FieldChange**: one differing field, addressed by a [`FieldPath`]
//! - **DiffOptions**: field patterns to leave out of the comparison
//!
//! ## Example
//!
//! ```
//! use declarative::{decide, Decision, RequestedState};
//! use serde_json::json;
//!
//! let desired = json!({"id": "nginx", "instances": 2});
//! let current = json!({"id": "nginx", "instances": 1, "version": "2024-01-15"});
//!
//! let decision = decide(
//!     desired.as_object().unwrap(),
//!     current.as_object(),
//!     RequestedState::Present,
//! );
//!
//! match decision {
//!     Decision::Update { changes } => assert_eq!(changes[0].path.to_string(), "instances"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
//!
//! The differ is a pure function: it never touches either document and
//! returns the same decision for the same inputs.

pub mod diff;
pub mod types;

// Re-export main types at crate root
pub use diff::{DiffOptions, FieldPattern, decide, decide_with, diff_fields};
pub use types::{Decision, FieldChange, FieldPath, RequestedState, Segment};
