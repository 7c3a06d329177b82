//! Traversal errors.
//!
//! These are deliberately distinct from [`vmck_kernel::ConfigError`]: a
//! configuration error is fatal for the run, while a traversal error may be
//! retried by the driver after a prerequisite step (e.g. forcing class
//! initialization). Either way there is no partial state image — any failure
//! aborts the whole serialization call.

use thiserror::Error;
use vmck_kernel::ObjRef;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TraversalError {
    #[error("class '{class}' is not initialized; initialize it before serializing")]
    UninitializedClass { class: String },

    #[error("unrecognized storage kind for field '{class}.{field}' (size {size} words)")]
    UnrecognizedFieldKind {
        class: String,
        field: String,
        size: usize,
    },

    #[error("dangling heap reference {reference} encountered during traversal")]
    DanglingReference { reference: ObjRef },
}
