//! Core domain: identifiers and the shared domain error type.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::UserId;
