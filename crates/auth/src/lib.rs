//! Auth: JWT claims carrying a trusted caller identity.
//!
//! User registration and token issuance are external collaborators (see
//! spec §6); this crate only validates a bearer token and hands back the
//! caller's identity to the pipeline.

pub mod claims;

pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError};
