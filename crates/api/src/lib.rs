//! HTTP API: C5 (ingest) and C7 (query) as axum handlers.

pub mod app;
pub mod context;
pub mod middleware;
