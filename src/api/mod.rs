//! API Module
//!
//! HTTP handlers and routing for the voice cache REST API.
//!
//! # Endpoints
//! - `POST|GET /sessions/:session/uploads` - Store or list user audio
//! - `POST /sessions/:session/generate` - Run a generation job
//! - `GET /sessions/:session/outputs` - List finished outputs
//! - `GET /sessions/:session/audio/:stage/:hash` - Fetch a payload
//! - `DELETE /sessions/:session/cache/:stage` - Purge a partition
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint
//!
//! The `global` session segment addresses the shared partition.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
