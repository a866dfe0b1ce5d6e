//! Voice Cache - staged, content-addressed audio cache for voice generation
//!
//! Runs user audio and text through preprocessing, an external model server
//! and postprocessing, memoizing every stage on disk per session.

pub mod api;
pub mod boundary;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod tasks;
pub mod workers;

pub use api::AppState;
pub use config::Config;
pub use error::{Result, VoiceCacheError};
pub use tasks::spawn_housekeeping_task;
