//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Housekeeping: Purges sessions that have been idle for too long and
//!   removes payloads no metadata lists

mod housekeeping;

pub use housekeeping::{purge_stale_sessions, spawn_housekeeping_task, sweep_unlisted_payloads};
