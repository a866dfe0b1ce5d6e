//! Request and Response models for the voice cache API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{GenerateRequest, UploadRequest};
pub use responses::{
    ErrorResponse, GenerateResponse, HealthResponse, OutputSummary, OutputsResponse,
    PurgeResponse, StatsResponse, UploadResponse, UploadedFile, UploadsResponse,
};
