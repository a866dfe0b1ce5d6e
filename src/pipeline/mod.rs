//! Pipeline Module
//!
//! Hash chaining, typed stage options and the orchestrator that runs a
//! request through the four stages.

pub mod hash_chain;
mod options;
mod orchestrator;
mod transforms;

pub use hash_chain::{canonical_string, content_digest, next_hash, HASH_LENGTH};
pub use options::{GenerationJob, OptionSet, PostprocessOptions, PreprocessOptions};
pub use orchestrator::{LineageEntry, Pipeline, UploadReceipt};
pub use transforms::{AudioTransforms, PassthroughTransforms};
