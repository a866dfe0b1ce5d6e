//! Stage and Session Partition Module
//!
//! Names the four pipeline stages and the session partitions that scope them.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Result, VoiceCacheError};

/// Longest accepted session identifier.
pub const MAX_SESSION_ID_LENGTH: usize = 128;

/// Path segment that addresses the shared partition.
pub const GLOBAL_SESSION: &str = "global";

// == Stage ==
/// One of the four fixed pipeline phases, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Audio supplied by the user
    Raw,
    /// User audio after preprocessing
    Preprocessed,
    /// Model output, untouched
    Output,
    /// Model output after postprocessing
    Postprocessed,
}

impl Stage {
    /// All stages, RAW first.
    pub const ALL: [Stage; 4] = [
        Stage::Raw,
        Stage::Preprocessed,
        Stage::Output,
        Stage::Postprocessed,
    ];

    /// Directory / URL name of the stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Raw => "raw",
            Stage::Preprocessed => "preprocessed",
            Stage::Output => "output",
            Stage::Postprocessed => "postprocessed",
        }
    }

    /// The stage whose entries this stage's entries descend from.
    pub fn parent(self) -> Option<Stage> {
        match self {
            Stage::Raw => None,
            Stage::Preprocessed => Some(Stage::Raw),
            Stage::Output => Some(Stage::Preprocessed),
            Stage::Postprocessed => Some(Stage::Output),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = VoiceCacheError;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| VoiceCacheError::InvalidRequest(format!("unknown stage '{}'", s)))
    }
}

// == Session ==
/// Scope of an independent copy of the four stage stores.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Session {
    /// Shared partition used when session isolation is off
    Global,
    /// Partition owned by one opaque session identifier
    Id(String),
}

impl Session {
    /// Parses a session identifier, mapping `global` to the shared partition.
    ///
    /// Identifiers end up as directory names, so only ASCII alphanumerics,
    /// `-` and `_` are accepted.
    pub fn parse(id: &str) -> Result<Self> {
        if id == GLOBAL_SESSION {
            return Ok(Session::Global);
        }
        if id.is_empty() || id.len() > MAX_SESSION_ID_LENGTH {
            return Err(VoiceCacheError::InvalidRequest(format!(
                "session id must be 1 to {} characters",
                MAX_SESSION_ID_LENGTH
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(VoiceCacheError::InvalidRequest(format!(
                "session id '{}' contains invalid characters",
                id
            )));
        }
        Ok(Session::Id(id.to_string()))
    }

    /// The identifier sent to model servers; `None` for the shared partition.
    pub fn id(&self) -> Option<&str> {
        match self {
            Session::Global => None,
            Session::Id(id) => Some(id),
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Session::Global => f.write_str(GLOBAL_SESSION),
            Session::Id(id) => f.write_str(id),
        }
    }
}
