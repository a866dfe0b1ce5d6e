//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Storage backend behind the cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// One directory per (session, stage) under `cache_root`
    File,
    /// Process-local document store
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(BackendKind::File),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown cache backend '{}'", other)),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the file backend
    pub cache_root: PathBuf,
    /// Maximum number of entries per (stage, session) partition
    pub max_entries: usize,
    /// When false every request shares the global partition
    pub session_isolation: bool,
    /// Selected storage backend
    pub backend: BackendKind,
    /// Housekeeping interval in seconds
    pub housekeeping_interval: u64,
    /// Sessions idle for longer than this many seconds are purged
    pub session_max_age: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Overrides `<model-id>_server` as the host of every model server
    pub model_host: Option<String>,
    /// Hard deadline in seconds for one model server call
    pub model_timeout: u64,
    /// Size of the worker pool that runs without an accelerator
    pub cpu_workers: usize,
    /// Size of the accelerator-pinned worker pool
    pub gpu_workers: usize,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(env::temp_dir)
        .join("hay_say")
        .join("audio_cache")
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_ROOT` - File backend root (default: ~/hay_say/audio_cache)
    /// - `MAX_ENTRIES` - Entries per stage and session, at least 1 (default: 25)
    /// - `SESSION_ISOLATION` - Partition the cache per session (default: true)
    /// - `CACHE_BACKEND` - `file` or `memory` (default: file)
    /// - `HOUSEKEEPING_INTERVAL` - Seconds between session purges (default: 3600)
    /// - `SESSION_MAX_AGE` - Idle seconds before a session is purged (default: 86400)
    /// - `SERVER_PORT` - HTTP server port (default: 6573)
    /// - `MODEL_HOST` - Host used for every model server (default: unset)
    /// - `MODEL_TIMEOUT` - Model call deadline in seconds (default: 600)
    /// - `CPU_WORKERS` / `GPU_WORKERS` - Worker pool sizes (default: 2 / 0)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_root: env::var("CACHE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_root),
            // A partition must be able to hold the entry being written
            max_entries: Some(env_or("MAX_ENTRIES", defaults.max_entries))
                .filter(|&n| n > 0)
                .unwrap_or(defaults.max_entries),
            session_isolation: env_or("SESSION_ISOLATION", defaults.session_isolation),
            backend: env_or("CACHE_BACKEND", defaults.backend),
            housekeeping_interval: env_or("HOUSEKEEPING_INTERVAL", defaults.housekeeping_interval),
            session_max_age: env_or("SESSION_MAX_AGE", defaults.session_max_age),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            model_host: env::var("MODEL_HOST").ok().filter(|h| !h.is_empty()),
            model_timeout: env_or("MODEL_TIMEOUT", defaults.model_timeout),
            cpu_workers: env_or("CPU_WORKERS", defaults.cpu_workers),
            gpu_workers: env_or("GPU_WORKERS", defaults.gpu_workers),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: default_cache_root(),
            max_entries: 25,
            session_isolation: true,
            backend: BackendKind::File,
            housekeeping_interval: 3600,
            session_max_age: 24 * 3600,
            server_port: 6573,
            model_host: None,
            model_timeout: 600,
            cpu_workers: 2,
            gpu_workers: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_entries, 25);
        assert!(config.session_isolation);
        assert_eq!(config.backend, BackendKind::File);
        assert_eq!(config.housekeeping_interval, 3600);
        assert_eq!(config.session_max_age, 86400);
        assert!(config.cache_root.ends_with("hay_say/audio_cache"));
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("file".parse::<BackendKind>(), Ok(BackendKind::File));
        assert_eq!("Memory".parse::<BackendKind>(), Ok(BackendKind::Memory));
        assert!("mongo".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("MAX_ENTRIES");
        env::remove_var("CACHE_BACKEND");
        env::remove_var("MODEL_HOST");
        env::remove_var("GPU_WORKERS");

        let config = Config::from_env();
        assert_eq!(config.max_entries, 25);
        assert_eq!(config.backend, BackendKind::File);
        assert!(config.model_host.is_none());
        assert_eq!(config.gpu_workers, 0);
    }

    #[test]
    fn test_zero_max_entries_falls_back_to_default() {
        env::set_var("MAX_ENTRIES", "0");
        let config = Config::from_env();
        env::remove_var("MAX_ENTRIES");
        assert_eq!(config.max_entries, 25);
    }
}
