//! Environment-variable runtime configuration.
//!
//! The core subsystems never read configuration themselves; only the binary
//! loads this at startup and passes explicit values down.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `BRKW_LISTEN_ADDR` | `127.0.0.1:8080` | Address the HTTP server binds to |
//! | `BRKW_DISPATCH_WORKERS` | `1` | Job dispatcher worker threads |

use std::env;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Address the HTTP server binds to.
    pub listen_addr: String,
    /// Number of job dispatcher worker threads. Per-category ordering is
    /// preserved for any count.
    pub dispatch_workers: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen_addr =
            env::var("BRKW_LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let dispatch_workers = env::var("BRKW_DISPATCH_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n > 0)
            .unwrap_or(1);
        Self {
            listen_addr,
            dispatch_workers,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            dispatch_workers: 1,
        }
    }
}
