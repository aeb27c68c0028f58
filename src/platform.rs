//! Platform family selection
//!
//! Unix-like systems report processes through `ps` in a fixed-width table,
//! Windows through `wmic` in repeating `Key=Value` blocks. Everything that
//! differs between the two is keyed off [`Platform`].

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    /// The platform family this binary was compiled for
    pub const fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Unix => f.write_str("unix"),
            Platform::Windows => f.write_str("windows"),
        }
    }
}

/// Identifier of the calling process, formatted like a snapshot pid
#[cfg(unix)]
pub fn current_pid() -> String {
    nix::unistd::getpid().to_string()
}

/// Identifier of the calling process, formatted like a snapshot pid
#[cfg(not(unix))]
pub fn current_pid() -> String {
    std::process::id().to_string()
}
