//! Firmware version comparison.
//!
//! The update server reports the newest available version as a string; an
//! update is taken only when it compares strictly greater than the running
//! version under this total order.

use std::fmt;

/// `major.minor.patch` with an optional leading `v`/`V`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl FirmwareVersion {
    /// Parse "1.2.3" or "v1.2.3". Anything else (including extra components)
    /// is rejected.
    pub fn parse(version: &str) -> Option<Self> {
        let version = version.trim();
        let version = version
            .strip_prefix('v')
            .or_else(|| version.strip_prefix('V'))
            .unwrap_or(version);

        let mut parts = version.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
