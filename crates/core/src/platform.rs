//! Platform capability levels
//!
//! Operations that only exist on newer platform releases are gated on a
//! `PlatformLevel`. Levels are totally ordered by release, and each belongs to
//! a family (client or server lineage) for gates that accept either lineage.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformFamily {
    /// Workstation releases
    Client,
    /// Server releases
    Server,
}

/// Capability level of the running platform, ordered by release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlatformLevel {
    /// Baseline workstation: backup context only
    Xp,
    /// Adds non-backup contexts, exposure, restore state, break and import
    Server2003,
    /// Adds revert
    Server2003Sp1,
    /// Workstation lineage successor
    Vista,
    /// Newest server lineage
    Server2008,
}

impl PlatformLevel {
    /// All levels in release order
    pub const ALL: [PlatformLevel; 5] = [
        PlatformLevel::Xp,
        PlatformLevel::Server2003,
        PlatformLevel::Server2003Sp1,
        PlatformLevel::Vista,
        PlatformLevel::Server2008,
    ];

    /// Lineage this level belongs to
    pub fn family(&self) -> PlatformFamily {
        match self {
            PlatformLevel::Xp | PlatformLevel::Vista => PlatformFamily::Client,
            PlatformLevel::Server2003 | PlatformLevel::Server2003Sp1 | PlatformLevel::Server2008 => {
                PlatformFamily::Server
            }
        }
    }

    /// Configuration name (lowercase)
    pub fn name(&self) -> &'static str {
        match self {
            PlatformLevel::Xp => "xp",
            PlatformLevel::Server2003 => "server2003",
            PlatformLevel::Server2003Sp1 => "server2003sp1",
            PlatformLevel::Vista => "vista",
            PlatformLevel::Server2008 => "server2008",
        }
    }

    /// Parse a configuration name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        Self::ALL.into_iter().find(|level| level.name() == lower)
    }

    /// At least `required`, by release order
    pub fn at_least(&self, required: PlatformLevel) -> bool {
        *self >= required
    }

    /// At least `required` within `required`'s own family
    pub fn at_least_in_family(&self, required: PlatformLevel) -> bool {
        self.family() == required.family() && *self >= required
    }
}

impl fmt::Display for PlatformLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlatformLevel::Xp => "Xp",
            PlatformLevel::Server2003 => "Server2003",
            PlatformLevel::Server2003Sp1 => "Server2003Sp1",
            PlatformLevel::Vista => "Vista",
            PlatformLevel::Server2008 => "Server2008",
        };
        f.write_str(label)
    }
}
