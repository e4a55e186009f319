//! Capability gate
//!
//! Operations that only exist on newer platform releases consult the gate
//! before any native call. A rejection has no side effects.

use shadowset_core::{OrchestrationError, PlatformLevel, Result};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Source of the running platform's capability level
pub trait PlatformInfo: Send + Sync {
    /// Capability level of the running platform
    fn level(&self) -> PlatformLevel;
}

/// Platform descriptor with a fixed level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticPlatform(pub PlatformLevel);

impl PlatformInfo for StaticPlatform {
    fn level(&self) -> PlatformLevel {
        self.0
    }
}

/// Checks platform capability levels for gated operations
#[derive(Clone)]
pub struct CapabilityGate {
    platform: Arc<dyn PlatformInfo>,
}

impl CapabilityGate {
    /// Gate backed by a platform descriptor
    pub fn new(platform: Arc<dyn PlatformInfo>) -> Self {
        Self { platform }
    }

    /// Gate for a fixed level
    pub fn fixed(level: PlatformLevel) -> Self {
        Self::new(Arc::new(StaticPlatform(level)))
    }

    /// Level of the running platform
    pub fn level(&self) -> PlatformLevel {
        self.platform.level()
    }

    /// Check whether the running level is at least `required`
    pub fn supports(&self, required: PlatformLevel) -> bool {
        self.level().at_least(required)
    }

    /// Require at least `required`, by release order
    ///
    /// # Errors
    ///
    /// `UnsupportedOnPlatform` if the running level is below `required`.
    pub fn require(&self, operation: &'static str, required: PlatformLevel) -> Result<()> {
        let actual = self.level();
        if actual.at_least(required) {
            return Ok(());
        }
        warn!(target: "shadowset::capability", operation, %required, %actual, "Rejected by capability gate");
        Err(OrchestrationError::UnsupportedOnPlatform {
            required: required.to_string(),
            actual,
        })
    }

    /// Require `first` within its family, or `second` within its family
    ///
    /// # Errors
    ///
    /// `UnsupportedOnPlatform` if neither alternative holds.
    pub fn require_any(
        &self,
        operation: &'static str,
        first: PlatformLevel,
        second: PlatformLevel,
    ) -> Result<()> {
        let actual = self.level();
        if actual.at_least_in_family(first) || actual.at_least_in_family(second) {
            return Ok(());
        }
        let required = format!("{} or {}", first, second);
        warn!(target: "shadowset::capability", operation, %required, %actual, "Rejected by capability gate");
        Err(OrchestrationError::UnsupportedOnPlatform { required, actual })
    }
}

impl fmt::Debug for CapabilityGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityGate")
            .field("level", &self.level())
            .finish()
    }
}
