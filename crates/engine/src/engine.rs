//! Engine entry point
//!
//! `ShadowEngine` ties a snapshot provider to a capability gate and a
//! configuration, and hands out snapshot-set sessions.

use crate::capability::{CapabilityGate, PlatformInfo, StaticPlatform};
use crate::config::ShadowConfig;
use crate::provider::SnapshotProvider;
use crate::session::SnapshotSetSession;
use shadowset_core::{
    check_value, OrchestrationError, PlatformLevel, Result, SnapshotCompatibility,
    SnapshotContext,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Provider, platform and configuration
#[derive(Clone)]
pub struct ShadowEngine {
    provider: Arc<dyn SnapshotProvider>,
    gate: CapabilityGate,
    config: ShadowConfig,
}

impl ShadowEngine {
    /// Create an engine gating against the configured platform level.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configuration does not validate.
    pub fn new(provider: Arc<dyn SnapshotProvider>, config: ShadowConfig) -> Result<Self> {
        config.validate()?;
        let level = config.platform_level()?;
        Self::with_platform(provider, config, Arc::new(StaticPlatform(level)))
    }

    /// Create an engine gating against a custom platform descriptor.
    ///
    /// The configured `platform` name is ignored.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the configuration does not validate.
    pub fn with_platform(
        provider: Arc<dyn SnapshotProvider>,
        config: ShadowConfig,
        platform: Arc<dyn PlatformInfo>,
    ) -> Result<Self> {
        config.validate()?;
        let gate = CapabilityGate::new(platform);
        info!(target: "shadowset::engine", level = %gate.level(), context = %config.default_context, "Engine ready");
        Ok(Self {
            provider,
            gate,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Capability level sessions gate against
    pub fn platform_level(&self) -> PlatformLevel {
        self.gate.level()
    }

    /// Open a new, uninitialized session
    ///
    /// # Errors
    ///
    /// The mapped provider error if the provider cannot create a session.
    pub fn open_session(&self) -> Result<SnapshotSetSession> {
        let native = check_value(self.provider.create_session())?;
        Ok(SnapshotSetSession::new(native, self.gate.clone())
            .with_default_timeout(self.config.wait_timeout()))
    }

    /// Open a session initialized for backup in the configured default context
    ///
    /// # Errors
    ///
    /// Any error of [`SnapshotSetSession::initialize_for_backup`] or
    /// [`SnapshotSetSession::set_context`]. The session is dropped (and its
    /// native handle released) on failure.
    pub fn begin_backup(&self, document: Option<&str>) -> Result<SnapshotSetSession> {
        let context = self.config.context()?;
        let mut session = self.open_session()?;
        session.initialize_for_backup(document)?;
        if context != SnapshotContext::BACKUP {
            session.set_context(context)?;
        }
        debug!(target: "shadowset::engine", session = session.id(), %context, "Backup session opened");
        Ok(session)
    }

    /// Open a session initialized for restore from a backup document
    ///
    /// # Errors
    ///
    /// Any error of [`SnapshotSetSession::initialize_for_restore`].
    pub fn begin_restore(&self, document: &str) -> Result<SnapshotSetSession> {
        let mut session = self.open_session()?;
        session.initialize_for_restore(document)?;
        debug!(target: "shadowset::engine", session = session.id(), "Restore session opened");
        Ok(session)
    }

    /// Check whether a volume holds any snapshot
    ///
    /// # Errors
    ///
    /// The mapped provider error; `VolumeNotSupported` carries the volume.
    pub fn is_volume_snapshotted(&self, volume: &str) -> Result<bool> {
        check_value(self.provider.is_volume_snapshotted(volume))
            .map(|status| status.snapshots_present)
            .map_err(|e| e.with_volume(volume))
    }

    /// Compatibility flags of a volume that holds snapshots
    ///
    /// # Errors
    ///
    /// - `NoSnapshots` if the volume holds no snapshot
    /// - the mapped provider error otherwise
    pub fn snapshot_compatibility(&self, volume: &str) -> Result<SnapshotCompatibility> {
        let status = check_value(self.provider.is_volume_snapshotted(volume))
            .map_err(|e| e.with_volume(volume))?;
        if !status.snapshots_present {
            return Err(OrchestrationError::NoSnapshots {
                volume: volume.to_string(),
            });
        }
        Ok(SnapshotCompatibility::from_bits(status.compatibility))
    }

    /// Check whether reverting a volume should be blocked
    ///
    /// # Errors
    ///
    /// - `UnsupportedOnPlatform` below `Server2008`
    /// - the mapped provider error otherwise
    pub fn should_block_revert(&self, volume: &str) -> Result<bool> {
        self.gate
            .require("should block revert", PlatformLevel::Server2008)?;
        check_value(self.provider.should_block_revert(volume)).map_err(|e| e.with_volume(volume))
    }
}

impl fmt::Debug for ShadowEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowEngine")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish()
    }
}
