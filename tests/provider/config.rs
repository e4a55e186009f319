//! Engines built from `shadowset.toml`

use crate::common::*;
use shadowset::CONFIG_FILE_NAME;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn engine_from(dir: &TempDir, provider: &MemoryProvider) -> shadowset::Result<ShadowEngine> {
    init_tracing();
    let config = ShadowConfig::from_file(&dir.path().join(CONFIG_FILE_NAME))?;
    ShadowEngine::new(Arc::new(provider.clone()), config)
}

#[test]
fn default_file_yields_newest_platform() {
    let dir = TempDir::new().unwrap();
    ShadowConfig::write_default_if_missing(&dir.path().join(CONFIG_FILE_NAME)).unwrap();

    let engine = engine_from(&dir, &provider()).unwrap();
    assert_eq!(engine.platform_level(), PlatformLevel::Server2008);
    assert_eq!(engine.config(), &ShadowConfig::default());

    let session = engine.begin_backup(None).unwrap();
    assert_eq!(session.context(), SnapshotContext::BACKUP);
}

#[test]
fn configured_level_gates_sessions() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CONFIG_FILE_NAME), "platform = \"xp\"\n").unwrap();

    let engine = engine_from(&dir, &provider()).unwrap();
    let mut session = engine.begin_backup(None).unwrap();
    assert!(session
        .set_context(SnapshotContext::NAS_ROLLBACK)
        .unwrap_err()
        .is_unsupported_on_platform());
}

#[test]
fn configured_context_needs_a_capable_platform() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(CONFIG_FILE_NAME),
        "platform = \"xp\"\ndefault_context = \"nas_rollback\"\n",
    )
    .unwrap();

    let provider = provider();
    let engine = engine_from(&dir, &provider).unwrap();
    assert!(engine.begin_backup(None).unwrap_err().is_unsupported_on_platform());
    // the half-built session was released
    assert_eq!(provider.live_sessions(), 0);
}

#[test]
fn configured_timeout_reaches_async_handles() {
    let dir = TempDir::new().unwrap();
    let config = ShadowConfig {
        wait_timeout_ms: Some(15),
        ..ShadowConfig::default()
    };
    config
        .write_to_file(&dir.path().join(CONFIG_FILE_NAME))
        .unwrap();

    let provider = provider();
    let engine = engine_from(&dir, &provider).unwrap();
    assert_eq!(engine.config().wait_timeout(), Some(Duration::from_millis(15)));

    provider.hold_async(true);
    let mut session = engine.begin_backup(None).unwrap();
    let mut gather = session.gather_writer_metadata().unwrap();
    assert_eq!(gather.wait_default(), AsyncStatus::Pending);
    provider.release_held();
    assert_eq!(gather.wait_default(), AsyncStatus::Succeeded);
}

#[test]
fn invalid_files_never_build_an_engine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);

    std::fs::write(&path, "default_context = \"all\"\n").unwrap();
    assert!(engine_from(&dir, &provider()).unwrap_err().is_invalid_argument());

    std::fs::write(&path, "wait_timeout_ms = \"soon\"\n").unwrap();
    assert!(engine_from(&dir, &provider()).unwrap_err().is_invalid_argument());

    std::fs::remove_file(&path).unwrap();
    let err = engine_from(&dir, &provider()).unwrap_err();
    assert!(matches!(err, OrchestrationError::Configuration { .. }), "{}", err);
}
