//! Daemon startup wiring.
//!
//! The single composition root: selects the store backend explicitly
//! from configuration (never by availability probing inside request
//! paths) and threads it through every component as a constructor
//! dependency. There is no module-level singleton.

use std::sync::Arc;

use examguard_core::config::{ConfigError, EngineConfig, StoreBackend};
use examguard_core::store::{IntegrityStore, MemoryStore, SqliteStore, StoreError};
use examguard_core::{Clock, FingerprintBinder, SessionMachine, SystemClock, ViolationLedger};
use thiserror::Error;
use tracing::info;

use crate::gate::FullscreenGate;
use crate::protocol::SessionDispatcher;

/// Errors from daemon startup.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Invalid or incoherent configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The durable store could not be opened.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Fully wired daemon state.
pub struct DaemonState {
    config: EngineConfig,
    dispatcher: SessionDispatcher,
    started_at_ms: u64,
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("config", &self.config)
            .field("started_at_ms", &self.started_at_ms)
            .finish_non_exhaustive()
    }
}

impl DaemonState {
    /// Builds the engine from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the
    /// configured store cannot be opened.
    pub fn new(config: EngineConfig) -> Result<Self, DaemonError> {
        config.validate()?;

        let store: Arc<dyn IntegrityStore> = match config.store.backend {
            StoreBackend::Sqlite => {
                let path = config.store.path.as_ref().ok_or_else(|| {
                    ConfigError::Validation(
                        "store.backend = \"sqlite\" requires store.path".to_string(),
                    )
                })?;
                info!(path = %path.display(), "opening sqlite store");
                Arc::new(SqliteStore::open(path)?)
            },
            StoreBackend::Memory => {
                info!("using in-memory store");
                Arc::new(MemoryStore::new())
            },
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let machine = SessionMachine::new(store.clone(), clock.clone());
        let ledger = ViolationLedger::new(
            store.clone(),
            machine.clone(),
            clock.clone(),
            config.integrity.clone(),
        );
        let binder = FingerprintBinder::new(
            store.clone(),
            clock.clone(),
            config.fingerprint.rapid_change_threshold_ms(),
        );
        let gate = FullscreenGate::new(store.clone(), ledger.clone());
        let dispatcher = SessionDispatcher::new(store, machine, ledger, binder, gate);

        Ok(Self {
            config,
            dispatcher,
            started_at_ms: clock.now_ms(),
        })
    }

    /// The request dispatcher.
    #[must_use]
    pub const fn dispatcher(&self) -> &SessionDispatcher {
        &self.dispatcher
    }

    /// The configuration the daemon was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// When the daemon started, ms since the Unix epoch.
    #[must_use]
    pub const fn started_at_ms(&self) -> u64 {
        self.started_at_ms
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_default_config_builds_memory_backend() {
        let state = DaemonState::new(EngineConfig::default()).unwrap();
        assert!(state.started_at_ms() > 0);

        let machine = state.dispatcher().machine();
        let session = machine.start("user-1", "exam-1").unwrap();
        assert_eq!(machine.summary(&session.session_id).unwrap().violation_count, 0);
    }

    #[test]
    fn test_sqlite_backend_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[store]\nbackend = \"sqlite\"\npath = \"{}\"\n",
            dir.path().join("examguard.db").display()
        );
        let config = EngineConfig::from_toml(&toml).unwrap();
        let state = DaemonState::new(config).unwrap();
        state.dispatcher().machine().start("user-1", "exam-1").unwrap();
    }

    #[test]
    fn test_incoherent_thresholds_rejected() {
        let mut config = EngineConfig::default();
        config.integrity.termination_threshold = config.integrity.warning_threshold;
        let err = DaemonState::new(config).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }
}
