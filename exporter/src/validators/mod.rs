//! Validator display names.
//!
//! Producer addresses are mapped to human-readable validator names from an
//! external source (a YAML file by default). The map is loaded at startup
//! and reloaded on a timer while ingestion keeps reading it:
//!
//! - [`ValidatorDirectory`] owns the map and is the only writer,
//! - [`ValidatorNames`] is the read-only handle given to the ingestion path.
//!
//! A reload builds the complete new map first and then publishes it with a
//! single atomic pointer swap, so readers see either the old or the new map.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::types::{Address, unknown_validator_label};

pub mod yaml;

pub use yaml::YamlValidatorFile;

/// Normalized producer address -> validator display name.
pub type ValidatorNameMap = HashMap<Address, String>;

/// Errors raised while loading validator names.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    #[error("failed to read validator file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse validator YAML {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Source of validator names.
pub trait ValidatorNameSource: Send + Sync {
    /// Loads a complete map. Keys must already be normalized.
    fn load(&self) -> Result<ValidatorNameMap, ValidatorError>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String;
}

/// Read-only view of the current validator name map.
#[derive(Clone)]
pub struct ValidatorNames {
    names: Arc<ArcSwap<ValidatorNameMap>>,
}

impl ValidatorNames {
    /// Returns the map as of now. Later reloads do not affect the snapshot.
    pub fn snapshot(&self) -> Arc<ValidatorNameMap> {
        self.names.load_full()
    }

    /// Resolves the display label for `producer`, falling back to
    /// `"Unknown Validator (<address>)"`.
    pub fn label_for(&self, producer: &Address) -> String {
        self.names
            .load()
            .get(producer)
            .cloned()
            .unwrap_or_else(|| unknown_validator_label(producer))
    }

    /// Number of known validators.
    pub fn len(&self) -> usize {
        self.names.load().len()
    }

    /// Returns `true` if no validator names are loaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owner of the validator name map.
pub struct ValidatorDirectory {
    names: Arc<ArcSwap<ValidatorNameMap>>,
}

impl Default for ValidatorDirectory {
    fn default() -> Self {
        Self::new(ValidatorNameMap::new())
    }
}

impl ValidatorDirectory {
    /// Creates a directory seeded with `initial`.
    pub fn new(initial: ValidatorNameMap) -> Self {
        Self {
            names: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Returns a read-only handle sharing this directory's map.
    pub fn reader(&self) -> ValidatorNames {
        ValidatorNames {
            names: self.names.clone(),
        }
    }

    /// Publishes `map` as the new current map.
    pub fn replace(&self, map: ValidatorNameMap) {
        self.names.store(Arc::new(map));
    }

    /// Loads a fresh map from `source` and publishes it. On error the
    /// previous map stays in place.
    pub fn reload(&self, source: &dyn ValidatorNameSource) -> Result<usize, ValidatorError> {
        let map = source.load()?;
        let count = map.len();
        self.replace(map);
        Ok(count)
    }
}

/// Periodically reloads validator names until `cancel` fires.
///
/// The first reload happens one `interval` after start; callers are
/// expected to have done the initial load themselves.
pub async fn run_reload_loop<V>(
    directory: ValidatorDirectory,
    source: V,
    interval: Duration,
    cancel: CancellationToken,
) where
    V: ValidatorNameSource,
{
    let interval = interval.max(Duration::from_secs(1));
    tracing::info!(
        source = %source.describe(),
        "validator name reload running every {}s",
        interval.as_secs()
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("validator reload loop stopped");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        match directory.reload(&source) {
            Ok(count) => tracing::debug!(validators = count, "reloaded validator names"),
            Err(e) => tracing::warn!("keeping previous validator names: {e}"),
        }
    }
}
