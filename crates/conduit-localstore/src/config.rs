//! Adapter configuration, the same ambient shape as
//! `conduit_jsonapi::JsonApiConfig` (SPEC_FULL.md §6.1).

use std::env;
use std::path::PathBuf;

/// `base_dir` is the directory records are persisted under, one file per
/// record at `base_dir/{type}/{id}.json`.
#[derive(Clone, Debug)]
pub struct LocalStoreConfig {
    pub base_dir: PathBuf,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: env::temp_dir().join("conduit-localstore"),
        }
    }
}

impl LocalStoreConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Reads `CONDUIT_LOCALSTORE_DIR`, falling back to `Default` if unset.
    pub fn from_env() -> Self {
        match env::var("CONDUIT_LOCALSTORE_DIR") {
            Ok(dir) => Self::new(dir),
            Err(_) => Self::default(),
        }
    }
}
