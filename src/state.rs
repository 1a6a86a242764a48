use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::config::Config;
use crate::error::{ErrorKind, UploadError, UploadResult};
use crate::storage::UploadStore;

/// Shared per-process handler state.
pub struct AppState {
    pub store: UploadStore,
    pub in_flight: InFlight,
    /// `None` accepts uploads of any size.
    pub max_upload_bytes: Option<u64>,
}

impl AppState {
    pub fn new(store: UploadStore, max_upload_bytes: Option<u64>) -> Self {
        Self {
            store,
            in_flight: InFlight::default(),
            max_upload_bytes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            UploadStore::new(config.base_path.clone(), config.temp_dir.clone()),
            config.max_upload_size,
        )
    }
}

/// Destinations currently being written by some request.
#[derive(Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<PathBuf>>>);

impl InFlight {
    /// Reserves `destination` until the returned claim is dropped.
    pub fn claim(&self, destination: &Path) -> UploadResult<Claim> {
        let mut set = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(destination.to_path_buf()) {
            return Err(UploadError::new(
                ErrorKind::DestinationBusy,
                format!("`{}` is being written by another upload", destination.display()),
            ));
        }
        debug!(destination = %destination.display(), "destination claimed");
        Ok(Claim {
            set: Arc::clone(&self.0),
            path: destination.to_path_buf(),
        })
    }

}

pub struct Claim {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.path);
    }
}
