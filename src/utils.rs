use std::path::Path;

use tokio::fs;
use tracing::error;

pub async fn ensure_upload_dir_exists(base_path: &Path) {
    if let Err(err) = fs::create_dir_all(base_path).await {
        error!(path = %base_path.display(), %err, "failed to create uploads directory");
    }
}

/// Installs the global tracing subscriber. `RUST_LOG` overrides the
/// default `info` level; records from the `log` crate are forwarded too.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
