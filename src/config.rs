use std::path::PathBuf;

use clap::Parser;

/// Server settings, from flags or the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "keepdir-upload", version, about = "Upload files and ZIP folders, keeping empty directories")]
pub struct Config {
    /// Directory every upload is written under
    #[arg(long, env = "UPLOAD_BASE_PATH", default_value = "uploads")]
    pub base_path: PathBuf,

    /// Address to bind
    #[arg(long, env = "UPLOAD_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "UPLOAD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Largest accepted upload, in bytes (default: unlimited)
    #[arg(long, env = "UPLOAD_MAX_SIZE")]
    pub max_upload_size: Option<u64>,

    /// Where archives are staged before extraction (default: system temp dir)
    #[arg(long, env = "UPLOAD_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,
}
