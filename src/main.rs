mod config;
mod error;
mod handlers;
mod intake;
mod state;
mod storage;
mod utils;

use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use tracing::info;

use config::Config;
use state::AppState;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    utils::init_tracing();
    let config = Config::parse();

    utils::ensure_upload_dir_exists(&config.base_path).await;

    let state = web::Data::new(AppState::from_config(&config));

    info!(
        bind = %config.bind,
        port = config.port,
        base_path = %config.base_path.display(),
        "starting upload server (file and folder uploads, empty folders kept)"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(handlers::configure)
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}
