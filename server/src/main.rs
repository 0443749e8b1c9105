use std::{sync::Arc, time::Duration};

use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use env_logger::Env;
use log::info;

mod analysis;
mod config;
mod files;
mod payloads;
mod routes;
mod store;

use analysis::ffmpeg::FfmpegBackend;
use config::Config;
use routes::SharedCtx;
use store::ProgressStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(
        Env::default().default_filter_or("framescope_server=info,actix_web=info"),
    )
    .init();
    let config = Config::parse();
    tokio::fs::create_dir_all(&config.storage_root).await?;

    let store = ProgressStore::new();
    if let Some(secs) = config.retention_secs {
        store::spawn_sweeper(Arc::clone(&store), Duration::from_secs(secs));
    }
    let ctx = web::Data::new(SharedCtx {
        store,
        backend: Arc::new(FfmpegBackend::new(config.ffmpeg.clone(), config.ffprobe.clone())),
        storage_root: config.storage_root.clone(),
        max_upload_bytes: config.max_upload_bytes,
        delete_after_analysis: config.delete_after_analysis,
    });

    info!(
        "storing uploads in {}, listening on {}:{}",
        config.storage_root.display(),
        config.bind,
        config.port
    );
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(ctx.clone())
            .configure(routes::configure)
    })
    .bind((config.bind.as_str(), config.port))?
    .run()
    .await
}
