use hyper::Server;
use log::{error, info, warn};
use std::error::Error;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use stone_serve::{DiskUploadStore, InferenceEngine, LabelMap, ModelProvider, SavedModelLoader};
use structopt::StructOpt;

mod handler;

use handler::AppState;

#[derive(StructOpt, Debug)]
#[structopt(
    name = "stone-http",
    about = "HTTP service recognizing stone types in uploaded images"
)]
struct Config {
    #[structopt(long, env = "STONE_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    #[structopt(
        long,
        env = "STONE_MODEL_DIR",
        default_value = "model/resnet50_best",
        parse(from_os_str),
        help = "Export directory of TensorFlow SavedModel"
    )]
    model_dir: PathBuf,

    #[structopt(
        long,
        env = "STONE_LABELS",
        default_value = "data/class_indices.json",
        parse(from_os_str)
    )]
    labels: PathBuf,

    #[structopt(
        long,
        env = "STONE_UPLOAD_DIR",
        default_value = "static/uploads",
        parse(from_os_str)
    )]
    upload_dir: PathBuf,

    #[structopt(long, env = "STONE_ROUTE_PREFIX", default_value = "/ai-stone-recognition")]
    route_prefix: String,

    #[structopt(long, env = "STONE_MAX_UPLOAD_BYTES", default_value = "16777216")]
    max_upload_bytes: usize,
}

impl Config {
    fn route_prefix(&self) -> String {
        let prefix = self.route_prefix.trim();
        if prefix.starts_with('/') {
            prefix.to_owned()
        } else {
            format!("/{}", prefix)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let config = Config::from_args();

    // Labels must be valid before the first request; the model loads lazily.
    let labels = LabelMap::load(&config.labels)?;
    let provider = ModelProvider::new(Box::new(SavedModelLoader::new(&config.model_dir)));

    let state = AppState::new(
        InferenceEngine::new(labels, provider),
        DiskUploadStore::new(&config.upload_dir),
    );

    let app = handler::router(state, &config.route_prefix(), config.max_upload_bytes);

    info!(
        "Listening on http://{}{}",
        config.bind,
        config.route_prefix()
    );

    let server = Server::try_bind(&config.bind)?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()));

    if let Err(e) = server.await {
        error!("server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

/// Resolves once `signal` fires. If the signal handler cannot be installed
/// the server keeps running until it is killed.
async fn shutdown_signal(signal: impl Future<Output = io::Result<()>>) {
    match signal.await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Could not listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
