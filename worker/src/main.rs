use std::path::Path;

use tracing::info;
use worker::worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match std::env::args().nth(1) {
        Some(path) => WorkerConfig::load(Path::new(&path))?,
        None => WorkerConfig::default(),
    };
    utils::logger::init(&cfg.log)?;

    let registry = worker::functions::builtin();
    info!(master = %cfg.master_addr, functions = registry.len(), "running worker");
    worker::worker::run(&cfg, &registry).await
}
