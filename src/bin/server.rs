//! viewfold Server Binary
//!
//! Recovers a view index and serves it over HTTP.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use viewfold::index::open_error_message;
use viewfold::network::Server;
use viewfold::{Config, ViewIndex};

/// viewfold Server
#[derive(Parser, Debug)]
#[command(name = "viewfold-server")]
#[command(about = "Serve bounded folds over an append-only view index")]
#[command(version)]
struct Args {
    /// View index file
    #[arg(short, long, default_value = "./view.index")]
    index: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "0.0.0.0:8081")]
    listen: String,

    /// Worker threads
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Rows returned when a query has no limit
    #[arg(long, default_value = "5")]
    default_limit: u64,

    /// Largest limit a query may ask for
    #[arg(long, default_value = "10000")]
    max_limit: u64,

    /// Largest header payload accepted, in KB
    #[arg(long, default_value = "64")]
    max_header_kb: usize,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,viewfold=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("viewfold Server v{}", viewfold::VERSION);
    tracing::info!("Index file: {}", args.index);
    tracing::info!("Listen address: {}", args.listen);

    // Build config from args
    let config = Config::builder()
        .index_path(&args.index)
        .listen_addr(&args.listen)
        .worker_threads(args.workers)
        .default_limit(args.default_limit)
        .max_limit(args.max_limit)
        .max_header_size(args.max_header_kb * 1024)
        .build();

    // Nothing is served unless recovery succeeds
    let index = match ViewIndex::open_with(&config) {
        Ok(index) => index,
        Err(e) => {
            tracing::error!("{}", open_error_message(&config.index_path, &e));
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, index) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
