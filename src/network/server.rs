//! HTTP Server
//!
//! Accepts requests and dispatches them to worker threads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::RwLock;

use crate::config::Config;
use crate::error::{FoldError, Result};
use crate::index::ViewIndex;

use super::handler::{self, Context};

/// How long a worker blocks on the listener before re-checking shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// HTTP server for one view index
///
/// ## Concurrency:
/// - Every worker pulls requests off the same listener
/// - Queries pin the index current when they start
/// - `/reload` swaps the index under a write lock
pub struct Server {
    config: Config,
    http: tiny_http::Server,
    index: RwLock<Arc<ViewIndex>>,
    shutdown: AtomicBool,
}

impl Server {
    /// Bind `config.listen_addr` and serve `index`
    pub fn bind(config: Config, index: ViewIndex) -> Result<Self> {
        let http = tiny_http::Server::http(&config.listen_addr).map_err(|e| {
            FoldError::Network(format!("failed to bind {}: {}", config.listen_addr, e))
        })?;

        tracing::info!("Listening on {}", config.listen_addr);

        Ok(Self {
            config,
            http,
            index: RwLock::new(Arc::new(index)),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Actual bound address (useful with port 0)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.http.server_addr().to_ip()
    }

    /// Index currently served
    pub fn index(&self) -> Arc<ViewIndex> {
        Arc::clone(&*self.index.read())
    }

    /// Serve until `shutdown` is called (blocking)
    pub fn run(&self) -> Result<()> {
        let workers = self.config.worker_threads.max(1);
        let ctx = Context {
            config: &self.config,
            index: &self.index,
        };

        tracing::info!("Starting {} worker threads", workers);

        thread::scope(|s| {
            for id in 0..workers {
                let ctx = &ctx;
                thread::Builder::new()
                    .name(format!("viewfold-worker-{}", id))
                    .spawn_scoped(s, move || self.worker_loop(ctx))
                    .map_err(|e| {
                        // Release the workers already running
                        self.shutdown();
                        FoldError::Io(e)
                    })?;
            }
            Ok::<(), FoldError>(())
        })?;

        tracing::info!("Server stopped");
        Ok(())
    }

    /// Signal the workers to exit after their current request
    pub fn shutdown(&self) {
        tracing::info!("Shutdown requested");
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn worker_loop(&self, ctx: &Context<'_>) {
        while !self.is_shutting_down() {
            match self.http.recv_timeout(POLL_INTERVAL) {
                Ok(Some(request)) => handler::handle(request, ctx),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("HTTP receive error: {}", e);
                }
            }
        }
    }
}
