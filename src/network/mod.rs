//! Network Module
//!
//! HTTP front end over a recovered view index.
//!
//! ## Architecture
//! - One listener shared by a fixed pool of worker threads
//! - Each query walks the tree on a helper thread; the worker writes every
//!   row to the client as its own chunk as soon as it leaves the queue
//! - Routes: `GET /ping`, `GET /query`, `GET /info`, `POST /reload`

mod body;
mod handler;
mod server;

pub use body::{row_queue, Framing, RowWriter};
pub use server::Server;
