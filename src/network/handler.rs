//! Request Handler
//!
//! Routes one HTTP request to the index and writes the response.

use std::io::{self, Cursor};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use crossbeam::channel::Sender;
use parking_lot::RwLock;
use tiny_http::{Header, Method, Request, Response};

use crate::btree::Step;
use crate::config::Config;
use crate::error::{FoldError, Result};
use crate::index::{open_error_message, ViewIndex};
use crate::protocol::{encode_row, split_url, Query};

use super::body::{row_queue, Framing, RowWriter};

/// Shared state every worker reads from
pub(crate) struct Context<'a> {
    pub config: &'a Config,
    pub index: &'a RwLock<Arc<ViewIndex>>,
}

/// Dispatch one request
pub(crate) fn handle(request: Request, ctx: &Context<'_>) {
    let method = request.method().clone();
    let (path, query) = split_url(request.url());
    let path = path.to_string();
    let query = query.to_string();

    tracing::trace!("{} {}", method, request.url());

    match (&method, path.as_str()) {
        (Method::Get, "/ping") => respond(request, text(200, "pong")),
        (Method::Get, "/info") => {
            let summary = ctx.index.read().to_string();
            respond(request, text(200, &summary));
        }
        (Method::Get, "/query") => handle_query(request, &query, ctx),
        (Method::Post, "/reload") => handle_reload(request, ctx),
        _ => respond(request, text(404, "not found\n")),
    }
}

fn handle_query(request: Request, query_string: &str, ctx: &Context<'_>) {
    let query = match Query::parse(query_string, ctx.config) {
        Ok(query) => query,
        Err(e) => return respond(request, text(400, &format!("{}\n", e))),
    };

    // Pin the current index; a concurrent reload does not affect this walk
    let index = Arc::clone(&*ctx.index.read());

    if let Err(e) = index.view_root(query.view) {
        return respond(request, text(400, &format!("{}\n", e)));
    }

    let version = request.http_version();
    let framing = Framing::for_version(version.0, version.1);
    let mut writer = match RowWriter::start(request.into_writer(), framing) {
        Ok(writer) => writer,
        Err(e) => {
            tracing::debug!("Client left before the query started: {}", e);
            return;
        }
    };

    let view = query.view;
    let (sender, rows) = row_queue(ctx.config.chunk_queue_depth);

    let (walk, drained) = thread::scope(|s| {
        let walker = s.spawn(|| stream_rows(&index, query, sender));
        // Dropping `rows` on a write error turns the next send into StopError
        let drained = writer.drain(rows);
        let walk = walker.join().unwrap_or_else(|_| {
            Err(FoldError::TraversalFailure("query walk panicked".to_string()))
        });
        (walk, drained)
    });

    match (walk, drained) {
        (Err(e), _) => {
            tracing::error!(
                "Query on view {} of {} failed after {} rows: {}",
                view,
                index.path().display(),
                writer.rows(),
                e
            );
            // Close without the terminator so the client sees a cut body
            drop(writer.abandon());
        }
        (Ok(()), Err(e)) => {
            tracing::debug!("Query response ended early after {} rows: {}", writer.rows(), e);
        }
        (Ok(()), Ok(())) => {
            if let Err(e) = writer.finish() {
                tracing::debug!("Failed to end query response: {}", e);
            }
        }
    }
}

/// Run the traversal and push framed rows into the queue
fn stream_rows(index: &ViewIndex, query: Query, sender: Sender<Bytes>) -> Result<()> {
    if query.limit == 0 {
        return Ok(());
    }

    let limit = query.limit;
    let mut sent = 0u64;
    let mut row_error: Option<FoldError> = None;

    let summary = index.query(query.view, query.selection, |key, value| {
        let row = match encode_row(key, value) {
            Ok(row) => row,
            Err(e) => {
                row_error = Some(e);
                return Step::StopError;
            }
        };

        if sender.send(row).is_err() {
            // Writer dropped the queue: the client is gone
            return Step::StopError;
        }

        sent += 1;
        if sent >= limit {
            Step::StopSuccess
        } else {
            Step::Continue
        }
    })?;

    if let Some(e) = row_error {
        return Err(e);
    }

    tracing::debug!(
        "Query on view {} ended {:?} after {} rows",
        query.view,
        summary.outcome,
        summary.visited
    );
    Ok(())
}

fn handle_reload(request: Request, ctx: &Context<'_>) {
    let path = &ctx.config.index_path;

    match ViewIndex::open(path, ctx.config.max_header_size) {
        Ok(index) => {
            let message = format!("reloaded: header at {}\n", index.header_offset());
            *ctx.index.write() = Arc::new(index);
            tracing::info!("Reloaded {}", path.display());
            respond(request, text(200, &message));
        }
        Err(e) => {
            let message = open_error_message(path, &e);
            tracing::error!("Reload failed, keeping previous index: {}", message);
            respond(request, text(500, &format!("{}\n", message)));
        }
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

fn text(status: u16, body: &str) -> Response<Cursor<Vec<u8>>> {
    let mut response = Response::from_string(body).with_status_code(status);
    if let Some(header) = content_type() {
        response.add_header(header);
    }
    response
}

fn content_type() -> Option<Header> {
    Header::from_bytes(&b"Content-Type"[..], &b"text/plain; charset=utf-8"[..]).ok()
}

fn respond<R: io::Read>(request: Request, response: Response<R>) {
    if let Err(e) = request.respond(response) {
        tracing::debug!("Failed to write response: {}", e);
    }
}
