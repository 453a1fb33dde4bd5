//! Streaming Response Body
//!
//! Bridges the traversal thread and the client socket. Rows arrive through a
//! bounded channel, so a slow client slows the walk down instead of piling
//! rows up in memory.
//!
//! ## Wire Format
//! ```text
//! HTTP/1.1:  [head][len hex\r\n row \r\n]...[0\r\n\r\n]   one chunk per row
//! HTTP/1.0:  [head][row]...                               close ends body
//! ```
//!
//! A walk that fails never gets the terminator: the connection is dropped
//! mid-body, so the client sees a truncated response instead of a short one.

use std::io::{self, Write};

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};

/// Create a row queue holding at most `depth` framed rows
pub fn row_queue(depth: usize) -> (Sender<Bytes>, Receiver<Bytes>) {
    channel::bounded(depth.max(1))
}

/// How the body is delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `Transfer-Encoding: chunked`, one chunk per row
    Chunked,
    /// Raw rows; end of body is the connection closing
    Identity,
}

impl Framing {
    /// Chunked for HTTP/1.1 and later, identity for HTTP/1.0
    pub fn for_version(major: u8, minor: u8) -> Self {
        if (major, minor) >= (1, 1) {
            Framing::Chunked
        } else {
            Framing::Identity
        }
    }
}

/// Writes a `200` row stream straight to the client
pub struct RowWriter<W: Write> {
    inner: W,
    framing: Framing,
    rows: u64,
}

impl<W: Write> RowWriter<W> {
    /// Send the status line and headers
    pub fn start(mut inner: W, framing: Framing) -> io::Result<Self> {
        let head = match framing {
            Framing::Chunked => {
                "HTTP/1.1 200 OK\r\n\
                 Content-Type: text/plain; charset=utf-8\r\n\
                 Transfer-Encoding: chunked\r\n\
                 Connection: close\r\n\r\n"
            }
            Framing::Identity => {
                "HTTP/1.0 200 OK\r\n\
                 Content-Type: text/plain; charset=utf-8\r\n\
                 Connection: close\r\n\r\n"
            }
        };
        inner.write_all(head.as_bytes())?;
        inner.flush()?;

        Ok(Self {
            inner,
            framing,
            rows: 0,
        })
    }

    /// Write one framed row and push it to the client
    pub fn write_row(&mut self, row: &[u8]) -> io::Result<()> {
        if row.is_empty() {
            // A zero-length chunk would end the body
            return Ok(());
        }

        match self.framing {
            Framing::Chunked => {
                write!(self.inner, "{:x}\r\n", row.len())?;
                self.inner.write_all(row)?;
                self.inner.write_all(b"\r\n")?;
            }
            Framing::Identity => self.inner.write_all(row)?,
        }
        self.inner.flush()?;

        self.rows += 1;
        Ok(())
    }

    /// Copy rows from the queue until the producer hangs up
    pub fn drain(&mut self, rows: Receiver<Bytes>) -> io::Result<()> {
        for row in rows.iter() {
            self.write_row(&row)?;
        }
        Ok(())
    }

    /// Rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Mark the body complete
    pub fn finish(mut self) -> io::Result<W> {
        if self.framing == Framing::Chunked {
            self.inner.write_all(b"0\r\n\r\n")?;
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Give up on the body without terminating it
    pub fn abandon(self) -> W {
        self.inner
    }
}
