//! Protocol Module
//!
//! Query parameters in, framed rows out.
//!
//! ## Query String
//! - `view`: view index (default 0)
//! - `limit`: max rows (default and cap from `Config`)
//! - `startkey` / `endkey`: inclusive JSON key bounds of a range fold
//! - `key`: shorthand for `startkey=key&endkey=key`
//! - `id` (repeatable, requires `key`): point lookups of `(key, id)` rows
//!
//! ## Row Format
//! ```text
//! ┌────────────┬────┬──────────┬────┬─────────────┬────┐
//! │ JSON key   │ \t │ doc id   │ \t │ JSON value  │ \n │
//! └────────────┴────┴──────────┴────┴─────────────┴────┘
//! ```
//! Rows are streamed in the response body as the traversal visits them.
//!
//! ## Stored Row Value
//! ```text
//! ┌────────────────┬──────────────────────────┐
//! │ Partition (2)  │ JSON value               │
//! └────────────────┴──────────────────────────┘
//! ```

mod codec;
mod query;

pub use codec::{decode_row, encode_row, encode_view_value, OwnedRow, Row};
pub use query::{percent_decode, split_url, Query};
