//! viewfold CLI
//!
//! Offline inspection of view index files.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use viewfold::btree::{KeySelection, Step, ViewKey};
use viewfold::index::open_error_message;
use viewfold::protocol::encode_row;
use viewfold::{Config, FoldError, FoldSummary, ViewIndex};

/// viewfold CLI
#[derive(Parser, Debug)]
#[command(name = "viewfold-cli")]
#[command(about = "Inspect view index files")]
#[command(version)]
struct Args {
    /// Largest header payload accepted, in KB
    #[arg(long, default_value = "64", global = true)]
    max_header_kb: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recover the newest header and print it
    Info {
        /// View index file
        file: PathBuf,
    },

    /// Stream rows of a view in key order
    Dump {
        /// View index file
        file: PathBuf,

        /// View to read
        #[arg(short, long, default_value = "0")]
        view: usize,

        /// Max rows (0 = no limit)
        #[arg(short, long, default_value = "0")]
        limit: u64,

        /// Inclusive JSON start key
        #[arg(long)]
        start: Option<String>,

        /// Inclusive JSON end key
        #[arg(long)]
        end: Option<String>,
    },

    /// Rows emitted with one JSON key
    Get {
        /// View index file
        file: PathBuf,

        /// JSON key
        key: String,

        /// Only these document ids (repeatable)
        #[arg(long = "id")]
        ids: Vec<String>,

        /// View to read
        #[arg(short, long, default_value = "0")]
        view: usize,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(io::stderr).init();

    let args = Args::parse();
    let max_header_size = args.max_header_kb * 1024;

    let file = match &args.command {
        Commands::Info { file } | Commands::Dump { file, .. } | Commands::Get { file, .. } => {
            file.clone()
        }
    };

    let config = Config::builder()
        .index_path(&file)
        .max_header_size(max_header_size)
        .build();

    let index = match ViewIndex::open_with(&config) {
        Ok(index) => index,
        Err(e) => {
            eprintln!("{}", open_error_message(&file, &e));
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Commands::Info { .. } => {
            print!("{}", index);
            println!("blocks_scanned: {}", index.blocks_scanned());
            println!("empty_blocks: {}", index.empty_blocks());
            println!("corrupt_blocks_skipped: {}", index.corrupt_blocks_skipped());
            Ok(())
        }
        Commands::Dump {
            view,
            limit,
            start,
            end,
            ..
        } => {
            let selection = KeySelection::Range {
                start: start.map(|k| ViewKey::lower_bound(k.as_bytes())),
                end: end.map(|k| ViewKey::upper_bound(k.as_bytes())),
            };
            print_rows(&index, view, selection, limit)
        }
        Commands::Get { key, ids, view, .. } => {
            let selection = if ids.is_empty() {
                KeySelection::Range {
                    start: Some(ViewKey::lower_bound(key.as_bytes())),
                    end: Some(ViewKey::upper_bound(key.as_bytes())),
                }
            } else {
                KeySelection::Keys(
                    ids.iter()
                        .map(|id| ViewKey::encode(key.as_bytes(), id.as_bytes()))
                        .collect(),
                )
            };
            print_rows(&index, view, selection, 0)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

/// Write rows to stdout; `limit == 0` means every matching row
fn print_rows(
    index: &ViewIndex,
    view: usize,
    selection: KeySelection,
    limit: u64,
) -> Result<(), FoldError> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failure: Option<FoldError> = None;
    let mut written = 0u64;

    let summary: FoldSummary = index.query(view, selection, |key, value| {
        let row = match encode_row(key, value) {
            Ok(row) => row,
            Err(e) => {
                failure = Some(e);
                return Step::StopError;
            }
        };
        if let Err(e) = out.write_all(&row) {
            // Closed pipe (e.g. `| head`) is a normal way to stop reading
            if e.kind() != io::ErrorKind::BrokenPipe {
                failure = Some(FoldError::Io(e));
            }
            return Step::StopError;
        }

        written += 1;
        if limit != 0 && written >= limit {
            Step::StopSuccess
        } else {
            Step::Continue
        }
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    out.flush()?;

    tracing::debug!("{:?} after {} rows", summary.outcome, summary.visited);
    Ok(())
}
