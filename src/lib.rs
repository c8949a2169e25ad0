//! # Mirrorkit - a local mirror for the SEC EDGAR index archives
//!
//! Mirrorkit maintains a local copy of the EDGAR daily-index and full-index
//! trees: it works out which index artifacts are missing for a calendar
//! window, fetches them from the archive over HTTP, writes them into a
//! deterministic on-disk layout, and records every attempt in a durable
//! SQLite ledger.
//!
//! ## Features
//!
//! - **Trading calendar** - quarter arithmetic, backfill segmentation, and
//!   the observed U.S. federal holiday calendar
//! - **Deterministic layout** - template-driven path formatting and parsing
//!   (`D/2020/QTR1/master20200125.idx`)
//! - **Two tree flavors** - a cached file-backed tree and a read-only
//!   HTTP-backed tree behind the same capability traits
//! - **Gap detection** - enumerate exactly the non-holiday weekdays (plus
//!   their quarterly masters) missing from the local tree
//! - **Transactional sync** - per-artifact error isolation, rename-atomic
//!   writes, and an append-only event ledger
//! - **Rate-limited HTTP client** - complies with SEC.gov fair access rules
//!
//! ## Basic Usage
//!
//! ```no_run
//! use std::path::Path;
//! use mirrorkit::{
//!     Date, DbLedger, FileRepoFs, HttpRepoFs, MirrorConfig, RepoFormat,
//!     RepoFormatter, RepoPipe,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Identify yourself; the SEC requires a contact address.
//!     let config = MirrorConfig::new("my_mirror/1.0 (ops@example.com)");
//!
//!     let source = HttpRepoFs::edgar(&config)?;
//!     let sink = FileRepoFs::new(
//!         Path::new("/var/lib/edgar"),
//!         RepoFormatter::new(RepoFormat::edgar_default()),
//!     )?;
//!     let ledger = DbLedger::open("/var/lib/edgar/ledger.db", Date::parse("2020-01-01")?)?;
//!
//!     let mut pipe = RepoPipe::new(ledger, source, sink);
//!     let (from, to) = pipe.sync().await?;
//!     println!("mirrored {from}..{to}");
//!     Ok(())
//! }
//! ```

// Public modules
mod calendar;
mod client;
mod config;
mod error;
mod format;
mod holidays;
mod ledger;
mod local;
mod pipe;
mod remote;
mod repo;

// Re-export core types and traits for a clean API
pub use calendar::{Backfill, Date, DatePeriod, MIN_YEAR, PeriodType};
pub use client::HttpClient;
pub use config::{MirrorConfig, parse_properties};
pub use error::{MirrorError, Result};
pub use format::{MacroFn, RepoFormat, RepoFormatter, RepoObjectPath, Template};
pub use holidays::UsHolidays;
pub use ledger::{DbLedger, LedgerEvent, RepoLedger};
pub use local::{FileRepoDir, FileRepoEntry, FileRepoFs, FileRepoObject, MissingScan};
pub use pipe::RepoPipe;
pub use remote::{HttpRepoDir, HttpRepoFs, HttpRepoObject, index_macro};
pub use repo::{
    ByteStream, DEFAULT_BUFSIZE, RepoDir, RepoEntity, RepoFs, RepoObject, RepoVisitor,
};

// Version information
/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
