//! sigcrawl - function/event signature crawler
//!
//! Two independent stages joined only by the file system:
//! - **fetch**: page through a public signature directory and write each kind
//!   to one JSON array file
//! - **load**: read those files back and insert them into SQLite, logging
//!   rather than aborting on bad rows
//!
//! ## Usage
//!
//! ```bash
//! sigcrawl fetch --kind function
//! sigcrawl load --kind function
//! sigcrawl status
//! ```

pub mod config;
pub mod fetcher;
pub mod loader;
pub mod net;
pub mod types;

pub use config::{Command, Config, KindSelection};
pub use fetcher::{
    fetch_all, fetch_kind, FetchOptions, FetchOutcome, FetchSummary, HttpPageSource, PageSource,
};
pub use loader::{load_kind, read_collection, InsertFailure, LoadReport, Loader};
pub use types::{SignatureKind, SignaturePage, SignatureRecord};
