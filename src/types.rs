use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which signature directory a crawl targets.
///
/// Function selectors and event topics are fetched, written and loaded
/// independently; nothing ever joins the two.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignatureKind {
    Function,
    Event,
}

impl SignatureKind {
    pub const ALL: [SignatureKind; 2] = [SignatureKind::Function, SignatureKind::Event];

    /// Path of the paginated listing, relative to the API base URL
    pub fn api_path(self) -> &'static str {
        match self {
            SignatureKind::Function => "/api/v1/signatures/",
            SignatureKind::Event => "/api/v1/event-signatures/",
        }
    }

    /// Well-known collection file written by the fetcher and read by the loader
    pub fn file_name(self) -> &'static str {
        match self {
            SignatureKind::Function => "function_signatures.json",
            SignatureKind::Event => "event_signatures.json",
        }
    }

    pub fn table_name(self) -> &'static str {
        match self {
            SignatureKind::Function => "function_signatures",
            SignatureKind::Event => "event_signatures",
        }
    }
}

impl std::str::FromStr for SignatureKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "function" | "functions" | "fn" => Ok(SignatureKind::Function),
            "event" | "events" => Ok(SignatureKind::Event),
            _ => Err(anyhow!("Invalid signature kind '{s}'. Valid options: function, event")),
        }
    }
}

impl std::fmt::Display for SignatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureKind::Function => write!(f, "function"),
            SignatureKind::Event => write!(f, "event"),
        }
    }
}

/// One entry of the signature directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub id: i64,
    pub text_signature: String,
    pub hex_signature: String,
}

/// One page of a directory listing.
///
/// Rows are kept as raw JSON: the fetcher transports them verbatim and only
/// the loader decides whether a row is well-formed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SignaturePage {
    pub results: Vec<Value>,
    #[serde(default)]
    pub next: Option<String>,
}
