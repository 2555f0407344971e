use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::types::SignatureKind;

/// Which signature kinds a command applies to
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KindSelection {
    One(SignatureKind),
    All,
}

impl KindSelection {
    pub fn kinds(self) -> Vec<SignatureKind> {
        match self {
            KindSelection::One(kind) => vec![kind],
            KindSelection::All => SignatureKind::ALL.to_vec(),
        }
    }
}

impl std::str::FromStr for KindSelection {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        if s.eq_ignore_ascii_case("all") {
            Ok(KindSelection::All)
        } else {
            Ok(KindSelection::One(s.parse()?))
        }
    }
}

/// sigcrawl - function/event signature crawler
///
/// Pages through a public signature directory, writes each kind to a JSON
/// file, and loads those files into SQLite.
/// Configuration priority: CLI args > Environment variables > Config file > Defaults
#[derive(Parser, Debug)]
#[command(name = "sigcrawl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Signature directory crawler and SQLite loader", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub settings: SettingsArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Crawl the directory and write one JSON file per kind
    Fetch {
        /// Signature kind: function, event or all
        #[arg(short, long, default_value = "all")]
        kind: KindSelection,
    },
    /// Load previously fetched JSON files into SQLite
    Load {
        #[arg(short, long, default_value = "all")]
        kind: KindSelection,
    },
    /// Fetch, then load
    Run {
        #[arg(short, long, default_value = "all")]
        kind: KindSelection,
    },
    /// Print row counts of the signature tables
    Status,
}

#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// Optional config file path (TOML format)
    #[arg(long = "config", global = true, env = "SIGCRAWL_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Base URL of the signature directory API
    #[arg(long, global = true, env = "SIGNATURE_API_URL")]
    pub api_base_url: Option<String>,

    /// Directory holding the fetched JSON collections
    #[arg(long, global = true, env = "SIGCRAWL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Path to SQLite database
    #[arg(long, global = true, env = "SIGCRAWL_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Delay between page requests in milliseconds (0-60000)
    #[arg(long, global = true, env = "REQUEST_DELAY_MS")]
    pub request_delay_ms: Option<u64>,

    /// HTTP request timeout in milliseconds (1000-120000)
    #[arg(long, global = true, env = "REQUEST_TIMEOUT_MS")]
    pub request_timeout_ms: Option<u64>,

    /// Retry attempts for a failed page request (0-10)
    #[arg(long, global = true, env = "MAX_RETRIES")]
    pub max_retries: Option<u8>,

    /// Stop after this many pages
    #[arg(long, global = true, env = "MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Rows per committed batch during load (1-100000)
    #[arg(long, global = true, env = "LOAD_BATCH_SIZE")]
    pub batch_size: Option<usize>,
}

/// Configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub fetch: FetchSection,
    #[serde(default)]
    pub load: LoadSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchSection {
    pub api_base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub request_delay_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_retries: Option<u8>,
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadSection {
    pub db_path: Option<PathBuf>,
    pub batch_size: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_base_url: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub request_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub max_retries: u8,
    pub max_pages: Option<usize>,
    pub batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.4byte.directory".to_string(),
            data_dir: PathBuf::from("."),
            db_path: PathBuf::from("./signatures.db"),
            request_delay_ms: 0,
            request_timeout_ms: 30_000,
            max_retries: 0,
            max_pages: None,
            batch_size: 1000,
        }
    }
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic check)
fn validate_url(url: &str, name: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("{name} must start with http:// or https://"))
    }
}

/// Parse CLI args (with env fallbacks) and resolve the effective configuration
pub fn load() -> Result<(Command, Config)> {
    let args = CliArgs::parse();
    let file = match &args.settings.config_file {
        Some(path) => {
            log::info!("Loading configuration from {}", path.display());
            load_from_file(path)?
        }
        None => ConfigFile::default(),
    };
    let config = resolve(args.settings, file)?;
    Ok((args.command, config))
}

/// Load configuration from TOML file
fn load_from_file(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

/// Merge CLI/env settings over file settings over defaults, then validate
pub fn resolve(args: SettingsArgs, file: ConfigFile) -> Result<Config> {
    let defaults = Config::default();

    let api_base_url = args
        .api_base_url
        .or(file.fetch.api_base_url)
        .unwrap_or(defaults.api_base_url);
    let api_base_url = api_base_url.trim_end_matches('/').to_string();
    validate_url(&api_base_url, "SIGNATURE_API_URL")?;

    let request_delay_ms = args
        .request_delay_ms
        .or(file.fetch.request_delay_ms)
        .unwrap_or(defaults.request_delay_ms);
    let request_delay_ms = validate_in_range(request_delay_ms, 0, 60_000, "REQUEST_DELAY_MS")?;

    let request_timeout_ms = args
        .request_timeout_ms
        .or(file.fetch.request_timeout_ms)
        .unwrap_or(defaults.request_timeout_ms);
    let request_timeout_ms =
        validate_in_range(request_timeout_ms, 1000, 120_000, "REQUEST_TIMEOUT_MS")?;

    let max_retries = args
        .max_retries
        .or(file.fetch.max_retries)
        .unwrap_or(defaults.max_retries);
    let max_retries = validate_in_range(max_retries, 0, 10, "MAX_RETRIES")?;

    let max_pages = args.max_pages.or(file.fetch.max_pages);
    if max_pages == Some(0) {
        return Err(anyhow!("MAX_PAGES must be at least 1"));
    }

    let batch_size = args
        .batch_size
        .or(file.load.batch_size)
        .unwrap_or(defaults.batch_size);
    let batch_size = validate_in_range(batch_size, 1, 100_000, "LOAD_BATCH_SIZE")?;

    Ok(Config {
        api_base_url,
        data_dir: args
            .data_dir
            .or(file.fetch.data_dir)
            .unwrap_or(defaults.data_dir),
        db_path: args.db_path.or(file.load.db_path).unwrap_or(defaults.db_path),
        request_delay_ms,
        request_timeout_ms,
        max_retries,
        max_pages,
        batch_size,
    })
}

impl Config {
    /// First page of the listing for one kind
    pub fn start_url(&self, kind: SignatureKind) -> String {
        format!("{}{}", self.api_base_url, kind.api_path())
    }

    /// Collection file shared by the fetcher and the loader
    pub fn collection_path(&self, kind: SignatureKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }

    pub fn print_summary(&self) {
        log::info!("sigcrawl configuration:");
        log::info!("  API: {}", self.api_base_url);
        log::info!("  Data dir: {}", self.data_dir.display());
        log::info!("  Database: {}", self.db_path.display());
        log::info!("  Request delay: {}ms", self.request_delay_ms);
        log::info!("  Request timeout: {}ms", self.request_timeout_ms);
        log::info!("  Retries: {}", self.max_retries);
        if let Some(max_pages) = self.max_pages {
            log::info!("  Max pages: {max_pages}");
        }
        log::info!("  Load batch size: {}", self.batch_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let cfg = resolve(SettingsArgs::default(), ConfigFile::default()).unwrap();
        assert_eq!(cfg.api_base_url, "https://www.4byte.directory");
        assert_eq!(cfg.request_delay_ms, 0);
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.batch_size, 1000);
        assert!(cfg.max_pages.is_none());
        assert_eq!(
            cfg.start_url(SignatureKind::Event),
            "https://www.4byte.directory/api/v1/event-signatures/"
        );
    }

    #[test]
    fn cli_overrides_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            [fetch]
            api_base_url = "http://file.example/"
            request_delay_ms = 250

            [load]
            batch_size = 50
            "#,
        )
        .unwrap();
        let args = SettingsArgs {
            request_delay_ms: Some(10),
            ..Default::default()
        };
        let cfg = resolve(args, file).unwrap();
        assert_eq!(cfg.api_base_url, "http://file.example");
        assert_eq!(cfg.request_delay_ms, 10);
        assert_eq!(cfg.batch_size, 50);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let args = SettingsArgs {
            max_retries: Some(11),
            ..Default::default()
        };
        assert!(resolve(args, ConfigFile::default()).is_err());

        let args = SettingsArgs {
            max_pages: Some(0),
            ..Default::default()
        };
        assert!(resolve(args, ConfigFile::default()).is_err());
    }

    #[test]
    fn rejects_non_http_url() {
        let args = SettingsArgs {
            api_base_url: Some("ftp://example".into()),
            ..Default::default()
        };
        assert!(resolve(args, ConfigFile::default()).is_err());
    }

    #[test]
    fn kind_selection_parsing() {
        assert_eq!("all".parse::<KindSelection>().unwrap().kinds().len(), 2);
        assert_eq!(
            "event".parse::<KindSelection>().unwrap(),
            KindSelection::One(SignatureKind::Event)
        );
    }
}
