use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

use crate::config::DEFAULT_WINDOW_SIZE;

#[derive(Parser, Debug)]
#[command(name = "rowrange")]
#[command(version)]
#[command(about = "Stream rows out of remote CSV, JSON and Parquet files", long_about = None)]
#[command(after_help = "Examples:\n  \
  rowrange manifest.json                    print every row as a JSON line\n  \
  rowrange --url https://example.com/a.csv  read a single remote file\n  \
  rowrange manifest.json --part p1 -n 10    first 10 rows of part p1")]
pub struct Cli {
    /// Dataset manifest (JSON)
    #[arg(value_name = "MANIFEST", required_unless_present = "urls")]
    pub manifest: Option<String>,

    /// Read these files instead of a manifest, one part per URL or path
    #[arg(long = "url", value_name = "URL", conflicts_with = "manifest")]
    pub urls: Vec<String>,

    /// Dataset view to read
    #[arg(long, value_name = "ID", default_value = "")]
    pub dataset: String,

    /// Only read these parts
    #[arg(long = "part", value_name = "ID")]
    pub parts: Vec<String>,

    /// Stop after this many rows
    #[arg(short = 'n', long, value_name = "ROWS")]
    pub limit: Option<u64>,

    /// Rows pulled per read
    #[arg(long, value_name = "ROWS", default_value_t = 1000)]
    pub batch: usize,

    /// Bytes per range request
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window: u64,

    /// Field delimiter for delimited text
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<String>,

    /// Bearer token for the object store
    #[arg(long, env = "ROWRANGE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Organization id sent with every request
    #[arg(long, value_name = "ID")]
    pub org: Option<String>,

    /// Connect directly, ignoring proxy settings from the environment
    #[arg(long)]
    pub no_proxy: bool,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Manifest hrefs are local paths, not URLs
    #[arg(long, requires = "manifest")]
    pub local: bool,

    /// Quiet mode, no summary on stderr
    #[arg(short = 'q')]
    pub quiet: bool,
}

impl Cli {
    /// Checks clap cannot express on its own
    pub fn validate(&self) -> Result<(), clap::Error> {
        let remote = self.urls.iter().filter(|u| is_http_url(u)).count();
        if remote > 0 && remote < self.urls.len() {
            return Err(Cli::command().error(
                ErrorKind::ArgumentConflict,
                "--url values must be all http(s) URLs or all local paths",
            ));
        }
        Ok(())
    }

    /// True when inputs must be fetched over HTTP
    pub fn is_http(&self) -> bool {
        match self.urls.first() {
            Some(url) => is_http_url(url),
            None => !self.local,
        }
    }

    /// Effective row budget for the next read
    pub fn next_batch(&self, rows_so_far: u64) -> usize {
        match self.limit {
            Some(limit) => (limit.saturating_sub(rows_so_far)).min(self.batch as u64) as usize,
            None => self.batch,
        }
    }
}

fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_defaults_to_http() {
        let cli = Cli::try_parse_from(["rowrange", "manifest.json"]).unwrap();
        assert!(cli.is_http());
        assert_eq!(cli.window, DEFAULT_WINDOW_SIZE);

        let local = Cli::try_parse_from(["rowrange", "manifest.json", "--local"]).unwrap();
        assert!(!local.is_http());
    }

    #[test]
    fn test_urls_pick_fetcher() {
        let cli = Cli::try_parse_from(["rowrange", "--url", "data/a.csv", "--url", "b.csv"]).unwrap();
        assert!(!cli.is_http());

        let cli = Cli::try_parse_from(["rowrange", "--url", "https://x/a.csv"]).unwrap();
        assert!(cli.is_http());
    }

    #[test]
    fn test_mixed_urls_and_paths_rejected() {
        let cli = Cli::try_parse_from(["rowrange", "--url", "https://x/a.csv", "--url", "b.csv"])
            .unwrap();
        let err = cli.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);

        let cli = Cli::try_parse_from(["rowrange", "--url", "https://x/a.csv", "--url", "http://y/b.csv"])
            .unwrap();
        assert!(cli.validate().is_ok());
        assert!(cli.is_http());
    }

    #[test]
    fn test_manifest_or_url_required() {
        assert!(Cli::try_parse_from(["rowrange"]).is_err());
        assert!(Cli::try_parse_from(["rowrange", "m.json", "--url", "a.csv"]).is_err());
    }

    #[test]
    fn test_next_batch_respects_limit() {
        let cli = Cli::try_parse_from(["rowrange", "m.json", "-n", "25", "--batch", "10"]).unwrap();
        assert_eq!(cli.next_batch(0), 10);
        assert_eq!(cli.next_batch(20), 5);
        assert_eq!(cli.next_batch(25), 0);
    }
}
