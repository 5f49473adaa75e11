use crate::services::{
    listing::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE},
    ratings_repository::{DEFAULT_RATINGS_KEY, DEFAULT_WRITE_ATTEMPTS},
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt::Display, str::FromStr};

/// Where images and the ratings document live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// An S3 (or S3-compatible) bucket.
    S3,
    /// A process-local bucket; everything is lost on exit.
    Memory,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub ratings_key: String,
    pub prefix: Option<String>,
    pub page_size: usize,
    pub max_pages: usize,
    pub write_attempts: usize,
    pub unconditional_writes: bool,
    pub public_base_url: String,
    pub cors_origins: Vec<String>,
    pub seed_keys: Vec<String>,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Serve unrated bucket images and collect ratings")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_RATER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_RATER_PORT, then PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides IMAGE_RATER_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Bucket holding the images and the ratings document (overrides AWS_BUCKET_NAME)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Bucket region (overrides AWS_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3 endpoint for compatible stores (overrides AWS_ENDPOINT_URL)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Key of the ratings document (overrides IMAGE_RATER_RATINGS_KEY)
    #[arg(long)]
    pub ratings_key: Option<String>,

    /// Only offer images under this key prefix (overrides IMAGE_RATER_PREFIX)
    #[arg(long)]
    pub prefix: Option<String>,

    /// Keys requested per listing page, 1-1000 (overrides IMAGE_RATER_PAGE_SIZE)
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Give up on listings longer than this many pages (overrides IMAGE_RATER_MAX_PAGES)
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Attempts at appending a rating before reporting a conflict (overrides IMAGE_RATER_WRITE_ATTEMPTS)
    #[arg(long)]
    pub write_attempts: Option<usize>,

    /// Overwrite the ratings document without version checks (overrides IMAGE_RATER_UNCONDITIONAL_WRITES)
    #[arg(long)]
    pub unconditional_writes: bool,

    /// Base URL image keys are appended to (overrides IMAGE_RATER_PUBLIC_BASE_URL).
    /// Defaults to the bucket's S3 host; without a bucket it falls back to this
    /// server's own address, which serves no images.
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Allowed CORS origins, comma separated; any origin when empty (overrides IMAGE_RATER_CORS_ORIGINS)
    #[arg(long, value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Image keys to preload into the memory backend (overrides IMAGE_RATER_SEED_KEYS)
    #[arg(long, value_delimiter = ',')]
    pub seed_keys: Vec<String>,
}

impl AppConfig {
    /// Load `.env`, then parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }

        Self::from_args(Args::parse())
    }

    /// Merge parsed CLI args over the environment. CLI values win.
    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("IMAGE_RATER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env_value::<u16>("IMAGE_RATER_PORT")? {
            Some(port) => port,
            None => env_value::<u16>("PORT")?.unwrap_or(5000),
        };
        let env_backend = match env::var("IMAGE_RATER_BACKEND") {
            Ok(value) => <Backend as ValueEnum>::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!(err))
                .with_context(|| format!("parsing IMAGE_RATER_BACKEND value `{}`", value))?,
            Err(_) => Backend::S3,
        };

        let backend = args.backend.unwrap_or(env_backend);
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let bucket = args.bucket.or_else(|| non_empty_env("AWS_BUCKET_NAME"));

        if backend == Backend::S3 && bucket.is_none() {
            bail!("a bucket is required for the s3 backend (--bucket or AWS_BUCKET_NAME)");
        }

        let public_base_url = args
            .public_base_url
            .filter(|url| !url.trim().is_empty())
            .or_else(|| non_empty_env("IMAGE_RATER_PUBLIC_BASE_URL"))
            .unwrap_or_else(|| match &bucket {
                Some(bucket) => format!("https://{}.s3.amazonaws.com", bucket),
                None => format!("http://{}:{}", host, port),
            });

        let page_size = match args.page_size {
            Some(size) => size,
            None => env_value("IMAGE_RATER_PAGE_SIZE")?.unwrap_or(DEFAULT_PAGE_SIZE),
        };
        if !(1..=1000).contains(&page_size) {
            bail!("page size must be between 1 and 1000, got {}", page_size);
        }

        // --- Merge ---
        let cfg = Self {
            host,
            port,
            backend,
            bucket,
            region: args.region.or_else(|| non_empty_env("AWS_REGION")),
            endpoint: args.endpoint.or_else(|| non_empty_env("AWS_ENDPOINT_URL")),
            ratings_key: args
                .ratings_key
                .or_else(|| non_empty_env("IMAGE_RATER_RATINGS_KEY"))
                .unwrap_or_else(|| DEFAULT_RATINGS_KEY.into()),
            prefix: args.prefix.or_else(|| non_empty_env("IMAGE_RATER_PREFIX")),
            page_size,
            max_pages: match args.max_pages {
                Some(pages) => pages,
                None => env_value("IMAGE_RATER_MAX_PAGES")?.unwrap_or(DEFAULT_MAX_PAGES),
            },
            write_attempts: match args.write_attempts {
                Some(attempts) => attempts,
                None => env_value("IMAGE_RATER_WRITE_ATTEMPTS")?.unwrap_or(DEFAULT_WRITE_ATTEMPTS),
            },
            unconditional_writes: args.unconditional_writes
                || env_value::<bool>("IMAGE_RATER_UNCONDITIONAL_WRITES")?.unwrap_or(false),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            cors_origins: list_or_env(args.cors_origins, "IMAGE_RATER_CORS_ORIGINS"),
            seed_keys: list_or_env(args.seed_keys, "IMAGE_RATER_SEED_KEYS"),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Parse an optional environment variable, failing loudly on malformed values.
fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn list_or_env(cli: Vec<String>, name: &str) -> Vec<String> {
    let values = if cli.is_empty() {
        non_empty_env(name)
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_default()
    } else {
        cli
    };
    values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<AppConfig> {
        let mut full = vec!["image-rater"];
        full.extend_from_slice(argv);
        AppConfig::from_args(Args::try_parse_from(full)?)
    }

    #[test]
    fn cli_values_are_used() {
        let cfg = parse(&[
            "--host",
            "127.0.0.1",
            "--port",
            "8081",
            "--backend",
            "s3",
            "--bucket",
            "photos",
            "--ratings-key",
            "scores.json",
            "--page-size",
            "250",
            "--max-pages",
            "7",
            "--write-attempts",
            "2",
            "--public-base-url",
            "https://cdn.example.com/",
            "--cors-origins",
            "https://a.example.com, https://b.example.com",
        ])
        .unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:8081");
        assert_eq!(cfg.backend, Backend::S3);
        assert_eq!(cfg.bucket.as_deref(), Some("photos"));
        assert_eq!(cfg.ratings_key, "scores.json");
        assert_eq!(cfg.page_size, 250);
        assert_eq!(cfg.max_pages, 7);
        assert_eq!(cfg.write_attempts, 2);
        assert_eq!(cfg.public_base_url, "https://cdn.example.com");
        assert_eq!(
            cfg.cors_origins,
            vec!["https://a.example.com", "https://b.example.com"]
        );
    }

    #[test]
    fn public_url_defaults_to_bucket_host() {
        // An explicitly empty base URL still falls back to the bucket host.
        let cfg = parse(&["--backend", "s3", "--bucket", "photos", "--public-base-url", ""]).unwrap();
        assert_eq!(cfg.public_base_url, "https://photos.s3.amazonaws.com");
    }

    #[test]
    fn page_size_out_of_range_is_rejected() {
        let err = parse(&["--backend", "memory", "--page-size", "5000"]).unwrap_err();
        assert!(err.to_string().contains("page size"));
    }

    #[test]
    fn memory_backend_needs_no_bucket() {
        let cfg = parse(&["--backend", "memory", "--seed-keys", "a.jpg,b.jpg"]).unwrap();
        assert_eq!(cfg.backend, Backend::Memory);
        assert_eq!(cfg.seed_keys, vec!["a.jpg", "b.jpg"]);
    }
}
