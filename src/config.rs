use clap::{Parser, ValueEnum};
use std::time::Duration;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "page-views")]
#[command(about = "Page view counter with per-client rate limiting")]
pub struct Args {
    // Address to bind the server on
    #[arg(long, env = "VIEWS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, env = "VIEWS_PORT", default_value_t = 8080)]
    pub port: u16,

    // Counter store location
    // Example: "sqlite://./views.db", "libsql://db.example.com", "memory"
    #[arg(long, env = "VIEWS_DATABASE_URL")]
    pub database_url: Option<String>,

    // Auth token for a remote libSQL store
    #[arg(long, env = "VIEWS_DATABASE_TOKEN", hide_env_values = true)]
    pub database_token: Option<String>,

    // Store round-trip timeout in seconds
    #[arg(long, env = "VIEWS_STORE_TIMEOUT", default_value_t = 10)]
    pub store_timeout: u64,

    // Rate limit max requests per client and slug per window
    #[arg(long, env = "VIEWS_RATE_LIMIT", default_value_t = 10,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Rate limit window in seconds
    #[arg(long, env = "VIEWS_RATE_WINDOW", default_value_t = 86_400,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window: u64,

    // What Retry-After reports on a denied request
    #[arg(long, env = "VIEWS_RETRY_AFTER", value_enum, default_value = "full-window")]
    pub retry_after: RetryAfter,

    // Whether reads and writes share one rate limit bucket
    #[arg(long, env = "VIEWS_QUOTA", value_enum, default_value = "shared")]
    pub quota: QuotaPolicy,

    // Seconds between sweeps of expired rate limit entries (0 disables)
    #[arg(long, env = "VIEWS_SWEEP_INTERVAL", default_value_t = 3_600)]
    pub sweep_interval: u64,

    // Content kinds accepted as counter namespaces
    #[arg(long, env = "VIEWS_KINDS", value_delimiter = ',',
          default_values_t = [String::from("blog"), String::from("project")])]
    pub kinds: Vec<String>,

    // Kind used by /views/{slug}
    #[arg(long, env = "VIEWS_DEFAULT_KIND", default_value = "blog")]
    pub default_kind: String,
}

impl Args {
    // checks clap can't express
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kinds.is_empty() {
            anyhow::bail!("at least one content kind is required");
        }
        for kind in &self.kinds {
            if kind.is_empty() || kind.contains(':') || kind.contains('/') {
                anyhow::bail!("invalid content kind {kind:?}: must be non-empty without ':' or '/'");
            }
        }
        if !self.kinds.contains(&self.default_kind) {
            anyhow::bail!(
                "default kind {:?} is not one of the configured kinds {:?}",
                self.default_kind,
                self.kinds
            );
        }
        Ok(())
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval > 0).then(|| Duration::from_secs(self.sweep_interval))
    }
}

// what Retry-After reports on a 429
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryAfter {
    #[default]
    FullWindow,
    // seconds left in the current window
    Remaining,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotaPolicy {
    #[default]
    Shared,
    // separate read and write buckets
    Split,
}
