use std::sync::Arc;

use crate::config::{Args, QuotaPolicy};
use crate::rate_limit::RateLimiter;
use crate::store::CounterStore;

// app's shared state
pub struct AppState {
    pub store: Arc<dyn CounterStore>,
    pub limiter: Arc<dyn RateLimiter>,
    pub quota: QuotaPolicy,
    pub kinds: Vec<String>,       // accepted counter namespaces
    pub default_kind: String,     // namespace of /views/{slug}
    pub database_configured: DatabaseConfigured,
}

// What was set for the store, logged on failures (never the values)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseConfigured {
    pub url: bool,
    pub token: bool,
}

impl AppState {
    // shared quota, blog and project kinds
    pub fn new(store: Arc<dyn CounterStore>, limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            store,
            limiter,
            quota: QuotaPolicy::Shared,
            kinds: vec!["blog".to_string(), "project".to_string()],
            default_kind: "blog".to_string(),
            database_configured: DatabaseConfigured::default(),
        }
    }

    pub fn from_args(
        args: &Args,
        store: Arc<dyn CounterStore>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            store,
            limiter,
            quota: args.quota,
            kinds: args.kinds.clone(),
            default_kind: args.default_kind.clone(),
            database_configured: DatabaseConfigured {
                url: args.database_url.is_some(),
                token: args.database_token.is_some(),
            },
        }
    }

    pub fn with_quota(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn knows_kind(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| k == kind)
    }
}
