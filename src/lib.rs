pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod rate_limit;
pub mod state;
pub mod store;

pub use self::config::{Args, QuotaPolicy, RetryAfter};
pub use self::error::{StoreError, ViewError};
pub use self::handlers::router;
pub use self::rate_limit::{Decision, FixedWindowLimiter, RateLimiter};
pub use self::state::AppState;
pub use self::store::{CounterStore, MemoryStore, RemoteStore, SqliteStore, UnavailableStore};
