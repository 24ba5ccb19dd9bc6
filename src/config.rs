use dotenvy::dotenv;
use std::env;

/// Runtime tunables for the messaging core. Every limit has an env
/// override so deployments can tighten read costs without a rebuild.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default page size for conversation lists.
    pub default_list_limit: usize,
    /// Hard cap on conversation list page size.
    pub max_list_limit: usize,
    /// Default page size for message fetches.
    pub default_fetch_limit: usize,
    /// Hard cap on message fetch page size.
    pub max_fetch_limit: usize,
    /// Attempts before an atomic unit gives up with `Conflict`.
    pub txn_retry_budget: u32,
    /// Character cap for the denormalized last-message preview.
    pub last_message_preview_len: usize,
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        Self {
            default_list_limit: env_usize("MSG_DEFAULT_LIST_LIMIT", 20),
            max_list_limit: env_usize("MSG_MAX_LIST_LIMIT", 100),
            default_fetch_limit: env_usize("MSG_DEFAULT_FETCH_LIMIT", 50),
            max_fetch_limit: env_usize("MSG_MAX_FETCH_LIMIT", 200),
            txn_retry_budget: env::var("MSG_TXN_RETRY_BUDGET")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            last_message_preview_len: env_usize("MSG_PREVIEW_LEN", 120),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_list_limit: 20,
            max_list_limit: 100,
            default_fetch_limit: 50,
            max_fetch_limit: 200,
            txn_retry_budget: 5,
            last_message_preview_len: 120,
        }
    }
}

impl Config {
    pub fn test_defaults() -> Self {
        Self::default()
    }
}
