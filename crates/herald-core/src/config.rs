use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PROVIDER_TARGET: &str = "confluence-stub";
pub const DEFAULT_SPACE: &str = "DEV";
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024; // 10 MiB per upload

/// Top-level config (herald.toml + HERALD_* env overrides).
///
/// Every section has defaults so a missing file still yields a runnable
/// gateway backed by the stub provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Origins allowed by the CORS layer. Empty means no CORS headers.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            cors_origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Scheduler loop, worker pool and retry policy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between polling ticks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound on rows listed per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum publish attempts running at once.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,
    /// Attempts before a transient failure becomes terminal.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Jitter ratio applied to each backoff delay (0.2 = ±20%).
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Per-attempt deadline for a provider call.
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Claims older than this are treated as abandoned and requeued on the
    /// next tick. Must exceed `attempt_timeout_secs`.
    #[serde(default = "default_claim_ttl_secs")]
    pub claim_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            worker_concurrency: default_worker_concurrency(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_jitter: default_backoff_jitter(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            claim_ttl_secs: default_claim_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    /// Space key applied to pages created without one.
    #[serde(default = "default_space")]
    pub default_space: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            default_space: default_space(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_attachment_dir")]
    pub attachment_dir: String,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            attachment_dir: default_attachment_dir(),
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Target used when a publish or schedule request names none.
    #[serde(default = "default_provider_target")]
    pub default_target: String,
    /// Registers the `confluence` target when present.
    pub confluence: Option<ConfluenceConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_target: default_provider_target(),
            confluence: None,
        }
    }
}

/// Confluence REST credentials.
///
/// Server and Data Center take a personal access token as a bearer token.
/// Atlassian Cloud needs `username` (the account email) with an API token,
/// sent as HTTP Basic auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    /// e.g. "https://wiki.example.com" (a trailing "/rest/api" is tolerated).
    pub base_url: String,
    pub api_token: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:4200".to_string(),
    ]
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_batch_size() -> usize {
    10
}
fn default_worker_concurrency() -> usize {
    4
}
fn default_max_attempts() -> u32 {
    5
}
fn default_backoff_base_ms() -> u64 {
    2_000
}
fn default_backoff_max_ms() -> u64 {
    300_000
}
fn default_backoff_jitter() -> f64 {
    0.2
}
fn default_attempt_timeout_secs() -> u64 {
    30
}
fn default_claim_ttl_secs() -> u64 {
    600
}
fn default_request_timeout_secs() -> u64 {
    20
}
fn default_space() -> String {
    DEFAULT_SPACE.to_string()
}
fn default_provider_target() -> String {
    DEFAULT_PROVIDER_TARGET.to_string()
}
fn default_max_attachment_bytes() -> u64 {
    MAX_ATTACHMENT_BYTES
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}
fn default_attachment_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/attachments", home)
}

impl HeraldConfig {
    /// Load config from a TOML file with HERALD_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g.
    /// `HERALD_SCHEDULER__MAX_ATTEMPTS=8`. A missing file is not an error;
    /// the defaults apply.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: HeraldConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("HERALD_").split("__"))
            .extract()
            .map_err(|e| crate::error::HeraldError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::error::Result<()> {
        let s = &self.scheduler;
        if s.max_attempts == 0 {
            return Err(crate::error::HeraldError::Config(
                "scheduler.max_attempts must be at least 1".to_string(),
            ));
        }
        if s.worker_concurrency == 0 || s.batch_size == 0 {
            return Err(crate::error::HeraldError::Config(
                "scheduler.worker_concurrency and scheduler.batch_size must be positive"
                    .to_string(),
            ));
        }
        if s.claim_ttl_secs <= s.attempt_timeout_secs {
            return Err(crate::error::HeraldError::Config(
                "scheduler.claim_ttl_secs must exceed scheduler.attempt_timeout_secs".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&s.backoff_jitter) {
            return Err(crate::error::HeraldError::Config(
                "scheduler.backoff_jitter must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}
