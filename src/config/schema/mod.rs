use crate::errors::BridgeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Generates a `Debug` impl that redacts secret fields.
///
/// Field specifiers:
/// - `field_name`           : printed normally via `&self.field_name`
/// - `redact_option(field_name)`: `Option<String>` field: shows `None` or `Some("[REDACTED]")`
macro_rules! redact_debug {
    (@field $builder:ident, $self:ident, redact_option($field:ident)) => {
        $builder.field(
            stringify!($field),
            &$self.$field.as_ref().map(|_| "[REDACTED]"),
        );
    };
    (@field $builder:ident, $self:ident, $field:ident) => {
        $builder.field(stringify!($field), &$self.$field);
    };

    (@fields $builder:ident, $self:ident,) => {};
    (@fields $builder:ident, $self:ident, redact_option($field:ident), $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, redact_option($field));
        redact_debug!(@fields $builder, $self, $($rest)*);
    };
    (@fields $builder:ident, $self:ident, $field:ident, $($rest:tt)*) => {
        redact_debug!(@field $builder, $self, $field);
        redact_debug!(@fields $builder, $self, $($rest)*);
    };

    ($struct_name:ident, $($fields:tt)*) => {
        impl std::fmt::Debug for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut builder = f.debug_struct(stringify!($struct_name));
                redact_debug!(@fields builder, self, $($fields)*);
                builder.finish()
            }
        }
    };
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Decision service
// ---------------------------------------------------------------------------

fn default_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_process_path() -> String {
    "/api/process".to_string()
}

fn default_scheduled_path() -> String {
    "/api/scheduled".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

fn default_device_id() -> String {
    "chatbridge".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_base_url", rename = "baseUrl")]
    pub base_url: String,
    #[serde(default = "default_process_path", rename = "processPath")]
    pub process_path: String,
    #[serde(default = "default_scheduled_path", rename = "scheduledPath")]
    pub scheduled_path: String,
    /// Hard deadline for each call, in seconds.
    #[serde(default = "default_service_timeout", rename = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(default = "default_device_id", rename = "deviceId")]
    pub device_id: String,
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            process_path: default_process_path(),
            scheduled_path: default_scheduled_path(),
            timeout_secs: default_service_timeout(),
            device_id: default_device_id(),
            api_key: None,
        }
    }
}

redact_debug!(
    ServiceConfig,
    base_url,
    process_path,
    scheduled_path,
    timeout_secs,
    device_id,
    redact_option(api_key),
);

// ---------------------------------------------------------------------------
// Dispatch queue
// ---------------------------------------------------------------------------

/// Deployment profile for the dispatch queue ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum QueueProfile {
    /// Full relay, up to 100 concurrent decision calls.
    #[default]
    Standard,
    /// AI-only deployment, up to 3 concurrent decision calls.
    AiOnly,
}

impl QueueProfile {
    pub fn default_concurrency(self) -> usize {
        match self {
            Self::Standard => 100,
            Self::AiOnly => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueueConfig {
    #[serde(default)]
    pub profile: QueueProfile,
    #[serde(default, rename = "maxConcurrency", skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl QueueConfig {
    pub fn concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| self.profile.default_concurrency())
    }
}

// ---------------------------------------------------------------------------
// Dedup and reply cache
// ---------------------------------------------------------------------------

fn default_bucket_ms() -> u64 {
    5000
}

fn default_dedup_capacity() -> usize {
    100
}

fn default_evict_batch() -> usize {
    20
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    #[serde(default = "default_bucket_ms", rename = "bucketMs")]
    pub bucket_ms: u64,
    #[serde(default = "default_dedup_capacity")]
    pub capacity: usize,
    #[serde(default = "default_evict_batch", rename = "evictBatch")]
    pub evict_batch: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            bucket_ms: default_bucket_ms(),
            capacity: default_dedup_capacity(),
            evict_batch: default_evict_batch(),
        }
    }
}

fn default_cache_capacity() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyCacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for ReplyCacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

fn default_interval_minutes() -> u64 {
    10
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes", rename = "intervalMinutes")]
    pub interval_minutes: u64,
    /// IANA timezone used to render the `time` hint sent with each pull.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            timezone: default_timezone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// How long inactive chat contexts are kept in the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "policy", rename_all = "camelCase")]
pub enum RetentionPolicy {
    #[default]
    Infinite,
    MaxAge { days: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// SQLite file; defaults to `<home>/chatbridge.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
}

impl StorageConfig {
    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        match &self.path {
            Some(p) => Ok(crate::utils::expand_home(p)),
            None => Ok(crate::utils::get_chatbridge_home()?.join("chatbridge.db")),
        }
    }
}

// ---------------------------------------------------------------------------
// Host adapter and gateway
// ---------------------------------------------------------------------------

fn default_package_id() -> String {
    "com.tencent.mm".to_string()
}

fn default_notification_ttl() -> u64 {
    600
}

fn default_bot_name() -> String {
    "bot".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Package whose notifications are observed and replied to.
    #[serde(default = "default_package_id", rename = "packageId")]
    pub package_id: String,
    /// Lifetime of a posted notification (and its capability) on the live board.
    #[serde(default = "default_notification_ttl", rename = "notificationTtlSecs")]
    pub notification_ttl_secs: u64,
    #[serde(default = "default_bot_name", rename = "botName")]
    pub bot_name: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            package_id: default_package_id(),
            notification_ttl_secs: default_notification_ttl(),
            bot_name: default_bot_name(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    18791
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// HMAC-SHA256 secret; when set, `POST /api/events` requires `X-Signature-256`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret: None,
        }
    }
}

redact_debug!(GatewayConfig, host, port, redact_option(secret),);

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

fn default_activity_capacity() -> usize {
    200
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default, rename = "replyCache")]
    pub reply_cache: ReplyCacheConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default = "default_activity_capacity", rename = "activityCapacity")]
    pub activity_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            queue: QueueConfig::default(),
            dedup: DedupConfig::default(),
            reply_cache: ReplyCacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            storage: StorageConfig::default(),
            host: HostConfig::default(),
            gateway: GatewayConfig::default(),
            activity_capacity: default_activity_capacity(),
        }
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.validate_service()?;
        self.validate_queue()?;
        self.validate_dedup()?;
        self.validate_scheduler()?;
        if self.reply_cache.capacity == 0 {
            return Err(BridgeError::Config("replyCache.capacity must be > 0".into()));
        }
        if self.activity_capacity == 0 {
            return Err(BridgeError::Config("activityCapacity must be > 0".into()));
        }
        if self.host.package_id.trim().is_empty() {
            return Err(BridgeError::Config("host.packageId must not be empty".into()));
        }
        if let RetentionPolicy::MaxAge { days: 0 } = self.storage.retention {
            return Err(BridgeError::Config(
                "storage.retention.days must be > 0".into(),
            ));
        }
        Ok(())
    }

    fn validate_service(&self) -> Result<(), BridgeError> {
        let s = &self.service;
        if s.base_url.trim().is_empty() {
            return Err(BridgeError::Config("service.baseUrl must not be empty".into()));
        }
        if !s.base_url.starts_with("http://") && !s.base_url.starts_with("https://") {
            return Err(BridgeError::Config(format!(
                "service.baseUrl must be an http(s) URL, got '{}'",
                s.base_url
            )));
        }
        if s.timeout_secs == 0 {
            return Err(BridgeError::Config("service.timeoutSecs must be > 0".into()));
        }
        Ok(())
    }

    fn validate_queue(&self) -> Result<(), BridgeError> {
        if self.queue.concurrency() == 0 {
            return Err(BridgeError::Config("queue.maxConcurrency must be > 0".into()));
        }
        Ok(())
    }

    fn validate_dedup(&self) -> Result<(), BridgeError> {
        let d = &self.dedup;
        if d.bucket_ms == 0 {
            return Err(BridgeError::Config("dedup.bucketMs must be > 0".into()));
        }
        if d.capacity == 0 {
            return Err(BridgeError::Config("dedup.capacity must be > 0".into()));
        }
        if d.evict_batch == 0 || d.evict_batch > d.capacity {
            return Err(BridgeError::Config(
                "dedup.evictBatch must be between 1 and dedup.capacity".into(),
            ));
        }
        Ok(())
    }

    fn validate_scheduler(&self) -> Result<(), BridgeError> {
        let s = &self.scheduler;
        if s.interval_minutes == 0 {
            return Err(BridgeError::Config(
                "scheduler.intervalMinutes must be > 0".into(),
            ));
        }
        if s.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(BridgeError::Config(format!(
                "scheduler.timezone '{}' is not a valid IANA timezone",
                s.timezone
            )));
        }
        Ok(())
    }
}
