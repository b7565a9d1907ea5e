pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::{
    Config, DedupConfig, GatewayConfig, HostConfig, QueueConfig, QueueProfile, ReplyCacheConfig,
    RetentionPolicy, SchedulerConfig, ServiceConfig, StorageConfig,
};
