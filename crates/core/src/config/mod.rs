//! 配置模块
//!
//! 配置来源优先级：默认值 < TOML文件 < 环境变量（前缀 PLATFORM_）。

pub mod api_observability;
pub mod app_config;
pub mod database;
pub mod dispatcher_agent;

pub use api_observability::{ApiConfig, ObservabilityConfig};
pub use app_config::{AppConfig, SecurityConfig};
pub use database::DatabaseConfig;
pub use dispatcher_agent::{AgentConfig, DispatcherConfig};
