use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig},
    database::DatabaseConfig,
    dispatcher_agent::{AgentConfig, DispatcherConfig},
};

/// 系统配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub dispatcher: DispatcherConfig,
    pub agent: AgentConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
    pub observability: ObservabilityConfig,
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 环境变量加密密钥，base64编码的32字节
    pub env_encryption_key: String,
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.env_encryption_key.is_empty() {
            return Err(anyhow::anyhow!("环境变量加密密钥不能为空"));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/platform".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout_seconds: 30,
                idle_timeout_seconds: 600,
            },
            dispatcher: DispatcherConfig {
                enabled: true,
                node_offline_seconds: 90,
                node_monitor_interval_seconds: 30,
                registration_token_ttl_hours: 24,
            },
            agent: AgentConfig {
                enabled: false,
                control_plane_url: "http://127.0.0.1:8080".to_string(),
                host_address: "127.0.0.1".to_string(),
                registration_token: None,
                identity_file: "agent-identity.json".to_string(),
                workspace_dir: "/var/lib/platform-agent/builds".to_string(),
                heartbeat_interval_seconds: 30,
                reconnect_delay_seconds: 5,
            },
            api: ApiConfig {
                enabled: true,
                bind_address: "0.0.0.0:8080".to_string(),
                cors_enabled: true,
                cors_origins: vec!["*".to_string()],
                request_timeout_seconds: 30,
                max_request_size_mb: 10,
            },
            security: SecurityConfig {
                // 仅作占位，生产环境必须通过文件或环境变量覆盖
                env_encryption_key: String::new(),
            },
            observability: ObservabilityConfig {
                tracing_enabled: true,
                log_level: "info".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 加载顺序：
    /// 1. 默认配置
    /// 2. TOML配置文件
    /// 3. 环境变量覆盖（前缀 PLATFORM_）
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let default_toml = toml::to_string(&defaults).context("序列化默认配置失败")?;

        let mut builder = ConfigBuilder::builder()
            .add_source(File::from_str(&default_toml, FileFormat::Toml));

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = [
                "config/platform.toml",
                "platform.toml",
                "/etc/platform/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("PLATFORM")
                .separator("_")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// 从TOML字符串加载配置
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// 序列化为TOML字符串
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 校验配置有效性
    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.dispatcher.validate().context("分发器配置验证失败")?;
        self.agent.validate().context("节点代理配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_toml_applies_sections() {
        let toml_str = r#"
            [database]
            url = "postgresql://db.internal/platform"
            max_connections = 20
            min_connections = 2
            connection_timeout_seconds = 10
            idle_timeout_seconds = 300

            [dispatcher]
            enabled = true
            node_offline_seconds = 120
            node_monitor_interval_seconds = 15
            registration_token_ttl_hours = 24

            [agent]
            enabled = false
            control_plane_url = "http://cp:8080"
            host_address = "10.0.0.5"
            identity_file = "id.toml"
            workspace_dir = "/tmp/builds"
            heartbeat_interval_seconds = 30
            reconnect_delay_seconds = 5

            [api]
            enabled = true
            bind_address = "0.0.0.0:9000"
            cors_enabled = false
            cors_origins = []
            request_timeout_seconds = 30
            max_request_size_mb = 10

            [security]
            env_encryption_key = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="

            [observability]
            tracing_enabled = true
            log_level = "debug"
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.dispatcher.node_offline_seconds, 120);
        assert_eq!(config.api.bind_address, "0.0.0.0:9000");
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = AppConfig::default();
        config.observability.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_offline_threshold() {
        let mut config = AppConfig::default();
        config.dispatcher.node_offline_seconds = 0;
        assert!(config.validate().is_err());
    }
}
