use serde::{Deserialize, Serialize};

/// 分发器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 心跳超过该秒数未到达即视为离线
    pub node_offline_seconds: i64,
    /// 节点监控循环的扫描间隔
    pub node_monitor_interval_seconds: u64,
    /// 注册令牌有效期（小时）
    pub registration_token_ttl_hours: i64,
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_offline_seconds <= 0 {
            return Err(anyhow::anyhow!("节点离线阈值必须大于0"));
        }

        if self.node_monitor_interval_seconds == 0 {
            return Err(anyhow::anyhow!("节点监控间隔必须大于0"));
        }

        if self.registration_token_ttl_hours <= 0 {
            return Err(anyhow::anyhow!("注册令牌有效期必须大于0"));
        }

        Ok(())
    }
}

/// 节点代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub enabled: bool,
    /// 控制面基础地址，例如 http://control.internal:8080
    pub control_plane_url: String,
    pub host_address: String,
    /// 首次启动时用于注册的一次性令牌
    #[serde(default)]
    pub registration_token: Option<String>,
    /// 注册后保存的节点身份文件路径
    pub identity_file: String,
    /// 构建工作区根目录
    pub workspace_dir: String,
    pub heartbeat_interval_seconds: u64,
    pub reconnect_delay_seconds: u64,
}

impl AgentConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.control_plane_url.is_empty() {
            return Err(anyhow::anyhow!("控制面地址不能为空"));
        }

        if self.host_address.is_empty() {
            return Err(anyhow::anyhow!("主机地址不能为空"));
        }

        if self.workspace_dir.is_empty() {
            return Err(anyhow::anyhow!("工作区目录不能为空"));
        }

        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }

        Ok(())
    }
}
