use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// 下发给节点代理的任务描述
///
/// 任务不落库，每次分发组装一份。部署任务的 `task_id` 等于构建ID，
/// 代理可据此对重复投递去重；控制任务以 `{应用ID}:{时间戳}` 为键。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub application_id: Uuid,
    #[serde(flatten)]
    pub payload: TaskPayload,
}

/// 任务载荷，按 `type` 字段区分
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskPayload {
    Deploy(DeployTask),
    Control(ControlTask),
}

/// 部署任务：克隆、构建、启动容器的全部输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployTask {
    pub build_id: Uuid,
    pub git_url: String,
    pub git_branch: String,
    #[serde(default)]
    pub git_commit: Option<String>,
    pub base_image: String,
    pub build_command: String,
    pub start_command: String,
    pub port: i32,
    pub cpu_millis: i64,
    pub memory_mb: i64,
    pub disk_mb: i64,
    pub instances: i32,
    /// 明文环境变量，仅存在于任务载荷中，不落库
    pub env: BTreeMap<String, String>,
    /// 规范化去重后的自定义域名
    pub domains: Vec<String>,
    /// 除非运行时显式允许，否则容器以非root运行
    pub run_as_root: bool,
}

/// 控制任务：对已部署应用的启停/重启/扩缩容
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlTask {
    pub action: ControlAction,
    #[serde(default)]
    pub instances: Option<i32>,
}

/// 控制动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Stop,
    Restart,
    Scale,
}

impl ControlAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlAction::Start => "start",
            ControlAction::Stop => "stop",
            ControlAction::Restart => "restart",
            ControlAction::Scale => "scale",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ControlAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ControlAction::Start),
            "stop" => Ok(ControlAction::Stop),
            "restart" => Ok(ControlAction::Restart),
            "scale" => Ok(ControlAction::Scale),
            _ => Err(format!("Invalid control action: {s}")),
        }
    }
}

/// 节点回报的任务状态
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskStatusReport {
    pub status: String,
    #[serde(default)]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_task_serializes_with_type_tag() {
        let task = TaskDescriptor {
            task_id: "b1".to_string(),
            application_id: Uuid::new_v4(),
            payload: TaskPayload::Deploy(DeployTask {
                build_id: Uuid::new_v4(),
                git_url: "https://git.example.com/app.git".to_string(),
                git_branch: "main".to_string(),
                git_commit: None,
                base_image: "node:20-alpine".to_string(),
                build_command: "npm install".to_string(),
                start_command: "npm start".to_string(),
                port: 3000,
                cpu_millis: 500,
                memory_mb: 256,
                disk_mb: 1024,
                instances: 1,
                env: BTreeMap::new(),
                domains: vec![],
                run_as_root: false,
            }),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["type"], "deploy");
        assert_eq!(json["task_id"], "b1");
    }

    #[test]
    fn control_task_round_trips() {
        let json = serde_json::json!({
            "task_id": "a:1700000000",
            "application_id": Uuid::new_v4(),
            "type": "control",
            "action": "scale",
            "instances": 3
        });
        let task: TaskDescriptor = serde_json::from_value(json).unwrap();
        match task.payload {
            TaskPayload::Control(c) => {
                assert_eq!(c.action, ControlAction::Scale);
                assert_eq!(c.instances, Some(3));
            }
            _ => panic!("expected control task"),
        }
    }
}
