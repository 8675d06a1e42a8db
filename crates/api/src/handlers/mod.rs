//! HTTP处理器

mod callbacks;
mod channel;
mod deployments;
mod logs;
mod nodes;

pub use callbacks::{
    backup_callback, build_log_callback, build_status_callback, domains_activation_callback,
    runtime_log_callback,
};
pub use channel::node_channel;
pub use deployments::{
    add_domain, control_application, delete_env_var, deploy_application, get_build,
    list_domains, list_env_keys, upsert_env_var, verify_domain,
};
pub use logs::{stream_build_logs, stream_runtime_logs};
pub use nodes::{
    delete_node, heartbeat, issue_registration_token, list_nodes, register_node, set_node_status,
};

use axum::Json;
use serde_json::{json, Value};

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
    }))
}
