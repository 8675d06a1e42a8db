//! 节点任务通道
//!
//! 节点代理经WebSocket维持一条长连接，控制面把任务帧以JSON文本
//! 下发。认证在升级之前完成，未通过验签的连接不会进入注册表。
//! 连接关闭（无论哪端发起）都会注销节点，使后续任务发送快速失败。

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::HeaderMap,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::authenticate_node;
use crate::error::ApiError;
use crate::routes::AppState;

pub async fn node_channel(
    State(state): State<AppState>,
    Path(node_id): Path<Uuid>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    authenticate_node(&state.nodes, node_id, &headers).await?;
    Ok(ws.on_upgrade(move |socket| pump_tasks(state, node_id, socket)))
}

async fn pump_tasks(state: AppState, node_id: Uuid, mut socket: WebSocket) {
    let mut tasks = state.links.register(node_id).await;
    info!("节点 {} 任务通道已建立", node_id);

    loop {
        tokio::select! {
            task = tasks.recv() => {
                // 接收端关闭意味着连接被新注册替换
                let Some(task) = task else { break };
                let frame = match serde_json::to_string(&task) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("任务 {} 序列化失败: {}", task.task_id, e);
                        continue;
                    }
                };
                if socket.send(Message::Text(frame.into())).await.is_err() {
                    warn!("节点 {} 任务帧写入失败，关闭通道", node_id);
                    break;
                }
            }
            message = socket.recv() => {
                match message {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("节点 {} 连接错误: {}", node_id, e);
                        break;
                    }
                }
            }
        }
    }

    state.links.deregister(node_id).await;
    info!("节点 {} 任务通道已关闭", node_id);
}
