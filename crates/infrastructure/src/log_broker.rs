//! 日志流代理
//!
//! 进程内发布/订阅，把构建与运行时日志块扇出给在线订阅者
//! （SSE等）。代理不保存任何历史：订阅晚于发布的事件永远看不到，
//! 持久日志以builds.build_log与外部日志存储为准。
//!
//! 两个频道命名空间：`build:<构建ID>` 与 `runtime:<应用ID>`。
//! 对单个订阅者的投递失败不影响其他订阅者，也不上抛给发布方。

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

const SUBSCRIBER_BUFFER: usize = 256;

/// 一条日志事件
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEvent {
    pub event: String,
    pub payload: Value,
}

/// 构建日志频道名
pub fn build_channel(build_id: Uuid) -> String {
    format!("build:{build_id}")
}

/// 运行时日志频道名
pub fn runtime_channel(application_id: Uuid) -> String {
    format!("runtime:{application_id}")
}

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<LogEvent>,
}

#[derive(Default)]
struct BrokerState {
    channels: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

/// 进程内日志扇出代理
#[derive(Clone, Default)]
pub struct LogBroker {
    state: Arc<Mutex<BrokerState>>,
}

/// 活跃订阅，Drop时自动从频道注销
pub struct LogSubscription {
    pub receiver: mpsc::Receiver<LogEvent>,
    channel: String,
    id: u64,
    state: Arc<Mutex<BrokerState>>,
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = state.channels.get_mut(&self.channel) {
            subs.retain(|s| s.id != self.id);
            if subs.is_empty() {
                state.channels.remove(&self.channel);
            }
        }
    }
}

impl LogBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅一个频道
    pub fn subscribe(&self, channel: &str) -> LogSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let id = state.next_id;
        state.next_id += 1;
        state
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender: tx });

        LogSubscription {
            receiver: rx,
            channel: channel.to_string(),
            id,
            state: Arc::clone(&self.state),
        }
    }

    /// 向频道的全部订阅者扇出一条事件
    ///
    /// 无订阅者时是空操作。投递失败（订阅者缓冲满或已关闭）只影响
    /// 该订阅者，关闭的订阅者被就地清除。
    pub fn publish(&self, channel: &str, event: &str, payload: Value) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let Some(subs) = state.channels.get_mut(channel) else {
            return;
        };

        let message = LogEvent {
            event: event.to_string(),
            payload,
        };

        subs.retain(|sub| match sub.sender.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                trace!("频道 {} 的订阅者缓冲已满，丢弃事件", channel);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if subs.is_empty() {
            state.channels.remove(channel);
        }
    }

    /// 当前持有订阅者的频道数，用于测试与内省
    pub fn channel_count(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .channels
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn fans_out_to_all_subscribers() {
        let broker = LogBroker::new();
        let channel = build_channel(Uuid::new_v4());

        let mut first = broker.subscribe(&channel);
        let mut second = broker.subscribe(&channel);

        broker.publish(&channel, "chunk", json!({"chunk": "compiling..."}));

        assert_eq!(first.receiver.recv().await.unwrap().event, "chunk");
        assert_eq!(second.receiver.recv().await.unwrap().event, "chunk");
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let broker = LogBroker::new();
        broker.publish("build:unknown", "chunk", json!({}));
        assert_eq!(broker.channel_count(), 0);
    }

    #[test]
    fn empty_channels_are_pruned() {
        let broker = LogBroker::new();
        let channel = runtime_channel(Uuid::new_v4());

        let sub = broker.subscribe(&channel);
        assert_eq!(broker.channel_count(), 1);

        drop(sub);
        assert_eq!(broker.channel_count(), 0);
    }

    #[tokio::test]
    async fn closed_subscriber_does_not_block_others() {
        let broker = LogBroker::new();
        let channel = build_channel(Uuid::new_v4());

        let first = broker.subscribe(&channel);
        let mut second = broker.subscribe(&channel);

        // 第一个订阅者在不析构订阅句柄的情况下关闭接收端
        let mut first = first;
        first.receiver.close();

        broker.publish(&channel, "status", json!({"status": "success"}));
        assert_eq!(second.receiver.recv().await.unwrap().event, "status");
    }

    #[test]
    fn subscribers_on_different_channels_are_isolated() {
        let broker = LogBroker::new();
        let a = broker.subscribe("build:a");
        let _b = broker.subscribe("runtime:b");

        broker.publish("runtime:b", "chunk", json!({"chunk": "x"}));

        let mut a = a;
        assert!(a.receiver.try_recv().is_err());
    }
}
