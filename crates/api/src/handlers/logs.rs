//! 日志流接口
//!
//! 以SSE把代理的频道事件推给客户端。代理不保存历史，连接建立
//! 之前的事件不会重放；构建的完整日志走 `GET /builds/{id}` 读
//! 持久化的build_log。客户端断开时订阅随流一起析构，频道被代理
//! 自动清理。

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use platform_infrastructure::log_broker::{build_channel, runtime_channel, LogBroker};
use uuid::Uuid;

fn channel_stream(
    broker: &LogBroker,
    channel: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = broker.subscribe(&channel);
    let stream = futures::stream::unfold(subscription, |mut subscription| async move {
        let event = subscription.receiver.recv().await?;
        let sse_event = Event::default()
            .event(event.event)
            .data(event.payload.to_string());
        Some((Ok(sse_event), subscription))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn stream_build_logs(
    State(state): State<crate::routes::AppState>,
    Path(build_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    channel_stream(&state.broker, build_channel(build_id))
}

pub async fn stream_runtime_logs(
    State(state): State<crate::routes::AppState>,
    Path(application_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    channel_stream(&state.broker, runtime_channel(application_id))
}
