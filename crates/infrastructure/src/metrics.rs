//! 应用运行时指标转发
//!
//! 指标收集器是外部协作方，这里只负责把心跳里的逐应用指标
//! 转发出去。当前实现写入结构化日志，由日志管道接入收集端。

use async_trait::async_trait;
use platform_core::errors::PlatformResult;
use platform_core::models::AppRuntimeMetric;
use platform_core::traits::MetricsRecorder;
use tracing::info;

/// 基于结构化日志的指标转发实现
#[derive(Default)]
pub struct LoggingMetricsRecorder;

impl LoggingMetricsRecorder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsRecorder for LoggingMetricsRecorder {
    async fn record_many(&self, metrics: Vec<AppRuntimeMetric>) -> PlatformResult<()> {
        for metric in metrics {
            info!(
                application_id = %metric.application_id,
                cpu_millis = metric.cpu_millis,
                memory_mb = metric.memory_mb,
                request_rate = metric.request_rate,
                "app_runtime_metric"
            );
        }
        Ok(())
    }
}
