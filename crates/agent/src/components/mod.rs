//! 代理内部组件

pub mod build_pipeline;
pub mod control_client;
pub mod heartbeat;
