//! 节点代理
//!
//! 运行在Worker节点上的守护进程：向控制面注册并持有节点身份，
//! 维持心跳与任务通道，执行部署/控制任务，经签名回调回报构建
//! 状态与日志。

pub mod components;
pub mod service;

pub use service::AgentService;
