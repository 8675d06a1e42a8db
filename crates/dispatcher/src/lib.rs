//! 部署编排
//!
//! 调度、任务分发与来自节点的状态回调处理。分发是发射后不管：
//! 发送成功只代表代理收到任务，构建结果通过签名回调异步到达。

pub mod dispatcher;
pub mod node_monitor;
pub mod scheduler;
pub mod state_listener;

pub use dispatcher::{ControlReceipt, DeployDispatcher, DeployReceipt};
pub use node_monitor::NodeMonitor;
pub use scheduler::CapacityScheduler;
pub use state_listener::CallbackProcessor;
