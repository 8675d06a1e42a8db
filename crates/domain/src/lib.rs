//! 业务规则层
//!
//! 不依赖任何IO：节点签名令牌的签发与校验、应用/构建/域名的
//! 状态转换表、调度所需的资源需求计算。

pub mod node_auth;
pub mod requirements;
pub mod state_machine;

pub use node_auth::{NodeClaims, authorize_for_node, generate_registration_token, generate_signing_secret, issue_node_token, verify_node_token};
pub use requirements::ResourceRequirements;
