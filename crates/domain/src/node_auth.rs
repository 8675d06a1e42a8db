//! 节点身份令牌
//!
//! 每个节点持有注册时下发的独立签名密钥。节点发起的所有回调都
//! 携带以该密钥签名的HS256令牌，`sub` 为节点ID。校验方必须同时
//! 验证签名与 `sub` 等于资源实际归属的节点：密钥是按节点隔离的，
//! 节点A的合法签名不能用于操作节点B的资源。

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use platform_core::errors::{PlatformError, PlatformResult};

/// 节点令牌默认有效期
const NODE_TOKEN_TTL_HOURS: i64 = 24;

/// 节点令牌声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClaims {
    /// 节点ID
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
}

impl NodeClaims {
    pub fn node_id(&self) -> PlatformResult<Uuid> {
        self.sub
            .parse::<Uuid>()
            .map_err(|_| PlatformError::Unauthorized("令牌中的节点ID无效".to_string()))
    }
}

/// 生成节点签名密钥，base64编码的32字节随机值
///
/// 仅在注册时生成并下发一次。
pub fn generate_signing_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    general_purpose::STANDARD.encode(bytes)
}

/// 生成一次性注册令牌
pub fn generate_registration_token() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// 为节点签发身份令牌
pub fn issue_node_token(node_id: Uuid, signing_secret: &str) -> PlatformResult<String> {
    let now = Utc::now();
    let claims = NodeClaims {
        sub: node_id.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::hours(NODE_TOKEN_TTL_HOURS)).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(signing_secret.as_bytes()),
    )
    .map_err(|e| PlatformError::Crypto(format!("签发节点令牌失败: {e}")))
}

/// 用指定密钥校验节点令牌
pub fn verify_node_token(token: &str, signing_secret: &str) -> PlatformResult<NodeClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<NodeClaims>(
        token,
        &DecodingKey::from_secret(signing_secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| PlatformError::Unauthorized("节点令牌无效或已过期".to_string()))
}

/// 校验令牌属于指定节点
///
/// 用资源归属节点的密钥验证签名，再核对 `sub` 声明与该节点ID
/// 一致。任一不符即拒绝，不产生任何状态变更。
pub fn authorize_for_node(
    token: &str,
    expected_node_id: Uuid,
    signing_secret: &str,
) -> PlatformResult<NodeClaims> {
    let claims = verify_node_token(token, signing_secret)?;
    if claims.node_id()? != expected_node_id {
        return Err(PlatformError::Unauthorized(
            "令牌声明的节点与资源归属节点不一致".to_string(),
        ));
    }
    Ok(claims)
}
