//! 应用/构建/域名的状态转换表
//!
//! 状态转换显式列举，非法转换被拒绝并记录，而不是悄悄应用。

use platform_core::errors::{PlatformError, PlatformResult};
use platform_core::models::{AppStatus, BuildStatus, DomainVerification, SslStatus};

/// 应用状态是否允许从 `from` 转到 `to`
pub fn app_transition_allowed(from: AppStatus, to: AppStatus) -> bool {
    use AppStatus::*;
    matches!(
        (from, to),
        (Pending, Building)
            | (Building, Deploying)
            | (Building, Failed)
            | (Deploying, Running)
            | (Deploying, Failed)
            | (Running, Stopped)
            | (Running, Suspended)
            | (Running, Building)
            | (Failed, Building)
            | (Stopped, Building)
            | (Stopped, Running)
            | (Suspended, Running)
    )
}

/// 校验应用状态转换，非法转换返回错误
pub fn check_app_transition(from: AppStatus, to: AppStatus) -> PlatformResult<()> {
    if from == to || app_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(PlatformError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// 构建状态是否允许从 `from` 转到 `to`
///
/// 终态（SUCCESS/FAILED）不可被任何后续状态覆盖，乱序到达的
/// 非终态回调因此被拒绝。
pub fn build_transition_allowed(from: BuildStatus, to: BuildStatus) -> bool {
    use BuildStatus::*;
    if from.is_terminal() {
        return false;
    }
    matches!(
        (from, to),
        (Queued, Building) | (Queued, Success) | (Queued, Failed) | (Building, Success) | (Building, Failed)
    )
}

/// 校验构建状态转换
pub fn check_build_transition(from: BuildStatus, to: BuildStatus) -> PlatformResult<()> {
    if build_transition_allowed(from, to) {
        Ok(())
    } else {
        Err(PlatformError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// SSL状态推进是否合法
///
/// 证书激活必须以DNS验证通过为前提，验证与证书两条状态机在
/// 这之外互不阻塞。
pub fn ssl_transition_allowed(
    verification: DomainVerification,
    from: SslStatus,
    to: SslStatus,
) -> bool {
    use SslStatus::*;
    let order_ok = matches!((from, to), (None, Provisioning) | (Provisioning, Active));
    if !order_ok {
        return false;
    }
    if to == Active && verification != DomainVerification::Verified {
        return false;
    }
    true
}
