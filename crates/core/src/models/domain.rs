use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 应用自定义域名
///
/// DNS验证与SSL证书是两条互不阻塞的状态机，域名可以先验证
/// 通过再等证书，但证书激活必须以验证通过为前提。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDomain {
    pub id: Uuid,
    pub application_id: Uuid,
    /// 规范化后的小写主机名
    pub hostname: String,
    pub verification_token: String,
    pub verification: DomainVerification,
    pub ssl_status: SslStatus,
    pub created_at: DateTime<Utc>,
}

/// DNS验证状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainVerification {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "VERIFIED")]
    Verified,
}

impl DomainVerification {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainVerification::Pending => "PENDING",
            DomainVerification::Verified => "VERIFIED",
        }
    }
}

impl std::fmt::Display for DomainVerification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DomainVerification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DomainVerification::Pending),
            "VERIFIED" => Ok(DomainVerification::Verified),
            _ => Err(format!("Invalid domain verification status: {s}")),
        }
    }
}

super::impl_varchar_status!(DomainVerification);

/// SSL证书状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SslStatus {
    #[serde(rename = "NONE")]
    None,
    #[serde(rename = "PROVISIONING")]
    Provisioning,
    #[serde(rename = "ACTIVE")]
    Active,
}

impl SslStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslStatus::None => "NONE",
            SslStatus::Provisioning => "PROVISIONING",
            SslStatus::Active => "ACTIVE",
        }
    }
}

impl std::fmt::Display for SslStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SslStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(SslStatus::None),
            "PROVISIONING" => Ok(SslStatus::Provisioning),
            "ACTIVE" => Ok(SslStatus::Active),
            _ => Err(format!("Invalid ssl status: {s}")),
        }
    }
}

super::impl_varchar_status!(SslStatus);

/// 主机名规范化：小写并去掉末尾的点
pub fn normalize_hostname(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_hostnames() {
        assert_eq!(normalize_hostname("App.Example.COM."), "app.example.com");
        assert_eq!(normalize_hostname("  www.foo.io "), "www.foo.io");
    }
}
