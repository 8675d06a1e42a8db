use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 应用环境变量，值在落库前加密
///
/// (application_id, key) 唯一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub id: Uuid,
    pub application_id: Uuid,
    pub key: String,
    /// AES-GCM加密后的base64密文
    pub encrypted_value: String,
}

pub const ENV_KEY_MAX_LEN: usize = 255;

/// 校验环境变量键: `^[A-Z_][A-Z0-9_]*$`，最长255
pub fn is_valid_env_key(key: &str) -> bool {
    if key.is_empty() || key.len() > ENV_KEY_MAX_LEN {
        return false;
    }
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_conventional_keys() {
        assert!(is_valid_env_key("DATABASE_URL"));
        assert!(is_valid_env_key("_PRIVATE"));
        assert!(is_valid_env_key("PORT2"));
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(!is_valid_env_key(""));
        assert!(!is_valid_env_key("lowercase"));
        assert!(!is_valid_env_key("2PORT"));
        assert!(!is_valid_env_key("WITH-DASH"));
        assert!(!is_valid_env_key(&"A".repeat(256)));
    }
}
