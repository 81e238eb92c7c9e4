use regex::Regex;
use std::sync::OnceLock;

/// Exact length of user names and codes
pub const TOKEN_LEN: usize = 5;

fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9]{5}$").expect("token pattern is valid"))
}

/// 校验用户名 / 兑换码：5 位 ASCII 字母或数字
pub fn is_valid_token(value: &str) -> bool {
    token_regex().is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tokens() {
        assert!(is_valid_token("alice"));
        assert!(is_valid_token("AAAAA"));
        assert!(is_valid_token("a1B2c"));
        assert!(is_valid_token("00000"));
    }

    #[test]
    fn test_invalid_tokens() {
        assert!(!is_valid_token(""));
        assert!(!is_valid_token("ab"));
        assert!(!is_valid_token("abcdef"));
        assert!(!is_valid_token("ab-de"));
        assert!(!is_valid_token("ab de"));
        assert!(!is_valid_token("abcd\n"));
        // 非 ASCII 字母不接受
        assert!(!is_valid_token("äbcde"));
    }
}
