/// file: src/auth.rs
/// description: Bearer credential lookup shared by the channel, SSE and REST calls
use std::collections::HashMap;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Read on every connect so a refreshed cookie is picked up.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// Cookies parsed from a `Cookie:` style header string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: HashMap<String, String>,
}

impl CookieJar {
    pub fn parse(header: &str) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().trim_matches('"').to_string()))
            })
            .collect();
        Self { cookies }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}

impl CredentialSource for CookieJar {
    fn bearer_token(&self) -> Option<String> {
        self.get(ACCESS_TOKEN_COOKIE)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl StaticToken {
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_token_from_cookie_header() {
        let jar = CookieJar::parse("theme=dark; accessToken=abc.def.ghi; lang=ko");
        assert_eq!(jar.bearer_token().as_deref(), Some("abc.def.ghi"));
        assert_eq!(jar.get("lang"), Some("ko"));
    }

    #[test]
    fn test_missing_or_empty_cookie_is_anonymous() {
        assert!(CookieJar::parse("theme=dark").bearer_token().is_none());
        assert!(CookieJar::parse("accessToken=").bearer_token().is_none());
        assert!(CookieJar::parse("").bearer_token().is_none());
        assert!(StaticToken::anonymous().bearer_token().is_none());
    }
}
