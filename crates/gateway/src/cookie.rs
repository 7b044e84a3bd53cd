//! Session-cookie transport.
//!
//! The cookie value is `<session_id>.<hex HMAC-SHA256(session_id)>`. A
//! cookie whose signature does not verify is ignored, so clients cannot
//! choose their own session ids.

use axum::http::{HeaderMap, header};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Name, lifetime and signing key of the cookie carrying the session id.
#[derive(Clone)]
pub struct SessionCookie {
    name: String,
    max_age_secs: u64,
    secret: Vec<u8>,
}

impl std::fmt::Debug for SessionCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCookie")
            .field("name", &self.name)
            .field("max_age_secs", &self.max_age_secs)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl SessionCookie {
    pub fn new(name: impl Into<String>, max_age_secs: u64, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            max_age_secs,
            secret: secret.into(),
        }
    }

    /// A fresh random signing key, for when none is configured.
    pub fn random_secret() -> String {
        format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Session id from the request's `Cookie` headers, if present, well
    /// formed and correctly signed. Ids are limited to ASCII letters,
    /// digits, `-` and `_` so they are safe as directory names downstream.
    pub fn read(&self, headers: &HeaderMap) -> Option<String> {
        let mut values = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim().trim_matches('"'))
            .peekable();

        if values.peek().is_none() {
            return None;
        }
        let verified = values.find_map(|value| self.verify(value));
        if verified.is_none() {
            tracing::debug!(cookie = %self.name, "Ignoring session cookie with a bad signature");
        }
        verified.map(str::to_string)
    }

    /// `<id>.<signature>` for `session_id`.
    pub fn sign(&self, session_id: &str) -> Option<String> {
        let mac = self.mac(session_id)?;
        Some(format!("{session_id}.{}", hex::encode(mac.finalize().into_bytes())))
    }

    /// `Set-Cookie` value for a freshly issued session id.
    pub fn issue(&self, session_id: &str) -> Option<String> {
        let value = self.sign(session_id)?;
        Some(format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name, value, self.max_age_secs
        ))
    }

    fn verify<'a>(&self, value: &'a str) -> Option<&'a str> {
        let (id, signature) = value.rsplit_once('.')?;
        if !is_valid_id(id) {
            return None;
        }
        let provided = hex::decode(signature).ok()?;
        // Constant-time comparison via `verify_slice`
        self.mac(id)?.verify_slice(&provided).ok()?;
        Some(id)
    }

    fn mac(&self, session_id: &str) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(session_id.as_bytes());
        Some(mac)
    }
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn cookie() -> SessionCookie {
        SessionCookie::new("parley.sid", 86400, "test-secret")
    }

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for c in cookies {
            map.append(header::COOKIE, HeaderValue::from_str(c).unwrap());
        }
        map
    }

    #[test]
    fn reads_signed_cookie_among_others() {
        let cookie = cookie();
        let signed = cookie.sign("abc-123").unwrap();
        assert_eq!(
            cookie.read(&headers(&[format!("theme=dark; parley.sid={signed}").as_str()])),
            Some("abc-123".into())
        );

        let quoted = cookie.sign("q_1").unwrap();
        assert_eq!(
            cookie.read(&headers(&["theme=dark", format!("parley.sid=\"{quoted}\"").as_str()])),
            Some("q_1".into())
        );
    }

    #[test]
    fn unsigned_and_forged_cookies_are_ignored() {
        let cookie = cookie();
        assert_eq!(cookie.read(&headers(&["parley.sid=abc"])), None);

        let signed = cookie.sign("alice").unwrap();
        let (_, signature) = signed.split_once('.').unwrap();
        assert_eq!(cookie.read(&headers(&[format!("parley.sid=mallory.{signature}").as_str()])), None);
        assert_eq!(cookie.read(&headers(&["parley.sid=alice.zz"])), None);

        let other_key = SessionCookie::new("parley.sid", 60, "another-secret");
        assert_eq!(other_key.read(&headers(&[format!("parley.sid={signed}").as_str()])), None);
    }

    #[test]
    fn missing_or_malformed_ids_are_ignored() {
        let cookie = cookie();
        assert_eq!(cookie.read(&headers(&[])), None);
        assert_eq!(cookie.read(&headers(&["parley.sid="])), None);
        let traversal = cookie.sign("../etc").unwrap();
        assert_eq!(cookie.read(&headers(&[format!("parley.sid={traversal}").as_str()])), None);
        let other = cookie.sign("abc").unwrap();
        assert_eq!(cookie.read(&headers(&[format!("other.sid={other}").as_str()])), None);
    }

    #[test]
    fn issued_cookie_carries_signature_and_attributes() {
        let cookie = cookie();
        let issued = cookie.issue("abc").unwrap();
        let signed = cookie.sign("abc").unwrap();
        assert_eq!(
            issued,
            format!("parley.sid={signed}; Path=/; Max-Age=86400; HttpOnly; SameSite=Lax")
        );
        assert_eq!(cookie.read(&headers(&[format!("parley.sid={signed}").as_str()])), Some("abc".into()));
        assert_eq!(cookie.name(), "parley.sid");
    }

    #[test]
    fn random_secrets_differ() {
        assert_ne!(SessionCookie::random_secret(), SessionCookie::random_secret());
        assert!(!format!("{:?}", cookie()).contains("test-secret"));
    }
}
