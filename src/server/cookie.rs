//! `lp_session` cookie codec.
//!
//! The cookie carries the session id and the per-component variant map as
//! base64-encoded JSON so the browser snippet can read assignments without a
//! round trip. A cookie that fails to decode is treated as absent; the
//! visitor simply gets a fresh session.

use std::collections::HashMap;

use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::storage::{DeviceInfo, VariantLabel, VisitorSession};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "lp_session";

/// Client-visible session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    /// Session identifier.
    pub id: String,
    /// Session start time.
    pub started_at: chrono::DateTime<chrono::Utc>,
    /// Component id -> assigned variant.
    pub variants: HashMap<String, VariantLabel>,
    /// Traffic source (UTM source).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Campaign (UTM campaign).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    /// Device details.
    pub device: DeviceInfo,
}

impl SessionCookie {
    /// Build cookie state from a session record
    pub fn from_session(session: &VisitorSession) -> Self {
        Self {
            id: session.id.clone(),
            started_at: session.started_at,
            variants: session.assignments.clone(),
            source: session.utm_source.clone(),
            campaign: session.utm_campaign.clone(),
            device: session.device.clone(),
        }
    }
}

/// Decode the session cookie from a jar; malformed cookies read as absent.
pub fn decode(jar: &CookieJar) -> Option<SessionCookie> {
    let raw = jar.get(SESSION_COOKIE)?.value().to_string();
    let bytes = URL_SAFE_NO_PAD.decode(raw.as_bytes()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Build the Set-Cookie value for a session.
pub fn issue(session: &VisitorSession, max_age_days: i64) -> Cookie<'static> {
    let payload = SessionCookie::from_session(session);
    let encoded = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap_or_default());

    let raw = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        SESSION_COOKIE,
        encoded,
        max_age_days * 86_400
    );

    match Cookie::parse(raw) {
        Ok(cookie) => cookie.into_owned(),
        // Unreachable with base64 values; keep the session id flowing anyway.
        Err(_) => Cookie::new(SESSION_COOKIE, encoded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_round_trips_session_state() {
        let mut session = VisitorSession::new("lp-1").with_utm(
            Some("newsletter".to_string()),
            Some("spring".to_string()),
        );
        session
            .assignments
            .insert("c1".to_string(), VariantLabel::B);

        let cookie = issue(&session, 30);
        assert_eq!(cookie.name(), SESSION_COOKIE);

        let jar = CookieJar::new().add(cookie);
        let decoded = decode(&jar).expect("cookie should decode");
        assert_eq!(decoded.id, session.id);
        assert_eq!(decoded.variants.get("c1"), Some(&VariantLabel::B));
        assert_eq!(decoded.source.as_deref(), Some("newsletter"));
    }

    #[test]
    fn cookie_attributes_match_contract() {
        let session = VisitorSession::new("lp-1");
        let cookie = issue(&session, 30);

        assert!(cookie.http_only().unwrap_or(false));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.max_age().map(|d| d.whole_seconds()),
            Some(30 * 86_400)
        );
    }

    #[test]
    fn malformed_cookie_reads_as_absent() {
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "not base64 json!!"));
        assert!(decode(&jar).is_none());

        let jar = CookieJar::new().add(Cookie::new(
            SESSION_COOKIE,
            URL_SAFE_NO_PAD.encode(b"{\"half\": "),
        ));
        assert!(decode(&jar).is_none());
    }
}
