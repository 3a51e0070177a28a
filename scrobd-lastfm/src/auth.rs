//! Authentication flow: token request, authorization URL, session
//! exchange
//!
//! The flow is three steps spread across the user's attention span:
//! request a token, send the user to the authorization page, then
//! exchange the approved token for a permanent session key. Until the
//! user approves, `auth_get_session` fails with code 14
//! ([`Error::is_unauthorized_token`]); callers poll on that.

use crate::error::{Error, Result};
use crate::types::{Session, Token};
use crate::{Client, AUTH_PAGE_URL};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize)]
struct TokenDocument {
    token: String,
}

#[derive(Debug, Deserialize)]
struct SessionDocument {
    session: SessionNode,
}

#[derive(Debug, Deserialize)]
struct SessionNode {
    #[serde(default)]
    name: String,
    key: String,
    #[serde(default)]
    subscriber: u8,
}

impl Client {
    /// Request an unauthorized token (`auth.getToken`).
    pub async fn auth_get_token(&self) -> Result<Token> {
        let body = self.call("auth.getToken", BTreeMap::new(), false).await?;
        let doc: TokenDocument =
            quick_xml::de::from_str(&body).map_err(|e| Error::Parse(e.to_string()))?;

        if doc.token.is_empty() {
            return Err(Error::Parse("empty token in response".to_string()));
        }
        Ok(Token { token: doc.token })
    }

    /// The page the user must visit to authorize `token`.
    pub fn auth_url(&self, token: &str) -> String {
        format!("{}?api_key={}&token={}", AUTH_PAGE_URL, self.api_key, token)
    }

    /// Exchange an authorized token for a session key
    /// (`auth.getSession`). Fails with code 14 while the user has not
    /// yet approved, and code 15 once the token has expired.
    pub async fn auth_get_session(&self, token: &str) -> Result<Session> {
        let mut params = BTreeMap::new();
        params.insert("token".to_string(), token.to_string());

        let body = self.call("auth.getSession", params, false).await?;
        let doc: SessionDocument =
            quick_xml::de::from_str(&body).map_err(|e| Error::Parse(e.to_string()))?;

        if doc.session.key.is_empty() {
            return Err(Error::Parse("empty session key in response".to_string()));
        }

        Ok(Session {
            key: doc.session.key,
            username: doc.session.name,
            subscriber: doc.session.subscriber == 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClientConfig;

    fn client() -> Client {
        Client::new(ClientConfig {
            api_key: "test-key".into(),
            api_secret: "test-secret".into(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn auth_url_embeds_key_and_token() {
        let url = client().auth_url("tok123");
        assert_eq!(
            url,
            "https://www.last.fm/api/auth/?api_key=test-key&token=tok123"
        );
    }

    #[test]
    fn token_document_parses() {
        let body = r#"<lfm status="ok"><token>cf45fe5a3e3cebe368f0a0851ccf8e4f</token></lfm>"#;
        let doc: TokenDocument = quick_xml::de::from_str(body).unwrap();
        assert_eq!(doc.token, "cf45fe5a3e3cebe368f0a0851ccf8e4f");
    }

    #[test]
    fn session_document_parses() {
        let body = r#"<lfm status="ok">
  <session>
    <name>listener</name>
    <key>d580d57f32848f5dcf574d1ce18d78b2</key>
    <subscriber>0</subscriber>
  </session>
</lfm>"#;
        let doc: SessionDocument = quick_xml::de::from_str(body).unwrap();
        assert_eq!(doc.session.name, "listener");
        assert_eq!(doc.session.key, "d580d57f32848f5dcf574d1ce18d78b2");
        assert_eq!(doc.session.subscriber, 0);
    }
}
