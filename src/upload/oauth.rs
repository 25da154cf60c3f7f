use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::YoutubeCredentials;

pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(thiserror::Error, Debug, Clone)]
pub enum CredentialError {
    #[error("token endpoint unreachable: {0}")]
    Http(String),

    #[error("refresh token rejected ({status}): {body}. Check YOUTUBE_CLIENT_ID, YOUTUBE_CLIENT_SECRET and YOUTUBE_REFRESH_TOKEN")]
    Rejected { status: u16, body: String },

    #[error("unexpected token response: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
}

/// Short-lived bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Parse a token endpoint body received at `now`
pub fn parse_token_response(body: &str, now: DateTime<Utc>) -> Result<AccessToken, CredentialError> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|e| CredentialError::Malformed(e.to_string()))?;

    let value = parsed
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| CredentialError::Malformed("no access_token in response".to_string()))?;

    let expires_in = parsed.expires_in.unwrap_or(3600);
    let expires_at = Some(expires_in)
        .filter(|secs| *secs >= 0)
        .and_then(ChronoDuration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| CredentialError::Malformed(format!("expires_in out of range: {}", expires_in)))?;

    Ok(AccessToken { value, expires_at })
}

/// Exchanges the long-lived refresh token for access tokens, caching the last one
pub struct TokenProvider {
    http: Client,
    credentials: YoutubeCredentials,
    endpoint: String,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenProvider {
    pub fn new(http: Client, credentials: YoutubeCredentials) -> Self {
        Self {
            http,
            credentials,
            endpoint: TOKEN_ENDPOINT.to_string(),
            cached: Mutex::new(None),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// A valid access token, refreshed when close to expiry
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.refresh().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn refresh(&self) -> Result<AccessToken, CredentialError> {
        tracing::info!("Authenticating with YouTube using refresh token...");

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", self.credentials.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http
            .post(&self.endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(CredentialError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let token = parse_token_response(&body, Utc::now())?;
        tracing::info!("YouTube authentication successful");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_parse_token_response() {
        let token = parse_token_response(
            r#"{"access_token": "ya29.abc", "expires_in": 3599, "token_type": "Bearer"}"#,
            at(0),
        )
        .unwrap();
        assert_eq!(token.value, "ya29.abc");
        assert_eq!(token.expires_at, at(3599));
    }

    #[test]
    fn test_missing_access_token() {
        assert!(matches!(
            parse_token_response(r#"{"error": "invalid_grant"}"#, at(0)),
            Err(CredentialError::Malformed(_))
        ));
        assert!(matches!(
            parse_token_response("<html>", at(0)),
            Err(CredentialError::Malformed(_))
        ));
    }

    #[test]
    fn test_out_of_range_expiry_is_malformed() {
        for body in [
            r#"{"access_token": "t", "expires_in": 9223372036854775807}"#,
            r#"{"access_token": "t", "expires_in": -5}"#,
        ] {
            assert!(matches!(
                parse_token_response(body, at(0)),
                Err(CredentialError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_freshness_margin() {
        let token = AccessToken {
            value: "t".to_string(),
            expires_at: at(3600),
        };
        assert!(token.is_fresh(at(0)));
        assert!(token.is_fresh(at(3539)));
        assert!(!token.is_fresh(at(3540)));
        assert!(!token.is_fresh(at(4000)));
    }

    fn credentials() -> YoutubeCredentials {
        YoutubeCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_credential_error() {
        let provider =
            TokenProvider::new(Client::new(), credentials()).with_endpoint("http://127.0.0.1:9/token");

        assert!(matches!(
            provider.access_token().await,
            Err(CredentialError::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_once_then_cached() {
        let mut server = mockito::Server::new_async().await;
        let refresh = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "refresh".into()),
                Matcher::UrlEncoded("client_id".into(), "id".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "ya29.fresh", "expires_in": 3599, "token_type": "Bearer"}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = TokenProvider::new(Client::new(), credentials())
            .with_endpoint(format!("{}/token", server.url()));

        assert_eq!(provider.access_token().await.unwrap(), "ya29.fresh");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.fresh");
        refresh.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_refresh_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error": "invalid_grant"}"#)
            .create_async()
            .await;

        let provider = TokenProvider::new(Client::new(), credentials())
            .with_endpoint(format!("{}/token", server.url()));

        assert!(matches!(
            provider.access_token().await,
            Err(CredentialError::Rejected { status: 400, body }) if body.contains("invalid_grant")
        ));
    }
}
