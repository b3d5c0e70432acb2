//! Upstream token endpoint responses.

use chrono::{Duration, Utc};
use mcpbroker_core::UpstreamToken;
use serde::{Deserialize, Deserializer};

/// Token response from an upstream OAuth server.
///
/// Successful and error bodies share one shape; some providers answer an
/// error with HTTP 200.
#[derive(Debug, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenResponse {
    /// Error code and description if the body carries one.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| match &self.error_description {
            Some(desc) => format!("{}: {}", e, desc),
            None => e.clone(),
        })
    }
}

impl From<TokenResponse> for UpstreamToken {
    fn from(response: TokenResponse) -> Self {
        let expires_in = response.expires_in.unwrap_or(0);
        let expiry = (expires_in > 0).then(|| Utc::now() + Duration::seconds(expires_in));
        let token_type = if response.token_type.is_empty() {
            "Bearer".to_string()
        } else {
            response.token_type
        };

        Self {
            access_token: response.access_token,
            token_type,
            refresh_token: response.refresh_token.unwrap_or_default(),
            expiry,
            expires_in,
        }
    }
}

/// Accept `expires_in` as a number or a numeric string.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Float(f64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Int(n)) => Some(n),
        Some(Seconds::Float(f)) => Some(f as i64),
        Some(Seconds::Text(s)) => s.trim().parse().ok(),
        None => None,
    })
}
