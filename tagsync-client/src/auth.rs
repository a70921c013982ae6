//! Credentials for store requests.

use crate::config::AuthConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use tagsync_core::StoreError;

/// Supplies credentials for every request and renews them on 401.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn headers(&self) -> Result<HeaderMap, StoreError>;

    /// Try to renew credentials after a 401. `Ok(true)` means the request
    /// should be sent once more.
    async fn refresh(&self) -> Result<bool, StoreError>;
}

/// Fixed API key and/or bearer token taken from configuration.
#[derive(Clone)]
pub struct StaticCredentials {
    headers: HeaderMap,
}

impl StaticCredentials {
    pub fn from_config(auth: &AuthConfig) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &auth.api_key {
            headers.insert(
                HeaderName::from_static("x-api-key"),
                HeaderValue::from_str(api_key).map_err(|e| StoreError::Transport {
                    reason: format!("invalid api key header: {}", e),
                })?,
            );
        }
        if let Some(jwt) = &auth.jwt {
            let value = format!("Bearer {}", jwt);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value).map_err(|e| StoreError::Transport {
                    reason: format!("invalid authorization header: {}", e),
                })?,
            );
        }
        Ok(Self { headers })
    }

    pub fn anonymous() -> Self {
        Self {
            headers: HeaderMap::new(),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticCredentials {
    async fn headers(&self) -> Result<HeaderMap, StoreError> {
        Ok(self.headers.clone())
    }

    async fn refresh(&self) -> Result<bool, StoreError> {
        Ok(false)
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_credentials_set_both_headers() {
        let creds = StaticCredentials::from_config(&AuthConfig {
            api_key: Some("k".to_string()),
            jwt: Some("t".to_string()),
        })
        .unwrap();
        let headers = creds.headers().await.unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "k");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer t");
        assert!(!creds.refresh().await.unwrap());
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let result = StaticCredentials::from_config(&AuthConfig {
            api_key: Some("bad\nkey".to_string()),
            jwt: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let creds = StaticCredentials::from_config(&AuthConfig {
            api_key: Some("secret-key".to_string()),
            jwt: None,
        })
        .unwrap();
        assert!(!format!("{:?}", creds).contains("secret-key"));
    }
}
