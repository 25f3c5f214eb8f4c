//! Thin Microsoft Graph client: token handling, JSON requests, paging, mail.

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::environment::GraphConfig;
use super::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Refresh this long before the reported expiry.
const TOKEN_SLACK: Duration = Duration::from_secs(60);
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Error bodies are cut to this many characters.
const MAX_ERROR_BODY: usize = 300;

#[derive(Debug, Clone)]
pub enum Credentials {
    Static(String),
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl Credentials {
    pub fn from_config(config: &GraphConfig) -> Option<Self> {
        if let Some(token) = &config.static_token {
            return Some(Self::Static(token.clone()));
        }
        Some(Self::ClientSecret {
            authority_host: config.authority_host.clone(),
            tenant_id: config.tenant_id.clone()?,
            client_id: config.client_id.clone()?,
            client_secret: config.client_secret.clone()?,
        })
    }
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            token: Mutex::new(None),
        })
    }

    pub fn from_config(config: &GraphConfig) -> Result<Self> {
        let credentials = Credentials::from_config(config)
            .ok_or_else(|| Error::Auth("no Graph credentials configured".to_string()))?;
        Self::new(config.base_url.clone(), credentials)
    }

    async fn access_token(&self) -> Result<String> {
        let (authority_host, tenant_id, client_id, client_secret) = match &self.credentials {
            Credentials::Static(token) => return Ok(token.clone()),
            Credentials::ClientSecret {
                authority_host,
                tenant_id,
                client_id,
                client_secret,
            } => (authority_host, tenant_id, client_id, client_secret),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{authority_host}/{tenant_id}/oauth2/v2.0/token");
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("scope", GRAPH_SCOPE),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("token request failed ({status}): {}", truncate(&body))));
        }
        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        log::debug!("Acquired Graph token valid for {}s", lifetime.as_secs());
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_SLACK),
        });
        Ok(token.access_token)
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Send a JSON request. 204 and empty bodies come back as `Value::Null`.
    pub async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.access_token().await?;
        let mut builder = self.http.request(method.clone(), self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("Graph {} {} -> {}", method, path, status.as_u16());
            return Err(Error::Graph {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.request(Method::DELETE, path, None).await.map(|_| ())
    }

    /// GET a collection, following `@odata.nextLink` until exhausted.
    pub async fn get_paged(&self, path: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(url) = next.take() {
            let page = self.get(&url).await?;
            if let Some(values) = page.get("value").and_then(Value::as_array) {
                items.extend(values.iter().cloned());
            }
            next = page
                .get("@odata.nextLink")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
        Ok(items)
    }

    pub async fn send_mail(
        &self,
        sender: &str,
        recipients: &[String],
        subject: &str,
        html: &str,
    ) -> Result<()> {
        let body = json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": html },
                "toRecipients": recipients
                    .iter()
                    .map(|address| json!({ "emailAddress": { "address": address } }))
                    .collect::<Vec<_>>(),
            },
            "saveToSentItems": false,
        });
        self.post(&format!("/users/{sender}/sendMail"), &body).await?;
        log::info!("Email -> {}: {}", recipients.join(", "), subject);
        Ok(())
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_ERROR_BODY).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::ServerConfig;

    #[test]
    fn test_static_token_wins() {
        let mut config = ServerConfig::local(".").graph;
        config.static_token = Some("abc".into());
        config.client_id = Some("id".into());
        assert!(matches!(Credentials::from_config(&config), Some(Credentials::Static(t)) if t == "abc"));
    }

    #[test]
    fn test_client_secret_needs_all_parts() {
        let mut config = ServerConfig::local(".").graph;
        config.client_id = Some("id".into());
        config.client_secret = Some("secret".into());
        assert!(Credentials::from_config(&config).is_none());
        config.tenant_id = Some("tenant".into());
        assert!(matches!(
            Credentials::from_config(&config),
            Some(Credentials::ClientSecret { .. })
        ));
    }

    #[test]
    fn test_absolute_next_links_are_used_verbatim() {
        let client = GraphClient::new("http://graph.local/v1.0/", Credentials::Static("t".into())).unwrap();
        assert_eq!(client.url("/sites/x"), "http://graph.local/v1.0/sites/x");
        assert_eq!(client.url("http://other/page2"), "http://other/page2");
    }

    #[test]
    fn test_error_body_truncated() {
        let long = "x".repeat(1000);
        assert_eq!(truncate(&long).len(), MAX_ERROR_BODY);
    }
}
