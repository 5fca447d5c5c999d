//! Blocking JSON-over-HTTP plumbing shared by the service clients.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

/// Where a remote model lives and how to authenticate against it.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl ServiceEndpoint {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn agent(&self) -> ureq::Agent {
        ureq::AgentBuilder::new().timeout(self.timeout).build()
    }
}

/// POST `body` to `url` and decode the JSON response. Errors are flattened to
/// a message so each client can wrap them in its own error variant.
pub fn post_json(
    agent: &ureq::Agent,
    endpoint: &ServiceEndpoint,
    url: &str,
    body: &Value,
) -> Result<Value, String> {
    debug!("POST {url}");
    let mut req = agent.post(url).set("Content-Type", "application/json");
    if let Some(key) = &endpoint.api_key {
        req = req.set("Authorization", &format!("Bearer {key}"));
    }

    let resp = match req.send_json(body) {
        Ok(r) => r,
        Err(ureq::Error::Status(code, r)) => {
            let text = r.into_string().unwrap_or_default();
            return Err(format!(
                "{url} returned {code}: {}",
                text.chars().take(500).collect::<String>()
            ));
        }
        Err(e) => return Err(format!("{url}: {e}")),
    };

    resp.into_json::<Value>()
        .map_err(|e| format!("{url}: invalid JSON response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_slashes() {
        let ep = ServiceEndpoint::new("http://localhost:8080/v1/", "m");
        assert_eq!(ep.url("/embeddings"), "http://localhost:8080/v1/embeddings");
        assert_eq!(ep.url("rerank"), "http://localhost:8080/v1/rerank");
    }

    #[test]
    fn test_builder() {
        let ep = ServiceEndpoint::new("http://x", "m")
            .with_api_key(Some("k".into()))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ep.api_key.as_deref(), Some("k"));
        assert_eq!(ep.timeout, Duration::from_secs(5));
    }
}
