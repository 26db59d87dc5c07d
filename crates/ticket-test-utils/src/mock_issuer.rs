//! Mock identity provider for E2E testing
//!
//! Serves a key-discovery document from a local wiremock server. Tests
//! publish, rotate or break the document and count how often the service
//! fetched it.

use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the document is served under.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A wiremock-backed issuer key endpoint.
pub struct MockIssuer {
    server: MockServer,
}

impl MockIssuer {
    /// Start an issuer that serves nothing until a document is published.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// URL of the key-discovery document.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// The underlying server, for custom expectations.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `{"keys": keys}`, replacing whatever was served before.
    ///
    /// Clears previously recorded requests.
    pub async fn publish(&self, keys: Vec<Value>) {
        self.respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .await;
    }

    /// Like [`MockIssuer::publish`], but each response is delayed.
    pub async fn publish_slowly(&self, keys: Vec<Value>, delay: Duration) {
        self.respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "keys": keys }))
                .set_delay(delay),
        )
        .await;
    }

    /// Answer every fetch with `status` and no document.
    pub async fn fail_with(&self, status: u16) {
        self.respond_with(ResponseTemplate::new(status)).await;
    }

    /// Answer every fetch with a body that is not a key-discovery document.
    pub async fn serve_garbage(&self) {
        self.respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .await;
    }

    /// Number of document fetches since the last publish.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|request| request.url.path() == JWKS_PATH)
            .count()
    }

    async fn respond_with(&self, template: ResponseTemplate) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_count_fetches() {
        let issuer = MockIssuer::start().await;
        issuer.publish(vec![json!({"kid": "a"})]).await;

        let body: Value = reqwest::get(issuer.jwks_url())
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["keys"][0]["kid"], "a");
        assert_eq!(issuer.fetch_count().await, 1);

        // Republishing resets the count
        issuer.publish(vec![]).await;
        assert_eq!(issuer.fetch_count().await, 0);
    }

    #[tokio::test]
    async fn test_fail_with_status() {
        let issuer = MockIssuer::start().await;
        issuer.fail_with(503).await;

        let response = reqwest::get(issuer.jwks_url()).await.unwrap();
        assert_eq!(response.status(), 503);
    }
}
