//! Ready-made request initializers for common ingestion endpoints.
//!
//! Providers with bespoke requirements can install any closure as the
//! writer's [`RequestInitializer`]; [`Endpoint`] covers the usual case of a
//! fixed URL with optional authentication and static headers.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use ureq::{Agent, Request};

use crate::transmitter::RequestInitializer;

/// Authentication applied to every batch request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthConfig {
    /// No authentication.
    #[default]
    None,
    /// HTTP Basic authentication with username and password.
    Basic { username: String, password: String },
    /// Bearer token authentication.
    Bearer { token: String },
}

/// A fixed POST target with optional auth and headers.
#[derive(Clone, Debug, Default)]
pub struct Endpoint {
    url: String,
    auth: AuthConfig,
    headers: Vec<(String, String)>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Configure HTTP Basic authentication.
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = AuthConfig::Basic {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Configure Bearer token authentication.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = AuthConfig::Bearer {
            token: token.into(),
        };
        self
    }

    /// Add a header sent with every batch.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// Convert into the callback consumed by the writer.
    pub fn into_initializer(self) -> RequestInitializer {
        Arc::new(move |agent: &Agent| self.decorate(agent.post(&self.url)))
    }

    fn decorate(&self, req: Request) -> Request {
        let mut req = apply_auth(req, &self.auth);
        for (key, value) in &self.headers {
            req = req.set(key, value);
        }
        req
    }
}

fn apply_auth(req: Request, auth: &AuthConfig) -> Request {
    match auth {
        AuthConfig::None => req,
        AuthConfig::Basic { username, password } => {
            req.set("Authorization", &basic_auth_value(username, password))
        }
        AuthConfig::Bearer { token } => req.set("Authorization", &format!("Bearer {token}")),
    }
}

fn basic_auth_value(username: &str, password: &str) -> String {
    let credentials = format!("{username}:{password}");
    format!("Basic {}", BASE64_STANDARD.encode(credentials.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user", "pass", "Basic dXNlcjpwYXNz")]
    #[case("a", "", "Basic YTo=")]
    fn basic_auth_is_base64_encoded(
        #[case] username: &str,
        #[case] password: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(basic_auth_value(username, password), expected);
    }

    #[rstest]
    fn decorate_sets_auth_and_headers() {
        let endpoint = Endpoint::new("http://127.0.0.1:9/ingest")
            .with_bearer_token("secret")
            .with_header("Content-Type", "application/json");
        let agent = ureq::AgentBuilder::new().build();
        let req = endpoint.decorate(agent.post(endpoint.url()));
        assert_eq!(req.header("Authorization"), Some("Bearer secret"));
        assert_eq!(req.header("Content-Type"), Some("application/json"));
        assert_eq!(req.method(), "POST");
    }

    #[rstest]
    fn later_auth_replaces_earlier() {
        let endpoint = Endpoint::new("http://localhost")
            .with_bearer_token("t")
            .with_basic_auth("u", "p");
        assert_eq!(
            endpoint.auth(),
            &AuthConfig::Basic {
                username: "u".into(),
                password: "p".into()
            }
        );
    }
}
