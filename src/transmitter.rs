//! Batch transmission over HTTP.
//!
//! [`HttpTransmitter`] turns one sealed batch into one POST request. The
//! provider's [`RequestInitializer`] creates the request (target, headers,
//! auth), any per-call [`RequestCallback`]s run next, and the batch bytes are
//! sent as the body. Results are classified into [`TransmitError`] so the
//! worker pool can drive its retry state machine.

use std::sync::Arc;
use std::time::Duration;

use ureq::{Agent, AgentBuilder, Request, Response};

use crate::config::WriterConfig;
use crate::error::{TransmitError, WriterError};

/// Creates the outbound request for a batch. Supplied by the ingestion
/// provider.
pub type RequestInitializer = Arc<dyn Fn(&Agent) -> Request + Send + Sync>;

/// Decorates a request after the provider initializer has run.
pub type RequestCallback = Arc<dyn Fn(Request) -> Request + Send + Sync>;

/// Statuses treated as a successful upload unless configured otherwise.
pub const DEFAULT_ACCEPTED_STATUSES: [u16; 2] = [200, 202];
/// Redirects followed before a response is classified.
pub const DEFAULT_MAX_REDIRECTS: u32 = 3;
/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default timeout for a complete request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one batch body and reports whether the endpoint accepted it.
///
/// Implementations must be safe to call from every worker concurrently.
pub trait Transmit: Send + Sync {
    fn transmit(&self, body: &[u8], extra: &[RequestCallback]) -> Result<(), TransmitError>;
}

/// [`Transmit`] implementation backed by a pooled `ureq` agent.
pub struct HttpTransmitter {
    agent: Agent,
    initializer: RequestInitializer,
    accepted: Vec<u16>,
}

impl HttpTransmitter {
    /// Build the agent described by `config` around `initializer`.
    pub fn new(config: &WriterConfig, initializer: RequestInitializer) -> Result<Self, WriterError> {
        let tls = native_tls::TlsConnector::new()
            .map_err(|err| WriterError::InvalidConfig(format!("TLS setup failed: {err}")))?;
        let agent = AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirects(config.max_redirects)
            .tls_connector(Arc::new(tls))
            .build();
        Ok(Self {
            agent,
            initializer,
            accepted: config.accepted_statuses.clone(),
        })
    }

    fn classify(&self, result: Result<Response, ureq::Error>) -> Result<(), TransmitError> {
        match result {
            Ok(response) => {
                let status = response.status();
                // Drain the body so the connection returns to the pool.
                let _ = response.into_string();
                classify_status(status, &self.accepted)
            }
            Err(err) => match err {
                ureq::Error::Status(code, response) => {
                    let _ = response.into_string();
                    classify_status(code, &self.accepted)
                }
                ureq::Error::Transport(transport) => {
                    Err(TransmitError::Transport(transport.to_string()))
                }
            },
        }
    }
}

impl Transmit for HttpTransmitter {
    fn transmit(&self, body: &[u8], extra: &[RequestCallback]) -> Result<(), TransmitError> {
        let mut request = (self.initializer)(&self.agent);
        for callback in extra {
            request = callback(request);
        }
        self.classify(request.send_bytes(body))
    }
}

impl std::fmt::Debug for HttpTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransmitter")
            .field("accepted", &self.accepted)
            .finish()
    }
}

/// Map a response status onto the accepted set.
pub(crate) fn classify_status(status: u16, accepted: &[u16]) -> Result<(), TransmitError> {
    if accepted.contains(&status) {
        Ok(())
    } else {
        Err(TransmitError::Status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(200)]
    #[case(202)]
    fn accepted_statuses_succeed(#[case] status: u16) {
        assert_eq!(classify_status(status, &DEFAULT_ACCEPTED_STATUSES), Ok(()));
    }

    #[rstest]
    #[case(201)]
    #[case(204)]
    #[case(302)]
    #[case(400)]
    #[case(429)]
    #[case(503)]
    fn other_statuses_fail(#[case] status: u16) {
        assert_eq!(
            classify_status(status, &DEFAULT_ACCEPTED_STATUSES),
            Err(TransmitError::Status(status))
        );
    }

    #[rstest]
    fn accepted_set_is_configurable() {
        assert_eq!(classify_status(204, &[204]), Ok(()));
        assert_eq!(classify_status(200, &[204]), Err(TransmitError::Status(200)));
    }
}
