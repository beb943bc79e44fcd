//! HTTP node executor
//!
//! Posts a [`NodeRequest`] to `{instance}/api/v1/do` and decodes the
//! [`NodeResult`]. Instances of a type are picked round-robin and a failed
//! attempt moves on to the next instance until the attempt count or the total
//! time budget runs out.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use weft_core::dto::node::{NodeRequest, NodeResult};

use super::{GatewayError, NodeExecutor};

const DO_PATH: &str = "/api/v1/do";

/// Bounds on one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per invocation across instances
    pub max_attempts: u32,
    /// Total budget for all attempts
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(3),
        }
    }
}

pub struct HttpNodeExecutor {
    node_type: String,
    instances: Vec<String>,
    next: AtomicUsize,
    client: Client,
    policy: RetryPolicy,
}

impl HttpNodeExecutor {
    /// Creates an executor for `node_type` served by `hosts`.
    ///
    /// Hosts without a scheme get `http://`.
    pub fn new<S: AsRef<str>>(
        node_type: impl Into<String>,
        hosts: &[S],
        policy: RetryPolicy,
    ) -> Self {
        Self::with_client(node_type, hosts, Client::new(), policy)
    }

    pub fn with_client<S: AsRef<str>>(
        node_type: impl Into<String>,
        hosts: &[S],
        client: Client,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            instances: hosts.iter().map(|h| endpoint(h.as_ref())).collect(),
            next: AtomicUsize::new(0),
            client,
            policy,
        }
    }

    fn pick(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.instances.len();
        &self.instances[i]
    }

    async fn call(&self, url: &str, request: &NodeRequest) -> Result<NodeResult, GatewayError> {
        let response = self.client.post(url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status, message });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NodeExecutor for HttpNodeExecutor {
    async fn execute(&self, request: &NodeRequest) -> Result<NodeResult, GatewayError> {
        if self.instances.is_empty() {
            return Err(GatewayError::NoInstances(self.node_type.clone()));
        }

        let deadline = Instant::now() + self.policy.timeout;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            let url = self.pick();
            let remaining = deadline.saturating_duration_since(Instant::now());

            let error = match tokio::time::timeout(remaining, self.call(url, request)).await {
                Ok(Ok(result)) => {
                    debug!(node_type = %self.node_type, url, attempts, "Node executed");
                    return Ok(result);
                }
                Ok(Err(e)) => e,
                Err(_) => GatewayError::Status {
                    status: 504,
                    message: format!("no response from {url} within retry budget"),
                },
            };

            warn!(
                node_type = %self.node_type,
                url,
                attempts,
                error = %error,
                "Node attempt failed"
            );

            if attempts >= max_attempts || Instant::now() >= deadline {
                return Err(GatewayError::Exhausted {
                    attempts,
                    last: Box::new(error),
                });
            }
        }
    }
}

/// `host:port` becomes `http://host:port/api/v1/do`.
fn endpoint(instance: &str) -> String {
    let base = if instance.starts_with("http") {
        instance.to_string()
    } else {
        format!("http://{instance}")
    };
    format!("{}{DO_PATH}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::domain::pipeline::KeyAndValue;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> NodeRequest {
        NodeRequest::new(7, "approve", vec![KeyAndValue::new("to", "a@b.c")])
    }

    #[test]
    fn test_endpoint_adds_scheme_and_path() {
        assert_eq!(endpoint("email:80"), "http://email:80/api/v1/do");
        assert_eq!(endpoint("https://email/"), "https://email/api/v1/do");
    }

    #[tokio::test]
    async fn test_posts_request_and_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/do"))
            .and(body_partial_json(serde_json::json!({
                "Params": [{"key": "to", "value": "a@b.c"}],
                "Metadata": {"Annotations": {"database.pipelineRun/id": "7"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "out": [{"key": "sent", "value": "1"}],
                "status": "Finish"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let executor = HttpNodeExecutor::new("email", &[server.uri()], RetryPolicy::default());
        let result = executor.execute(&request()).await.unwrap();

        assert_eq!(result.status, "Finish");
        assert_eq!(result.out, vec![KeyAndValue::new("sent", "1")]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/do"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 2,
            timeout: Duration::from_secs(5),
        };
        let executor = HttpNodeExecutor::new("email", &[server.uri()], policy);
        let err = executor.execute(&request()).await.unwrap_err();

        match err {
            GatewayError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                match *last {
                    GatewayError::Status { status, ref message } => {
                        assert_eq!(status, 500);
                        assert_eq!(message, "boom");
                    }
                    ref other => panic!("unexpected last error: {other:?}"),
                }
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fails_over_to_next_instance() {
        let bad = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&bad)
            .await;

        let good = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "Finish"
            })))
            .expect(1)
            .mount(&good)
            .await;

        let executor = HttpNodeExecutor::new(
            "email",
            &[bad.uri(), good.uri()],
            RetryPolicy::default(),
        );
        let result = executor.execute(&request()).await.unwrap();
        assert_eq!(result.status, "Finish");
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let policy = RetryPolicy {
            max_attempts: 1,
            timeout: Duration::from_secs(5),
        };
        let executor = HttpNodeExecutor::new("email", &[server.uri()], policy);
        let err = executor.execute(&request()).await.unwrap_err();
        match err {
            GatewayError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*last, GatewayError::Decode(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_instances() {
        let executor = HttpNodeExecutor::new("email", &[] as &[&str], RetryPolicy::default());
        let err = executor.execute(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::NoInstances(t) if t == "email"));
    }
}
