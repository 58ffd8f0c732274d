//! A [`Transport`] that talks to the API over HTTP with `reqwest`.
//!
//! Requests are resolved against the session's API base URL and always carry
//! the public key as the `key` query parameter. `GET` bodies become query
//! parameters, `POST` bodies are sent as JSON.
//!
//! [`Transport::request`] spawns the request on a tokio runtime and returns
//! immediately. The completion callback runs on that runtime; if it returns
//! an error, the error is logged, since there is no caller left to hand it to.
//!
//! ## Error Handling
//!
//! [`HttpTransportError`] captures the failure context:
//! - HTTP transport failures
//! - JSON deserialization errors
//! - Unexpected HTTP status responses
//! - Error documents returned with a success status
//!
//! Concerns receive it converted into the core [`TransportError`].

use std::fmt::Display;
use std::time::Duration;

use checkout_risk::session::{Method, Transport, TransportCallback, TransportRequest};
use checkout_risk::{RiskError, Session, SessionConfig, TransportError};
use http::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use tokio::runtime::Handle;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};

use crate::error::{ApiErrorBody, HttpTransportError};

/// Configuration for [`HttpTransport`].
#[derive(Clone)]
pub struct HttpTransportConfig {
    /// API base URL, e.g. `https://api.recurly.com/js/v1`.
    pub api: Url,
    /// Public key sent as the `key` query parameter.
    pub public_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: HeaderMap,
    /// Optional pre-configured reqwest client.
    pub http_client: Option<Client>,
}

impl HttpTransportConfig {
    /// Takes the API URL, public key, and timeout from a session config.
    #[must_use]
    pub fn from_session(config: &SessionConfig) -> Self {
        Self {
            api: config.api.clone(),
            public_key: config.public_key.clone(),
            timeout: config.timeout(),
            headers: HeaderMap::new(),
            http_client: None,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attaches custom headers to every request.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a pre-configured reqwest client.
    #[must_use]
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http_client = Some(client);
        self
    }
}

impl std::fmt::Debug for HttpTransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransportConfig")
            .field("api", &self.api.as_str())
            .field("timeout", &self.timeout)
            .field("headers", &self.headers.len())
            .field("has_http_client", &self.http_client.is_some())
            .finish_non_exhaustive()
    }
}

/// HTTP transport for checkout sessions.
///
/// Cloning is cheap and shares the underlying connection pool.
///
/// # Example
///
/// ```rust,ignore
/// let config = SessionConfig::new("ewr1-...");
/// let session = HttpTransport::session(config)?;
/// let controller = RiskController::new(session);
/// ```
#[derive(Clone, Debug)]
pub struct HttpTransport {
    api: Url,
    public_key: String,
    timeout: Duration,
    headers: HeaderMap,
    client: Client,
    runtime: Handle,
}

impl HttpTransport {
    /// Creates a transport that spawns requests on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError::Runtime`] outside a tokio runtime, or
    /// [`HttpTransportError::InvalidBaseUrl`] if the API URL cannot carry a path.
    pub fn try_new(config: HttpTransportConfig) -> Result<Self, HttpTransportError> {
        let runtime =
            Handle::try_current().map_err(|source| HttpTransportError::Runtime { source })?;
        Self::with_runtime(config, runtime)
    }

    /// Creates a transport that spawns requests on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError::InvalidBaseUrl`] if the API URL cannot
    /// carry a path.
    pub fn with_runtime(
        config: HttpTransportConfig,
        runtime: Handle,
    ) -> Result<Self, HttpTransportError> {
        if config.api.cannot_be_a_base() {
            return Err(HttpTransportError::InvalidBaseUrl { url: config.api });
        }
        Ok(Self {
            api: config.api,
            public_key: config.public_key,
            timeout: config.timeout,
            headers: config.headers,
            client: config.http_client.unwrap_or_default(),
            runtime,
        })
    }

    /// Builds a [`Session`] backed by a new transport on the current runtime.
    ///
    /// # Errors
    ///
    /// See [`HttpTransport::try_new`].
    pub fn session(config: SessionConfig) -> Result<Session, HttpTransportError> {
        let transport = Self::try_new(HttpTransportConfig::from_session(&config))?;
        Ok(Session::new(config, transport))
    }

    /// Returns the API base URL.
    #[must_use]
    pub const fn api(&self) -> &Url {
        &self.api
    }

    /// Returns the configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns any custom headers configured on the transport.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Resolves the full URL for `request`, including query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError::InvalidBaseUrl`] if the API URL cannot
    /// carry a path.
    pub fn endpoint(&self, request: &TransportRequest) -> Result<Url, HttpTransportError> {
        let mut url = self.api.clone();
        url.path_segments_mut()
            .map_err(|()| HttpTransportError::InvalidBaseUrl {
                url: self.api.clone(),
            })?
            .pop_if_empty()
            .extend(request.path.split('/').filter(|s| !s.is_empty()));

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("key", &self.public_key);
            if request.method == Method::Get
                && let Some(Value::Object(params)) = &request.body
            {
                for (name, value) in params {
                    match value {
                        Value::String(s) => query.append_pair(name, s),
                        Value::Null => continue,
                        other => query.append_pair(name, &other.to_string()),
                    };
                }
            }
        }
        Ok(url)
    }

    /// Performs `request` and returns the decoded JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`HttpTransportError`] if the request fails, the status is not
    /// a success, the body is not JSON, or the body is an error document.
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "risk.http.request",
            skip_all,
            fields(
                method = %request.method,
                path = %request.path,
                otel.status_code = tracing::field::Empty,
                error.message = tracing::field::Empty,
            )
        )
    )]
    pub async fn fetch(&self, request: &TransportRequest) -> Result<Value, HttpTransportError> {
        let context = request.to_string();
        let url = self.endpoint(request)?;

        let mut req = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .json(request.body.as_ref().unwrap_or(&Value::Null)),
        };
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        req = req.timeout(self.timeout);

        let http_response = req
            .send()
            .await
            .map_err(|source| HttpTransportError::Http {
                context: context.clone(),
                source,
            })?;

        let result = if http_response.status().is_success() {
            match http_response.json::<Value>().await {
                Ok(body) => match ApiErrorBody::from_value(&body) {
                    Some(api) => Err(HttpTransportError::Api {
                        context,
                        code: api.code,
                        message: api.message,
                    }),
                    None => Ok(body),
                },
                Err(source) => Err(HttpTransportError::JsonDeserialization { context, source }),
            }
        } else {
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|source| HttpTransportError::ResponseBodyRead {
                    context: context.clone(),
                    source,
                })?;
            Err(HttpTransportError::HttpStatus {
                context,
                status,
                body,
            })
        };

        record_result_on_span(&result);

        result
    }
}

impl Transport for HttpTransport {
    fn request(
        &self,
        request: TransportRequest,
        callback: TransportCallback,
    ) -> Result<(), RiskError> {
        let transport = self.clone();
        self.runtime.spawn(async move {
            let result = transport
                .fetch(&request)
                .await
                .map_err(TransportError::from);
            let outcome = callback(result);
            report_callback_result(&request, &outcome);
        });
        Ok(())
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("otel.status_code", "OK");
        }
        Err(err) => {
            span.record("otel.status_code", "ERROR");
            span.record("error.message", tracing::field::display(err));
            tracing::event!(tracing::Level::ERROR, error = %err, "Request to API failed");
        }
    }
}

/// Records the outcome of a request on a tracing span, including status and errors.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}

/// Logs a failure raised by a completion callback.
#[cfg(feature = "telemetry")]
fn report_callback_result(request: &TransportRequest, outcome: &Result<(), RiskError>) {
    if let Err(err) = outcome {
        tracing::warn!(request = %request, error = %err, "risk.http.callback_failed");
    }
}

/// Logs a failure raised by a completion callback.
/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
fn report_callback_result(_request: &TransportRequest, _outcome: &Result<(), RiskError>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_risk::concern::{ConcernEvent, ConcernEventKind};
    use checkout_risk::{Concern, RiskController, ThreeDSecureOptions, TransportErrorKind};
    use http::HeaderValue;
    use serde_json::json;
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> SessionConfig {
        let api = format!("{}/js/v1", server.uri()).parse::<Url>().unwrap();
        SessionConfig::new("ewr1-test").with_api(api)
    }

    fn transport(server: &MockServer) -> HttpTransport {
        HttpTransport::try_new(HttpTransportConfig::from_session(&config(server))).unwrap()
    }

    #[tokio::test]
    async fn test_get_resolves_against_api_with_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/tok_123"))
            .and(query_param("key", "ewr1-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "tok_123" })))
            .expect(1)
            .mount(&server)
            .await;

        let body = transport(&server)
            .fetch(&TransportRequest::get("/token/tok_123"))
            .await
            .unwrap();

        assert_eq!(body, json!({ "id": "tok_123" }));
    }

    #[tokio::test]
    async fn test_get_body_becomes_query() {
        let server = MockServer::start().await;
        let transport = transport(&server);
        let request = TransportRequest {
            body: Some(json!({ "locale": "en", "version": 2, "skip": null })),
            ..TransportRequest::get("/risk/preflights")
        };

        let url = transport.endpoint(&request).unwrap();

        assert_eq!(url.path(), "/js/v1/risk/preflights");
        assert_eq!(url.query(), Some("key=ewr1-test&locale=en&version=2"));
    }

    #[tokio::test]
    async fn test_post_sends_json_body_and_headers() {
        let server = MockServer::start().await;
        let body = json!({
            "type": "three_d_secure_action_result",
            "three_d_secure_action_token_id": "tok_123",
            "results": { "cres": "abc" }
        });
        Mock::given(method("POST"))
            .and(path("/js/v1/tokens"))
            .and(header("x-checkout-client", "risk/0.1"))
            .and(body_json(&body))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "id": "3dsr_1", "type": "three_d_secure_action_result" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut headers = HeaderMap::new();
        headers.insert("x-checkout-client", HeaderValue::from_static("risk/0.1"));
        let transport = HttpTransport::try_new(
            HttpTransportConfig::from_session(&config(&server)).with_headers(headers),
        )
        .unwrap();

        let reply = transport
            .fetch(&TransportRequest::post("/tokens", body))
            .await
            .unwrap();

        assert_eq!(reply["id"], "3dsr_1");
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({ "error": { "code": "not-found", "message": "Token not found" } }),
            ))
            .mount(&server)
            .await;

        let err = transport(&server)
            .fetch(&TransportRequest::get("/token/missing"))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpTransportError::HttpStatus { status, .. } if status == 404));
        let err = TransportError::from(err);
        assert_eq!(err.kind, TransportErrorKind::Status);
        assert_eq!(err.status, Some(404));
        assert_eq!(err.code.as_deref(), Some("not-found"));
    }

    #[tokio::test]
    async fn test_error_document_with_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/expired"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({ "error": { "code": "expired", "message": "Action token expired" } }),
            ))
            .mount(&server)
            .await;

        let err = transport(&server)
            .fetch(&TransportRequest::get("/token/expired"))
            .await
            .unwrap_err();

        let err = TransportError::from(err);
        assert_eq!(err, TransportError::api("expired", "Action token expired"));
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/garbled"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = transport(&server)
            .fetch(&TransportRequest::get("/token/garbled"))
            .await
            .unwrap_err();

        assert_eq!(TransportError::from(err).kind, TransportErrorKind::Decode);
    }

    #[test]
    fn test_requires_runtime() {
        let config = HttpTransportConfig::from_session(&SessionConfig::new("ewr1-test"));
        assert!(matches!(
            HttpTransport::try_new(config),
            Err(HttpTransportError::Runtime { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_opaque_base_url() {
        let config = HttpTransportConfig::from_session(
            &SessionConfig::new("ewr1-test").with_api("mailto:risk@example.com".parse().unwrap()),
        );
        assert!(matches!(
            HttpTransport::try_new(config),
            Err(HttpTransportError::InvalidBaseUrl { .. })
        ));
    }

    fn record(concern: &dyn Concern) -> mpsc::UnboundedReceiver<ConcernEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for kind in [ConcernEventKind::Ready, ConcernEventKind::Error] {
            let tx = tx.clone();
            concern.events().on(kind, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<ConcernEvent>) -> ConcernEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_three_d_secure_becomes_ready_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/tok_123"))
            .and(query_param("key", "ewr1-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tok_123",
                "type": "three_d_secure_action",
                "gateway": { "type": "adyen" },
                "three_d_secure": { "params": {} }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let controller = RiskController::new(HttpTransport::session(config(&server)).unwrap());
        let concern = controller
            .three_d_secure(ThreeDSecureOptions::new("tok_123"))
            .unwrap();
        let mut events = record(concern.as_ref());

        assert_eq!(next_event(&mut events).await, ConcernEvent::Ready);
        assert!(concern.is_ready());
        assert_eq!(concern.profile().unwrap().gateway_type(), Some("adyen"));
    }

    #[tokio::test]
    async fn test_three_d_secure_reports_http_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/js/v1/token/tok_123"))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({ "error": { "code": "not-found", "message": "Token not found" } }),
            ))
            .mount(&server)
            .await;

        let controller = RiskController::new(HttpTransport::session(config(&server)).unwrap());
        let concern = controller
            .three_d_secure(ThreeDSecureOptions::new("tok_123"))
            .unwrap();
        let mut events = record(concern.as_ref());

        let ConcernEvent::Error(RiskError::Transport(err)) = next_event(&mut events).await else {
            panic!("expected a transport error event");
        };
        assert_eq!(err.status, Some(404));
        assert!(!concern.is_ready());
    }
}
