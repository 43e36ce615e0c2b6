use std::time::Duration;

use {
    agentgate_config::UpstreamConfig,
    reqwest::{Method, RequestBuilder, header},
    secrecy::{ExposeSecret, Secret},
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::error::UpstreamError;

/// Fixed per-call budgets. There is no retry behind any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Reads of thread state and history; also the connect budget.
    pub default: Duration,
    /// Thread creation.
    pub thread: Duration,
    /// Blocking runs, and the idle budget between two streamed chunks.
    pub run: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(10),
            thread: Duration::from_secs(15),
            run: Duration::from_secs(60),
        }
    }
}

impl From<&UpstreamConfig> for Timeouts {
    fn from(cfg: &UpstreamConfig) -> Self {
        Self {
            default: Duration::from_secs(cfg.default_timeout_secs),
            thread: Duration::from_secs(cfg.thread_timeout_secs),
            run: Duration::from_secs(cfg.run_timeout_secs),
        }
    }
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    service_token: Option<Secret<String>>,
    timeouts: Timeouts,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("base_url", &self.base_url)
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl UpstreamClient {
    pub fn new(
        base_url: impl Into<String>,
        service_token: Option<Secret<String>>,
        timeouts: Timeouts,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeouts.default)
            .build()
            .map_err(UpstreamError::transport)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_token,
            timeouts,
        })
    }

    pub fn from_config(cfg: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Self::new(
            cfg.base_url.clone(),
            cfg.service_token.clone(),
            Timeouts::from(cfg),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}{path}", self.base_url));
        match &self.service_token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    // ── Threads ─────────────────────────────────────────────────────────────

    /// Provision a new upstream thread and return its identifier.
    ///
    /// The assistant id is written into the thread metadata next to any
    /// caller-supplied keys, overriding a caller `assistant_id`.
    pub async fn create_thread(
        &self,
        assistant_id: &str,
        metadata: Option<&Map<String, Value>>,
    ) -> Result<String, UpstreamError> {
        let mut meta = metadata.cloned().unwrap_or_default();
        meta.insert("assistant_id".into(), Value::String(assistant_id.into()));
        let body = serde_json::json!({ "metadata": meta });

        let resp = self
            .send_json(
                self.request(Method::POST, "/threads").json(&body),
                self.timeouts.thread,
            )
            .await?;

        let thread_id = ["thread_id", "id"]
            .iter()
            .filter_map(|key| resp.get(*key).and_then(Value::as_str))
            .find(|id| !id.is_empty())
            .ok_or(UpstreamError::MissingThreadId)?;
        debug!(thread_id, assistant_id, "upstream thread created");
        Ok(thread_id.to_string())
    }

    pub async fn history(&self, thread_id: &str) -> Result<Value, UpstreamError> {
        self.send_json(
            self.request(Method::GET, &format!("/threads/{thread_id}/history")),
            self.timeouts.default,
        )
        .await
    }

    pub async fn get_state(&self, thread_id: &str) -> Result<Value, UpstreamError> {
        self.send_json(
            self.request(Method::GET, &format!("/threads/{thread_id}/state")),
            self.timeouts.default,
        )
        .await
    }

    pub async fn patch_state(&self, thread_id: &str, body: &Value) -> Result<Value, UpstreamError> {
        self.send_json(
            self.request(Method::PATCH, &format!("/threads/{thread_id}/state"))
                .json(body),
            self.timeouts.default,
        )
        .await
    }

    // ── Runs ────────────────────────────────────────────────────────────────

    /// Execute a run and block until it completes.
    pub async fn run_wait(&self, thread_id: &str, payload: &Value) -> Result<Value, UpstreamError> {
        self.send_json(
            self.request(Method::POST, &format!("/threads/{thread_id}/runs/wait"))
                .json(payload),
            self.timeouts.run,
        )
        .await
    }

    /// Start a streamed run. The returned response has a success status and
    /// an unread body; reading it is bounded per chunk by `timeouts().run`.
    pub async fn run_stream(
        &self,
        thread_id: &str,
        payload: &Value,
    ) -> Result<reqwest::Response, UpstreamError> {
        let req = self
            .request(Method::POST, &format!("/threads/{thread_id}/runs/stream"))
            .header(header::ACCEPT, "text/event-stream")
            .json(payload);

        let resp = tokio::time::timeout(self.timeouts.run, req.send())
            .await
            .map_err(|_| UpstreamError::Unavailable("timed out waiting for stream".into()))?
            .map_err(UpstreamError::transport)?;
        check_status(resp).await
    }

    async fn send_json(
        &self,
        req: RequestBuilder,
        timeout: Duration,
    ) -> Result<Value, UpstreamError> {
        let resp = req
            .header(header::ACCEPT, "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(UpstreamError::transport)?;
        let resp = check_status(resp).await?;
        let bytes = resp.bytes().await.map_err(UpstreamError::transport)?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "upstream returned an error status");
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use {
        futures::StreamExt,
        serde_json::json,
        wiremock::{
            Mock, MockServer, ResponseTemplate,
            matchers::{body_json, header, method, path},
        },
    };

    use super::*;

    fn client(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(
            server.uri(),
            Some(Secret::new("svc-token".into())),
            Timeouts {
                default: Duration::from_secs(2),
                thread: Duration::from_secs(2),
                run: Duration::from_secs(2),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn create_thread_sends_metadata_and_service_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(header("authorization", "Bearer svc-token"))
            .and(body_json(json!({
                "metadata": {"assistant_id": "role_playing_agent", "source": "web"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"thread_id": "t-123"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut meta = Map::new();
        meta.insert("source".into(), json!("web"));
        meta.insert("assistant_id".into(), json!("spoofed"));
        let id = client(&server)
            .create_thread("role_playing_agent", Some(&meta))
            .await
            .unwrap();
        assert_eq!(id, "t-123");
    }

    #[tokio::test]
    async fn create_thread_falls_back_to_id_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"thread_id": "", "id": "t-9"})),
            )
            .mount(&server)
            .await;

        let id = client(&server).create_thread("a", None).await.unwrap();
        assert_eq!(id, "t-9");
    }

    #[tokio::test]
    async fn create_thread_without_identifier_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let err = client(&server).create_thread("a", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::MissingThreadId));
    }

    #[tokio::test]
    async fn non_json_body_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client(&server).create_thread("a", None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidBody(_)));
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/t1/history"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such thread"))
            .mount(&server)
            .await;

        let err = client(&server).history("t1").await.unwrap_err();
        match err {
            UpstreamError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such thread");
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_upstream_is_unavailable() {
        // Bind and drop a listener so the port is closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = UpstreamClient::new(format!("http://{addr}"), None, Timeouts::default())
            .unwrap();
        let err = client.run_wait("t1", &json!({})).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/t1/state"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let err = client(&server).get_state("t1").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Unavailable(_)));
    }

    #[tokio::test]
    async fn run_wait_forwards_payload_unchanged() {
        let server = MockServer::start().await;
        let payload = json!({
            "assistant_id": "a",
            "input": {"messages": [{"role": "user", "content": "hi"}]}
        });
        Mock::given(method("POST"))
            .and(path("/threads/t1/runs/wait"))
            .and(body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messages": []})))
            .expect(1)
            .mount(&server)
            .await;

        let out = client(&server).run_wait("t1", &payload).await.unwrap();
        assert_eq!(out, json!({"messages": []}));
    }

    #[tokio::test]
    async fn state_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/threads/t1/state"))
            .and(body_json(json!({"values": {"x": 1}})))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/threads/t1/state"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": {"x": 1}})))
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client
                .patch_state("t1", &json!({"values": {"x": 1}}))
                .await
                .unwrap(),
            Value::Null
        );
        assert_eq!(
            client.get_state("t1").await.unwrap()["values"]["x"],
            json!(1)
        );
    }

    #[tokio::test]
    async fn run_stream_returns_unread_body() {
        let server = MockServer::start().await;
        let sse = "event: metadata\ndata: {\"run_id\":\"r1\"}\n\n";
        Mock::given(method("POST"))
            .and(path("/threads/t1/runs/stream"))
            .and(header("accept", "text/event-stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .mount(&server)
            .await;

        let resp = client(&server)
            .run_stream("t1", &json!({"assistant_id": "a"}))
            .await
            .unwrap();
        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, sse.as_bytes());
    }

    #[tokio::test]
    async fn run_stream_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/t1/runs/stream"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server)
            .run_stream("t1", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 500, .. }));
    }

    #[test]
    fn debug_redacts_service_token() {
        let client = UpstreamClient::new(
            "http://upstream/",
            Some(Secret::new("svc-secret".into())),
            Timeouts::default(),
        )
        .unwrap();
        let out = format!("{client:?}");
        assert!(!out.contains("svc-secret"));
        assert_eq!(client.base_url(), "http://upstream");
    }
}
