//! Ownership-gated calls to the upstream service, and the metered streaming
//! relay for runs.
//!
//! A streamed run is relayed one chunk at a time. Each chunk is fed to the
//! run's [`SseUsageExtractor`] and then yielded to the caller before the next
//! upstream read, so nothing is buffered beyond the extractor's incomplete
//! event. When the relay ends, for any reason, the usage seen so far is
//! appended to the ledger.

use std::{io, sync::Arc};

use {
    agentgate_auth::Principal,
    agentgate_threads::{ThreadRecord, ThreadStore},
    agentgate_upstream::UpstreamClient,
    agentgate_usage::{NewUsage, SseUsageExtractor, UsageSink, record_best_effort},
    axum::{
        body::Body,
        http::{HeaderName, header},
        response::{IntoResponse, Response},
    },
    bytes::Bytes,
    futures::{StreamExt, stream::BoxStream},
    serde_json::Value,
    tracing::{debug, info, warn},
};

use crate::error::GatewayError;

/// A live `text/event-stream` response body.
pub struct EventStream(BoxStream<'static, Result<Bytes, io::Error>>);

impl IntoResponse for EventStream {
    fn into_response(self) -> Response {
        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (HeaderName::from_static("x-accel-buffering"), "no"),
            ],
            Body::from_stream(self.0),
        )
            .into_response()
    }
}

// ── Usage tap ────────────────────────────────────────────────────────────────

struct RunTag {
    sink: Arc<dyn UsageSink>,
    principal_id: i64,
    thread_id: String,
    assistant_id: String,
}

/// Extractor plus the identity its result is recorded under. Records at most
/// once: on [`UsageTap::finish`], or on drop when the caller went away first.
struct UsageTap {
    extractor: SseUsageExtractor,
    tag: Option<RunTag>,
}

impl UsageTap {
    fn new(tag: RunTag) -> Self {
        Self {
            extractor: SseUsageExtractor::new(),
            tag: Some(tag),
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        self.extractor.feed(chunk);
    }

    fn take(&mut self) -> Option<(Arc<dyn UsageSink>, NewUsage)> {
        let tag = self.tag.take()?;
        let Some(extracted) = std::mem::take(&mut self.extractor).finish() else {
            debug!(thread_id = %tag.thread_id, "run reported no usage");
            return None;
        };
        let usage =
            NewUsage::from_extracted(tag.principal_id, tag.thread_id, tag.assistant_id, &extracted);
        Some((tag.sink, usage))
    }

    async fn finish(&mut self) {
        if let Some((sink, usage)) = self.take() {
            record_best_effort(sink.as_ref(), usage).await;
        }
    }
}

impl Drop for UsageTap {
    fn drop(&mut self) {
        let Some((sink, usage)) = self.take() else {
            return;
        };
        debug!(thread_id = %usage.thread_id, "stream dropped early, recording partial usage");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    record_best_effort(sink.as_ref(), usage).await;
                });
            },
            Err(_) => warn!(thread_id = %usage.thread_id, "no runtime left to record usage"),
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

pub struct ProxyEngine {
    upstream: Arc<UpstreamClient>,
    threads: Arc<dyn ThreadStore>,
    usage: Arc<dyn UsageSink>,
}

impl ProxyEngine {
    pub fn new(
        upstream: Arc<UpstreamClient>,
        threads: Arc<dyn ThreadStore>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            upstream,
            threads,
            usage,
        }
    }

    /// Ownership gate. Runs before any upstream traffic.
    async fn authorize(
        &self,
        principal: &Principal,
        thread_id: &str,
    ) -> Result<ThreadRecord, GatewayError> {
        match self.threads.owned(principal.id, thread_id).await {
            Ok(record) => Ok(record),
            Err(e) => {
                debug!(principal_id = principal.id, thread_id, error = %e, "thread access denied");
                Err(e.into())
            },
        }
    }

    /// Start a streamed run and relay it live.
    ///
    /// Failures before the first byte (refused connection, error status) are
    /// returned as errors. Later failures, including an idle read longer than
    /// the run budget, end the relayed stream early.
    pub async fn proxy_run(
        &self,
        principal: &Principal,
        thread_id: &str,
        payload: Value,
    ) -> Result<EventStream, GatewayError> {
        let record = self.authorize(principal, thread_id).await?;
        let assistant_id = payload
            .get("assistant_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .unwrap_or(record.assistant_id);

        let resp = self.upstream.run_stream(thread_id, &payload).await?;
        info!(principal_id = principal.id, thread_id, %assistant_id, "run stream opened");

        let idle = self.upstream.timeouts().run;
        let thread_id = thread_id.to_string();
        let mut tap = UsageTap::new(RunTag {
            sink: Arc::clone(&self.usage),
            principal_id: principal.id,
            thread_id: thread_id.clone(),
            assistant_id,
        });

        let stream = async_stream::stream! {
            let mut upstream = resp.bytes_stream();
            let mut relayed: usize = 0;
            loop {
                match tokio::time::timeout(idle, upstream.next()).await {
                    Ok(Some(Ok(chunk))) => {
                        tap.feed(&chunk);
                        relayed += chunk.len();
                        yield Ok::<Bytes, io::Error>(chunk);
                    },
                    Ok(Some(Err(e))) => {
                        warn!(%thread_id, error = %e, "upstream stream failed");
                        break;
                    },
                    Ok(None) => break,
                    Err(_) => {
                        warn!(%thread_id, idle_secs = idle.as_secs(), "upstream stream idle, closing");
                        break;
                    },
                }
            }
            debug!(%thread_id, relayed, "run stream closed");
            tap.finish().await;
        };

        Ok(EventStream(stream.boxed()))
    }

    /// Blocking run; the upstream body is returned unchanged.
    pub async fn run_and_wait(
        &self,
        principal: &Principal,
        thread_id: &str,
        payload: &Value,
    ) -> Result<Value, GatewayError> {
        self.authorize(principal, thread_id).await?;
        Ok(self.upstream.run_wait(thread_id, payload).await?)
    }

    pub async fn history(
        &self,
        principal: &Principal,
        thread_id: &str,
    ) -> Result<Value, GatewayError> {
        self.authorize(principal, thread_id).await?;
        Ok(self.upstream.history(thread_id).await?)
    }

    pub async fn get_state(
        &self,
        principal: &Principal,
        thread_id: &str,
    ) -> Result<Value, GatewayError> {
        self.authorize(principal, thread_id).await?;
        Ok(self.upstream.get_state(thread_id).await?)
    }

    pub async fn patch_state(
        &self,
        principal: &Principal,
        thread_id: &str,
        body: &Value,
    ) -> Result<Value, GatewayError> {
        self.authorize(principal, thread_id).await?;
        Ok(self.upstream.patch_state(thread_id, body).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use {async_trait::async_trait, serde_json::json};

    use super::*;

    #[derive(Default)]
    struct Recording(Mutex<Vec<NewUsage>>);

    #[async_trait]
    impl UsageSink for Recording {
        async fn record(&self, usage: NewUsage) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(usage);
            Ok(())
        }
    }

    fn tap(sink: &Arc<Recording>) -> UsageTap {
        UsageTap::new(RunTag {
            sink: Arc::clone(sink) as Arc<dyn UsageSink>,
            principal_id: 7,
            thread_id: "t1".into(),
            assistant_id: "a1".into(),
        })
    }

    fn usage_event(total: i64) -> String {
        format!(
            "data: {}\n\n",
            json!({"usage_metadata": {"input_tokens": 1, "total_tokens": total}})
        )
    }

    #[tokio::test]
    async fn finish_records_once() {
        let sink = Arc::new(Recording::default());
        let mut tap = tap(&sink);
        tap.feed(usage_event(5).as_bytes());
        tap.finish().await;
        drop(tap);

        let rows = sink.0.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_tokens, 5);
        assert_eq!(rows[0].principal_id, 7);
        assert_eq!(rows[0].assistant_id, "a1");
    }

    #[tokio::test]
    async fn drop_records_partial_usage() {
        let sink = Arc::new(Recording::default());
        {
            let mut tap = tap(&sink);
            tap.feed(usage_event(3).as_bytes());
            tap.feed(b"data: {\"partial");
        }
        for _ in 0..50 {
            if !sink.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let rows = sink.0.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_tokens, 3);
    }

    #[tokio::test]
    async fn nothing_recorded_without_usage() {
        let sink = Arc::new(Recording::default());
        let mut tap = tap(&sink);
        tap.feed(b"event: end\ndata: null\n\n");
        tap.finish().await;
        assert!(sink.0.lock().unwrap().is_empty());
    }
}
