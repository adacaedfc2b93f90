//! Fire-and-forget webhook delivery.
//! Jobs are queued on a bounded channel and posted by a background worker;
//! failures are logged and counted, never reported to the caller.

use crm_core::config::WebhookConfig;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Longest response body excerpt kept in failure logs.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct WebhookJob {
    pub url: String,
    pub payload: Value,
}

/// Cloneable handle to the webhook queue.
#[derive(Clone)]
pub struct WebhookDispatcher {
    sender: Option<mpsc::Sender<WebhookJob>>,
}

impl WebhookDispatcher {
    /// Create the dispatcher and spawn its delivery worker.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &WebhookConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let (sender, receiver) = mpsc::channel::<WebhookJob>(config.queue_capacity.max(1));

        let worker = DeliveryWorker { client };
        tokio::spawn(async move {
            worker.run(receiver).await;
        });

        info!(
            timeout_secs = config.timeout_secs,
            queue_capacity = config.queue_capacity,
            "Webhook dispatcher initialized"
        );
        Ok(Self {
            sender: Some(sender),
        })
    }

    /// A dispatcher that discards every job.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queue a POST of `payload` to `url` without waiting for delivery.
    /// Returns whether the job was queued; an empty URL is ignored.
    pub fn dispatch(&self, url: &str, payload: Value) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        let Some(sender) = &self.sender else {
            debug!(url, "Webhook dispatcher disabled, job discarded");
            return false;
        };

        let job = WebhookJob {
            url: url.to_string(),
            payload,
        };
        if let Err(e) = sender.try_send(job) {
            metrics::counter!("webhooks.dropped").increment(1);
            warn!(url, "Webhook dropped: {}", e);
            false
        } else {
            metrics::counter!("webhooks.queued").increment(1);
            true
        }
    }
}

struct DeliveryWorker {
    client: reqwest::Client,
}

impl DeliveryWorker {
    async fn run(self, mut receiver: mpsc::Receiver<WebhookJob>) {
        while let Some(job) = receiver.recv().await {
            self.deliver(job).await;
        }
        debug!("Webhook queue closed, worker exiting");
    }

    async fn deliver(&self, job: WebhookJob) {
        let response = match self.client.post(&job.url).json(&job.payload).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::counter!("webhooks.failed").increment(1);
                warn!(url = %job.url, error = %e, "Webhook request failed");
                return;
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            metrics::counter!("webhooks.failed").increment(1);
            warn!(
                url = %job.url,
                status = status.as_u16(),
                body = %excerpt(&body),
                "Webhook rejected"
            );
        } else {
            metrics::counter!("webhooks.delivered").increment(1);
            debug!(url = %job.url, status = status.as_u16(), "Webhook delivered");
        }
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn capture(
        State(tx): State<mpsc::UnboundedSender<Value>>,
        Json(body): Json<Value>,
    ) -> StatusCode {
        let _ = tx.send(body);
        StatusCode::OK
    }

    async fn spawn_receiver() -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/hook", post(capture))
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(tx);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), rx)
    }

    #[tokio::test]
    async fn test_dispatch_delivers_payload() {
        let (base, mut rx) = spawn_receiver().await;
        let dispatcher = WebhookDispatcher::new(&WebhookConfig::default()).unwrap();

        assert!(dispatcher.dispatch(&format!("{base}/hook"), json!({"booking_id": 7})));
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received["booking_id"], 7);
    }

    #[tokio::test]
    async fn test_failed_delivery_does_not_stop_worker() {
        let (base, mut rx) = spawn_receiver().await;
        let dispatcher = WebhookDispatcher::new(&WebhookConfig::default()).unwrap();

        assert!(dispatcher.dispatch(&format!("{base}/broken"), json!({"n": 1})));
        assert!(dispatcher.dispatch("http://127.0.0.1:1/unreachable", json!({"n": 2})));
        assert!(dispatcher.dispatch(&format!("{base}/hook"), json!({"n": 3})));

        let received = tokio::time::timeout(Duration::from_secs(15), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received["n"], 3);
    }

    #[tokio::test]
    async fn test_empty_url_and_disabled_are_no_ops() {
        let dispatcher = WebhookDispatcher::new(&WebhookConfig::default()).unwrap();
        assert!(!dispatcher.dispatch("   ", json!({})));
        assert!(!WebhookDispatcher::disabled().dispatch("http://example.test", json!({})));
    }

    #[test]
    fn test_excerpt_is_char_safe() {
        let body = "ж".repeat(300);
        assert_eq!(excerpt(&body).chars().count(), 200);
        assert_eq!(excerpt("short"), "short");
    }
}
