//! HTTP document-store reporter
//!
//! Upsert: `PUT {base}/{collection}/{device_id}`.
//! Append: `POST {base}/{collection}` with the generated id in the body.

use super::StatusReporter;
use crate::error::ReportError;
use crate::model::{PresenceReport, StatusDocument, WriteMode};
use futures::future::{BoxFuture, FutureExt};
use std::time::Duration;
use tracing::debug;

pub struct HttpReporter {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    mode: WriteMode,
}

impl HttpReporter {
    pub fn new(
        base_url: impl Into<String>,
        collection: impl Into<String>,
        mode: WriteMode,
        request_timeout: Duration,
    ) -> Result<Self, ReportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("officetrack/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            mode,
        })
    }

    pub fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }

    pub fn document_url(&self, key: &str) -> String {
        format!("{}/{}", self.collection_url(), key)
    }
}

impl StatusReporter for HttpReporter {
    fn name(&self) -> &'static str {
        "http"
    }

    fn record(&self, report: PresenceReport) -> BoxFuture<'_, Result<(), ReportError>> {
        async move {
            let (key, document) = StatusDocument::prepare(&report, self.mode);

            let request = match self.mode {
                WriteMode::Upsert => self.client.put(self.document_url(&key)),
                WriteMode::Append => self.client.post(self.collection_url()),
            };

            let response = request.json(&document).send().await?;
            let status = response.status();

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ReportError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            debug!("Stored status document {} ({})", key, status);
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PresenceState;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Accepts one request, answers with `status`/`body`, hands back (request line, JSON body)
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<(String, Value)>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());

        let task = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];

            let (head_len, content_length) = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before headers");
                received.extend_from_slice(&chunk[..n]);

                if let Some(pos) = received.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&received[..pos]).to_string();
                    let length = head
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .map(|(_, value)| value.trim().parse::<usize>().unwrap())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };

            while received.len() < head_len + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "connection closed before body");
                received.extend_from_slice(&chunk[..n]);
            }

            let head = String::from_utf8_lossy(&received[..head_len]).to_string();
            let request_line = head.lines().next().unwrap_or_default().to_string();
            let json: Value = serde_json::from_slice(&received[head_len..head_len + content_length]).unwrap();

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();

            (request_line, json)
        });

        (base_url, task)
    }

    fn reporter(base_url: &str, mode: WriteMode) -> HttpReporter {
        HttpReporter::new(base_url, "userStatus", mode, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_puts_document_under_device_id() {
        let (base_url, server) = serve_once("200 OK", "").await;

        let report = PresenceReport::new(PresenceState::Inside, "a1:b2", "", 5);
        reporter(&base_url, WriteMode::Upsert).record(report).await.unwrap();

        let (request_line, body) = server.await.unwrap();
        assert_eq!(request_line, "PUT /userStatus/a1:b2 HTTP/1.1");
        assert_eq!(body, serde_json::json!({"value": 1, "timestamp": 5, "username": "Unknown"}));
    }

    #[tokio::test]
    async fn test_append_posts_document_with_generated_id() {
        let (base_url, server) = serve_once("201 Created", "").await;

        let report = PresenceReport::new(PresenceState::Outside, "a1:b2", "Alice", 6);
        reporter(&base_url, WriteMode::Append).record(report).await.unwrap();

        let (request_line, body) = server.await.unwrap();
        assert_eq!(request_line, "POST /userStatus HTTP/1.1");
        assert!(uuid::Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
        assert_eq!(body["value"], 2);
        assert_eq!(body["timestamp"], 6);
        assert_eq!(body["username"], "Alice");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let (base_url, server) = serve_once("500 Internal Server Error", "nope").await;

        let report = PresenceReport::new(PresenceState::Inside, "a1:b2", "Alice", 7);
        let result = reporter(&base_url, WriteMode::Upsert).record(report).await;
        server.await.unwrap();

        match result {
            Err(ReportError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "nope");
            }
            other => panic!("expected a rejected write, got {:?}", other),
        }
    }

    #[test]
    fn test_urls() {
        let reporter = HttpReporter::new(
            "https://store.example.com/v1/",
            "userStatus",
            WriteMode::Upsert,
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(reporter.collection_url(), "https://store.example.com/v1/userStatus");
        assert_eq!(
            reporter.document_url("a1:b2:c3:d4:e5:f6"),
            "https://store.example.com/v1/userStatus/a1:b2:c3:d4:e5:f6"
        );
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let reporter = HttpReporter::new(
            "http://127.0.0.1:9",
            "userStatus",
            WriteMode::Upsert,
            Duration::from_secs(2),
        )
        .unwrap();

        let report = PresenceReport::new(PresenceState::Inside, "dev", "Alice", 1);
        assert!(reporter.record(report).await.is_err());
    }
}
