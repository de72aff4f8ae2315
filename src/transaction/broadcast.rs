//! Submitting signed transactions to a Thor node

use crate::{Error, Result};
use alloy::primitives::hex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    raw: &'a str,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// Node ids are `0x` hex; the length is the node's business.
fn is_hex_id(id: &str) -> bool {
    id.strip_prefix("0x")
        .is_some_and(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Client for `POST {node}/transactions`
#[derive(Debug, Clone)]
pub struct TransactionBroadcaster {
    client: Client,
}

impl TransactionBroadcaster {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Submit an encoded signed transaction and return the `id` the node
    /// reports, verbatim.
    ///
    /// Resubmitting the same bytes is left to the node to deduplicate.
    pub async fn submit(&self, encoded: &[u8], node_url: &str) -> Result<String> {
        let endpoint = format!("{}/transactions", node_url.trim_end_matches('/'));
        let raw = hex::encode_prefixed(encoded);
        tracing::info!(url = %endpoint, size = encoded.len(), "Broadcasting transaction");

        let response = self
            .client
            .post(&endpoint)
            .json(&SubmitRequest { raw: &raw })
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;
        if !status.is_success() {
            tracing::warn!(url = %endpoint, status = status.as_u16(), "Node rejected transaction");
            return Err(Error::BroadcastRejected {
                status: status.as_u16(),
                reason: body.trim().to_string(),
            });
        }

        let reply: SubmitResponse = serde_json::from_str(&body).map_err(|e| {
            Error::BroadcastRejected {
                status: status.as_u16(),
                reason: format!("unexpected node reply: {}", e),
            }
        })?;
        if !is_hex_id(&reply.id) {
            return Err(Error::BroadcastRejected {
                status: status.as_u16(),
                reason: format!("node returned a malformed id '{}'", reply.id),
            });
        }
        tracing::info!(id = %reply.id, "Transaction accepted");
        Ok(reply.id)
    }
}

fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("node: {}", e))
    } else {
        Error::NetworkUnreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::mock_server::{spawn, unused_url};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    const TX_ID: &str = "0xb731e888759ba6fd994744b1a33ea50b31aa89d7740c357fd482ca48ed0d340a";

    fn broadcaster() -> TransactionBroadcaster {
        TransactionBroadcaster::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_submit_returns_id() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/transactions",
            post(move |Json(body): Json<Value>| {
                let recorded = recorded.clone();
                async move {
                    recorded.lock().unwrap().push(body);
                    Json(serde_json::json!({ "id": TX_ID }))
                }
            }),
        );
        let base = spawn(app).await;

        let id = broadcaster()
            .submit(&[0xf8, 0x01], &format!("{}/", base))
            .await
            .unwrap();
        assert_eq!(id, TX_ID);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            [serde_json::json!({ "raw": "0xf801" })]
        );
    }

    #[tokio::test]
    async fn test_short_id_is_returned_verbatim() {
        let app = Router::new().route(
            "/transactions",
            post(|| async { Json(serde_json::json!({ "id": "0x123" })) }),
        );
        let base = spawn(app).await;

        let id = broadcaster()
            .submit(&[0xf8, 0x01], &base)
            .await
            .unwrap();
        assert_eq!(id, "0x123");
    }

    #[tokio::test]
    async fn test_malformed_id_is_rejected() {
        let app = Router::new().route(
            "/transactions",
            post(|| async { Json(serde_json::json!({ "id": "pending" })) }),
        );
        let base = spawn(app).await;

        let err = broadcaster().submit(&[0x01], &base).await.unwrap_err();
        assert!(matches!(err, Error::BroadcastRejected { status: 200, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_submit_twice_is_not_deduplicated() {
        let count = Arc::new(Mutex::new(0u32));
        let counter = count.clone();
        let app = Router::new().route(
            "/transactions",
            post(move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Json(serde_json::json!({ "id": TX_ID }))
                }
            }),
        );
        let base = spawn(app).await;

        let broadcaster = broadcaster();
        let first = broadcaster.submit(&[0x01], &base).await.unwrap();
        let second = broadcaster.submit(&[0x01], &base).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejection_carries_status_and_reason() {
        let app = Router::new().route(
            "/transactions",
            post(|| async { (StatusCode::BAD_REQUEST, "tx rejected: insufficient energy\n") }),
        );
        let base = spawn(app).await;

        let err = broadcaster().submit(&[0x01], &base).await.unwrap_err();
        match err {
            Error::BroadcastRejected { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "tx rejected: insufficient energy");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_node() {
        let url = unused_url().await;
        let err = broadcaster().submit(&[0x01], &url).await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnreachable(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout() {
        let app = Router::new().route(
            "/transactions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(serde_json::json!({ "id": TX_ID }))
            }),
        );
        let base = spawn(app).await;

        let broadcaster = TransactionBroadcaster::new(Duration::from_millis(100)).unwrap();
        let err = broadcaster.submit(&[0x01], &base).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    }
}
