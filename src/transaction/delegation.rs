//! Fee delegation (VIP-191) through a sponsor service

use super::body::TransactionBody;
use crate::wallet::{address_hex, LocalSigner, SIGNATURE_LENGTH};
use crate::{Error, Result};
use alloy::primitives::{hex, Address};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Body POSTed to the sponsor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRequest {
    /// Lowercase `0x` origin address
    pub origin: String,
    /// `0x` hex of the unsigned, delegation-flagged body
    pub raw: String,
}

impl DelegationRequest {
    pub fn new(origin: &Address, body: &TransactionBody) -> Self {
        Self {
            origin: address_hex(origin),
            raw: hex::encode_prefixed(body.encode_unsigned()),
        }
    }
}

/// Wire shape of a sponsor reply
#[derive(Debug, Deserialize)]
struct SponsorReply {
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// Sponsor reply after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SponsorResponse {
    Signed([u8; SIGNATURE_LENGTH]),
    Rejected(String),
}

impl SponsorResponse {
    /// An `error` field wins over any signature in the same reply.
    fn from_reply(reply: SponsorReply) -> Self {
        if let Some(error) = reply.error {
            return SponsorResponse::Rejected(reason_text(&error));
        }
        let Some(signature) = reply.signature else {
            return SponsorResponse::Rejected("sponsor reply has no signature".into());
        };
        match hex::decode(&signature) {
            Ok(bytes) if bytes.len() == SIGNATURE_LENGTH => {
                let mut out = [0u8; SIGNATURE_LENGTH];
                out.copy_from_slice(&bytes);
                SponsorResponse::Signed(out)
            }
            _ => SponsorResponse::Rejected("malformed sponsor signature".into()),
        }
    }
}

fn reason_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// HTTP client for sponsor endpoints
#[derive(Debug, Clone)]
pub struct SponsorClient {
    client: Client,
}

impl SponsorClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Ask the sponsor at `delegate_url` to co-sign. No retries.
    pub async fn request_sponsorship(
        &self,
        delegate_url: &str,
        request: &DelegationRequest,
    ) -> Result<[u8; SIGNATURE_LENGTH]> {
        tracing::info!(url = %delegate_url, origin = %request.origin, "Requesting fee delegation");

        let response = self
            .client
            .post(delegate_url)
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            let reason = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("error").or_else(|| v.get("message")).map(reason_text))
                .unwrap_or_else(|| body.trim().to_string());
            tracing::warn!(url = %delegate_url, status = status.as_u16(), "Sponsor refused");
            return Err(Error::SponsorshipRejected(format!(
                "HTTP {}: {}",
                status.as_u16(),
                reason
            )));
        }

        let reply: SponsorReply = serde_json::from_str(&body)
            .map_err(|_| Error::SponsorshipRejected("sponsor reply is not a JSON object".into()))?;
        match SponsorResponse::from_reply(reply) {
            SponsorResponse::Signed(signature) => {
                tracing::debug!(url = %delegate_url, "Sponsor signed");
                Ok(signature)
            }
            SponsorResponse::Rejected(reason) => {
                tracing::warn!(url = %delegate_url, %reason, "Sponsor rejected");
                Err(Error::SponsorshipRejected(reason))
            }
        }
    }
}

/// Gas-payer signature from a locally held account
pub fn sign_as_sponsor(
    sponsor: &LocalSigner,
    origin: &Address,
    body: &TransactionBody,
) -> Result<[u8; SIGNATURE_LENGTH]> {
    if !body.is_delegated() {
        return Err(Error::InvalidTransaction(
            "body does not have the delegation feature".into(),
        ));
    }
    sponsor.sign_hash(&body.delegator_signing_hash(origin))
}

/// Transport failures only. HTTP status and payload rejections are
/// decided by the caller after the body has been read.
fn classify(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("sponsor: {}", e))
    } else if e.is_builder() {
        Error::Config(format!("sponsor URL: {}", e))
    } else {
        Error::SponsorshipUnreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::body::tests::{delegated_body, ORIGIN_KEY, SPONSOR_KEY};
    use crate::transaction::mock_server::{spawn, truncated_body, unused_url};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    fn client() -> SponsorClient {
        SponsorClient::new(Duration::from_secs(5)).unwrap()
    }

    fn request_origin() -> Address {
        LocalSigner::from_hex(ORIGIN_KEY).unwrap().address()
    }

    fn request() -> DelegationRequest {
        DelegationRequest::new(&request_origin(), &delegated_body())
    }

    #[test]
    fn test_request_shape() {
        let request = request();
        assert_eq!(request.origin, "0xf077b491b355e64048ce21e3a6fc4751eeea77fa");
        assert!(request.raw.starts_with("0x"));
        assert!(request.raw.ends_with("c101"));
    }

    #[tokio::test]
    async fn test_sponsor_signs() {
        let sponsor = LocalSigner::from_hex(SPONSOR_KEY).unwrap();
        let expected = sign_as_sponsor(&sponsor, &request_origin(), &delegated_body()).unwrap();
        let seen = Arc::new(Mutex::new(None));

        let recorded = seen.clone();
        let app = Router::new().route(
            "/sign",
            post(move |Json(body): Json<DelegationRequest>| {
                let recorded = recorded.clone();
                async move {
                    *recorded.lock().unwrap() = Some(body);
                    Json(serde_json::json!({ "signature": hex::encode_prefixed(expected) }))
                }
            }),
        );
        let base = spawn(app).await;

        let signature = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap();
        assert_eq!(signature, expected);
        assert_eq!(seen.lock().unwrap().clone(), Some(request()));
    }

    #[tokio::test]
    async fn test_sponsor_error_field() {
        let app = Router::new().route(
            "/sign",
            post(|| async { Json(serde_json::json!({ "error": "quota exceeded" })) }),
        );
        let base = spawn(app).await;

        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipRejected(ref m) if m.contains("quota exceeded")));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_error_field_wins_over_signature() {
        let sponsor = LocalSigner::from_hex(SPONSOR_KEY).unwrap();
        let signature = sign_as_sponsor(&sponsor, &request_origin(), &delegated_body()).unwrap();
        let app = Router::new().route(
            "/sign",
            post(move || async move {
                Json(serde_json::json!({
                    "signature": hex::encode_prefixed(signature),
                    "error": "rejected"
                }))
            }),
        );
        let base = spawn(app).await;

        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        match err {
            Error::SponsorshipRejected(reason) => assert_eq!(reason, "rejected"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_dropped_mid_body_is_unreachable() {
        let base = truncated_body().await;
        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipUnreachable(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_sponsor_http_error() {
        let app = Router::new().route(
            "/sign",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(serde_json::json!({ "message": "origin not allowed" })),
                )
            }),
        );
        let base = spawn(app).await;

        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        match err {
            Error::SponsorshipRejected(reason) => {
                assert!(reason.contains("403"));
                assert!(reason.contains("origin not allowed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sponsor_malformed_signature() {
        let app = Router::new().route(
            "/sign",
            post(|| async { Json(serde_json::json!({ "signature": "0x1234" })) }),
        );
        let base = spawn(app).await;

        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipRejected(_)));
    }

    #[tokio::test]
    async fn test_sponsor_missing_signature() {
        let app = Router::new().route(
            "/sign",
            post(|| async { Json(serde_json::json!({ "ok": true })) }),
        );
        let base = spawn(app).await;

        let err = client()
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipRejected(_)));
    }

    #[tokio::test]
    async fn test_sponsor_unreachable() {
        let url = unused_url().await;
        let err = client()
            .request_sponsorship(&format!("{}/sign", url), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipUnreachable(_)), "got {err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_sponsor_timeout() {
        let app = Router::new().route(
            "/sign",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Json(serde_json::json!({}))
            }),
        );
        let base = spawn(app).await;

        let client = SponsorClient::new(Duration::from_millis(100)).unwrap();
        let err = client
            .request_sponsorship(&format!("{}/sign", base), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got {err:?}");
    }

    #[test]
    fn test_local_sponsor_requires_delegated_body() {
        let sponsor = LocalSigner::from_hex(SPONSOR_KEY).unwrap();
        let body = crate::transaction::body::tests::body();
        assert!(matches!(
            sign_as_sponsor(&sponsor, &request_origin(), &body),
            Err(Error::InvalidTransaction(_))
        ));
    }
}
