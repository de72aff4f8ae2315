//! sign → delegate → merge → broadcast

use super::body::{SignedTransaction, TransactionBody};
use super::broadcast::TransactionBroadcaster;
use super::delegation::{sign_as_sponsor, DelegationRequest, SponsorClient};
use crate::config::Config;
use crate::wallet::LocalSigner;
use crate::{Error, Result};

/// Who pays for gas
#[derive(Debug, Clone, Copy)]
pub enum DelegationOption<'a> {
    /// The origin pays
    None,
    /// A sponsor service co-signs over HTTP
    Url(&'a str),
    /// A locally held account co-signs
    Account(&'a LocalSigner),
}

impl DelegationOption<'_> {
    fn is_delegated(&self) -> bool {
        !matches!(self, DelegationOption::None)
    }
}

/// Composes signing, optional fee delegation and broadcast.
#[derive(Debug, Clone)]
pub struct TransactionPipeline {
    sponsor: SponsorClient,
    broadcaster: TransactionBroadcaster,
    node_url: String,
}

impl TransactionPipeline {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            sponsor: SponsorClient::new(config.http.sponsor_timeout())?,
            broadcaster: TransactionBroadcaster::new(config.http.broadcast_timeout())?,
            node_url: config.node_url(),
        })
    }

    pub fn from_parts(
        sponsor: SponsorClient,
        broadcaster: TransactionBroadcaster,
        node_url: impl Into<String>,
    ) -> Self {
        Self {
            sponsor,
            broadcaster,
            node_url: node_url.into(),
        }
    }

    pub fn node_url(&self) -> &str {
        &self.node_url
    }

    /// Sign `body` as `origin`, collecting the gas payer's signature when
    /// delegating. The body's delegation feature must match `delegation`.
    pub async fn sign(
        &self,
        body: TransactionBody,
        origin: &LocalSigner,
        delegation: DelegationOption<'_>,
    ) -> Result<SignedTransaction> {
        body.validate()?;
        if body.is_delegated() != delegation.is_delegated() {
            return Err(Error::InvalidTransaction(format!(
                "delegation feature is {} but delegation option is {:?}",
                if body.is_delegated() { "set" } else { "unset" },
                delegation
            )));
        }

        let origin_signature = origin.sign_hash(&body.signing_hash())?;
        match delegation {
            DelegationOption::None => SignedTransaction::new(body, origin_signature),
            DelegationOption::Url(url) => {
                let request = DelegationRequest::new(&origin.address(), &body);
                let sponsor_signature = self.sponsor.request_sponsorship(url, &request).await?;
                SignedTransaction::with_delegation(body, origin_signature, sponsor_signature)
            }
            DelegationOption::Account(gas_payer) => {
                let sponsor_signature = sign_as_sponsor(gas_payer, &origin.address(), &body)?;
                SignedTransaction::with_delegation(body, origin_signature, sponsor_signature)
            }
        }
    }

    /// Sign, delegate and broadcast. Nothing is broadcast if any earlier
    /// step fails.
    pub async fn sign_and_send(
        &self,
        body: TransactionBody,
        origin: &LocalSigner,
        delegation: DelegationOption<'_>,
    ) -> Result<String> {
        let tx = self.sign(body, origin, delegation).await?;
        let expected = format!("{:#x}", tx.id()?);
        let id = self.broadcaster.submit(&tx.encode(), &self.node_url).await?;
        if !id.eq_ignore_ascii_case(&expected) {
            tracing::warn!(%expected, node_id = %id, "Node returned an unexpected transaction id");
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::body::tests::{body, delegated_body, ORIGIN_KEY, SPONSOR_KEY};
    use crate::transaction::mock_server::spawn;
    use alloy::primitives::{hex, B256};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn pipeline(node_url: &str) -> TransactionPipeline {
        TransactionPipeline::from_parts(
            SponsorClient::new(Duration::from_secs(5)).unwrap(),
            TransactionBroadcaster::new(Duration::from_secs(5)).unwrap(),
            node_url,
        )
    }

    /// Node that records raw payloads and answers with the given id
    async fn node(id: B256) -> (String, Arc<Mutex<Vec<String>>>) {
        let raws = Arc::new(Mutex::new(Vec::new()));
        let recorded = raws.clone();
        let app = Router::new().route(
            "/transactions",
            post(move |Json(body): Json<Value>| {
                let recorded = recorded.clone();
                async move {
                    recorded
                        .lock()
                        .unwrap()
                        .push(body["raw"].as_str().unwrap_or_default().to_string());
                    Json(serde_json::json!({ "id": id }))
                }
            }),
        );
        (spawn(app).await, raws)
    }

    #[tokio::test]
    async fn test_plain_transaction() {
        let origin = LocalSigner::from_hex(ORIGIN_KEY).unwrap();
        let expected = body().id(&origin.address());
        let (node_url, raws) = node(expected).await;

        let id = pipeline(&node_url)
            .sign_and_send(body(), &origin, DelegationOption::None)
            .await
            .unwrap();
        assert_eq!(id, format!("{:#x}", expected));
        assert_eq!(raws.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_url_delegation_merges_origin_then_sponsor() {
        let origin = LocalSigner::from_hex(ORIGIN_KEY).unwrap();
        let sponsor = LocalSigner::from_hex(SPONSOR_KEY).unwrap();
        let sponsor_sig = sign_as_sponsor(&sponsor, &origin.address(), &delegated_body()).unwrap();

        let sponsor_app = Router::new().route(
            "/sign",
            post(move || async move {
                Json(serde_json::json!({ "signature": hex::encode_prefixed(sponsor_sig) }))
            }),
        );
        let sponsor_url = format!("{}/sign", spawn(sponsor_app).await);

        let pipeline = pipeline("http://unused.invalid");
        let tx = pipeline
            .sign(
                delegated_body(),
                &origin,
                DelegationOption::Url(&sponsor_url),
            )
            .await
            .unwrap();

        assert_eq!(tx.signature().len(), 130);
        assert_eq!(&tx.signature()[65..], &sponsor_sig[..]);
        assert_eq!(tx.origin().unwrap(), origin.address());
        assert_eq!(tx.delegator().unwrap(), Some(sponsor.address()));
    }

    #[tokio::test]
    async fn test_account_delegation_end_to_end() {
        let origin = LocalSigner::from_hex(ORIGIN_KEY).unwrap();
        let gas_payer = LocalSigner::from_hex(SPONSOR_KEY).unwrap();
        let expected = delegated_body().id(&origin.address());
        let (node_url, raws) = node(expected).await;

        let id = pipeline(&node_url)
            .sign_and_send(
                delegated_body(),
                &origin,
                DelegationOption::Account(&gas_payer),
            )
            .await
            .unwrap();
        assert_eq!(id, format!("{:#x}", expected));

        let raw = raws.lock().unwrap()[0].clone();
        // 130-byte signature string closes the encoding
        assert!(raw.contains("c101b882"));
    }

    #[tokio::test]
    async fn test_sponsor_failure_blocks_broadcast() {
        let origin = LocalSigner::from_hex(ORIGIN_KEY).unwrap();
        let (node_url, raws) = node(B256::ZERO).await;
        let sponsor_app = Router::new().route(
            "/sign",
            post(|| async { Json(serde_json::json!({ "error": "not sponsored" })) }),
        );
        let sponsor_url = format!("{}/sign", spawn(sponsor_app).await);

        let err = pipeline(&node_url)
            .sign_and_send(
                delegated_body(),
                &origin,
                DelegationOption::Url(&sponsor_url),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SponsorshipRejected(_)));
        assert!(raws.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_feature_must_match_option() {
        let origin = LocalSigner::from_hex(ORIGIN_KEY).unwrap();
        let pipeline = pipeline("http://unused.invalid");

        let err = pipeline
            .sign(body(), &origin, DelegationOption::Account(&origin))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction(_)));

        let err = pipeline
            .sign(delegated_body(), &origin, DelegationOption::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransaction(_)));
    }
}
