// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{AttestationError, OracleAttestation, OracleClient};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, Signature, H256};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationResponse {
    pub signer: Address,
    pub signature: Bytes,
}

/// Fetches attestations from an oracle's `GET /attestations/{guid_hash}` endpoint
pub struct HttpOracleClient {
    signer: Address,
    base_url: Url,
    client: Client,
}

impl HttpOracleClient {
    pub fn new(signer: Address, base_url: Url, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            signer,
            base_url,
            client,
        })
    }

    pub fn attestation_url(&self, guid_hash: H256) -> Result<Url, AttestationError> {
        self.base_url
            .join(&format!("attestations/{:#x}", guid_hash))
            .map_err(|e| self.request_error(e))
    }

    fn request_error(&self, e: impl std::fmt::Display) -> AttestationError {
        AttestationError::OracleRequest {
            signer: self.signer,
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl OracleClient for HttpOracleClient {
    async fn get_attestation(
        &self,
        guid_hash: H256,
    ) -> Result<Option<OracleAttestation>, AttestationError> {
        let response = self
            .client
            .get(self.attestation_url(guid_hash)?)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: AttestationResponse = response
            .error_for_status()
            .map_err(|e| self.request_error(e))?
            .json()
            .await
            .map_err(|e| self.request_error(e))?;
        let signature =
            Signature::try_from(body.signature.as_ref()).map_err(|e| self.request_error(e))?;
        Ok(Some(OracleAttestation {
            signer: body.signer,
            signature,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attestation_url() {
        let client = HttpOracleClient::new(
            Address::repeat_byte(1),
            Url::parse("http://oracle-1.example:8080/v1/").unwrap(),
            Duration::from_secs(5),
        )
        .unwrap();
        let url = client.attestation_url(H256::repeat_byte(0xab)).unwrap();
        assert_eq!(
            url.as_str(),
            format!(
                "http://oracle-1.example:8080/v1/attestations/0x{}",
                "ab".repeat(32)
            )
        );
    }

    #[test]
    fn test_response_shape() {
        let body = serde_json::json!({
            "signer": format!("0x{}", "11".repeat(20)),
            "signature": format!("0x{}", "22".repeat(65)),
        });
        let parsed: AttestationResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.signer, Address::repeat_byte(0x11));
        assert_eq!(parsed.signature.len(), 65);
    }
}
