//! In-process decryption service
//!
//! Holds the network private key and answers public-decryption requests for
//! handles the coprocessor has marked publicly decryptable. Anything else is
//! refused the way the hosted relayer refuses it.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::coprocessor::Coprocessor;
use crate::encryption::ElGamal;
use crate::error::{ReferendumError, Result};
use crate::keys::PrivateKey;
use crate::relayer::{PublicDecryptRequest, RelayerResponse, RelayerTransport, TransportError};
use crate::types::{CiphertextHandle, RelayerConfig};

/// Which of the known response shapes the service answers with
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseEncoding {
    #[default]
    Packed,
    ClearValues,
    Values,
    Bare,
}

pub struct LocalRelayer {
    elgamal: ElGamal,
    private_key: PrivateKey,
    coprocessor: Coprocessor,
    chain_id: u64,
    encoding: ResponseEncoding,
}

impl LocalRelayer {
    pub fn new(private_key: PrivateKey, coprocessor: Coprocessor) -> Result<Self> {
        let elgamal = ElGamal::with_config(
            coprocessor.public_key().clone(),
            coprocessor.config().clone(),
        )?;
        Ok(LocalRelayer {
            elgamal,
            private_key,
            coprocessor,
            chain_id: RelayerConfig::default().chain_id,
            encoding: ResponseEncoding::default(),
        })
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_encoding(mut self, encoding: ResponseEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn encoding(&self) -> ResponseEncoding {
        self.encoding
    }

    /// Answer one request. Never fails; refusals are carried in the status.
    pub fn answer(&self, request: &PublicDecryptRequest) -> RelayerResponse {
        if request.chain_id != self.chain_id {
            return RelayerResponse {
                status: 400,
                body: format!("unsupported chain id {}", request.chain_id),
            };
        }

        let mut values = Vec::with_capacity(request.ciphertext_handles.len());
        for handle in &request.ciphertext_handles {
            match self.reveal(handle) {
                Ok(value) => values.push(value),
                Err(ReferendumError::Acl(_)) => {
                    debug!(%handle, "refusing handle without public grant");
                    return RelayerResponse {
                        status: 400,
                        body: format!("handle {handle} is not allowed for public decryption"),
                    };
                }
                Err(e) => {
                    warn!(%handle, error = %e, "decryption failed");
                    return RelayerResponse {
                        status: 500,
                        body: e.to_string(),
                    };
                }
            }
        }

        RelayerResponse::ok(self.encode(&request.ciphertext_handles, &values).to_string())
    }

    fn reveal(&self, handle: &CiphertextHandle) -> Result<u64> {
        if !self.coprocessor.is_publicly_decryptable(handle) {
            return Err(ReferendumError::Acl(handle.to_string()));
        }
        let ciphertext = self
            .coprocessor
            .ciphertext(handle)
            .ok_or_else(|| ReferendumError::InvalidParameter(format!("unknown handle {handle}")))?;
        self.elgamal.decrypt(&ciphertext, &self.private_key)
    }

    fn encode(&self, handles: &[CiphertextHandle], values: &[u64]) -> Value {
        match self.encoding {
            ResponseEncoding::Packed => {
                let packed: String = values
                    .iter()
                    .map(|value| {
                        let mut word = [0u8; 32];
                        word[24..].copy_from_slice(&value.to_be_bytes());
                        hex::encode(word)
                    })
                    .collect();
                json!({ "response": [{ "decrypted_value": packed }] })
            }
            ResponseEncoding::ClearValues => {
                let map: Map<String, Value> = handles
                    .iter()
                    .zip(values)
                    .map(|(handle, value)| (handle.to_string(), Value::from(value.to_string())))
                    .collect();
                json!({ "clearValues": map })
            }
            ResponseEncoding::Values => json!({ "values": values }),
            ResponseEncoding::Bare => json!(values),
        }
    }
}

impl RelayerTransport for LocalRelayer {
    async fn post_public_decrypt(
        &self,
        request: &PublicDecryptRequest,
    ) -> std::result::Result<RelayerResponse, TransportError> {
        Ok(self.answer(request))
    }
}
