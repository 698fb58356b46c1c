//! Decryption orchestrator: turns authorized handles into cleartext values
//!
//! The relayer is an external service reached through [`RelayerTransport`].
//! Its answers come in several JSON shapes; [`DecryptionResponse`] names each
//! one and decodes them in a fixed priority order, failing closed on anything
//! it does not recognize.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{ReferendumError, Result};
use crate::registry::Referendum;
use crate::types::{CiphertextHandle, RelayerConfig};

/// Hex digits per handle in the packed encoding (one 32-byte word)
pub const PACKED_WORD_HEX_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDecryptRequest {
    pub chain_id: u64,
    pub ciphertext_handles: Vec<CiphertextHandle>,
    pub extra_data: String,
}

/// Raw answer from the relayer, before any interpretation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayerResponse {
    pub status: u16,
    pub body: String,
}

impl RelayerResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        RelayerResponse {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The request never produced a response
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Network seam to the decryption service
pub trait RelayerTransport: Send + Sync {
    fn post_public_decrypt(
        &self,
        request: &PublicDecryptRequest,
    ) -> impl Future<Output = std::result::Result<RelayerResponse, TransportError>> + Send;
}

/// Every response shape the relayer is known to produce
#[derive(Clone, Debug, PartialEq)]
pub enum DecryptionResponse {
    /// `{"response":[{"decrypted_value":"<64 hex digits per handle>"}]}`
    Packed(String),
    /// `{"clearValues":{"<handle>":value}}`
    ClearValues(Map<String, Value>),
    /// `{"decryptedValues":{"<handle>":value}}`
    DecryptedValues(Map<String, Value>),
    /// `{"values":[value, ...]}` in request order
    Values(Vec<Value>),
    /// `[value, ...]` in request order
    Bare(Vec<Value>),
    /// `{"<handle>":value, ...}`
    HandleMap(Map<String, Value>),
}

impl DecryptionResponse {
    pub fn parse(body: &str) -> Result<Self> {
        let json: Value = serde_json::from_str(body)
            .map_err(|e| ReferendumError::Decode(format!("response is not JSON: {e}")))?;
        Self::from_json(json)
    }

    pub fn from_json(json: Value) -> Result<Self> {
        match json {
            Value::Array(items) => Ok(DecryptionResponse::Bare(items)),
            Value::Object(mut object) => {
                if let Some(packed) = packed_value(&object) {
                    return Ok(DecryptionResponse::Packed(packed.to_string()));
                }
                if let Some(Value::Object(map)) = object.remove("clearValues") {
                    return Ok(DecryptionResponse::ClearValues(map));
                }
                if let Some(Value::Object(map)) = object.remove("decryptedValues") {
                    return Ok(DecryptionResponse::DecryptedValues(map));
                }
                if let Some(Value::Array(items)) = object.remove("values") {
                    return Ok(DecryptionResponse::Values(items));
                }
                if !object.is_empty()
                    && object.keys().all(|k| k.parse::<CiphertextHandle>().is_ok())
                {
                    return Ok(DecryptionResponse::HandleMap(object));
                }
                Err(ReferendumError::Decode(
                    "unrecognized response object".to_string(),
                ))
            }
            other => Err(ReferendumError::Decode(format!(
                "unrecognized response: {other}"
            ))),
        }
    }

    /// Cleartext for each handle, in the order given.
    ///
    /// A handle genuinely absent from the response reads as zero. Values that
    /// are present but malformed, or more values than handles, are errors.
    pub fn values_for(&self, handles: &[CiphertextHandle]) -> Result<Vec<u64>> {
        match self {
            DecryptionResponse::Packed(hex) => unpack(hex, handles.len()),
            DecryptionResponse::ClearValues(map)
            | DecryptionResponse::DecryptedValues(map)
            | DecryptionResponse::HandleMap(map) => by_handle(map, handles),
            DecryptionResponse::Values(items) | DecryptionResponse::Bare(items) => {
                if items.len() > handles.len() {
                    return Err(ReferendumError::Decode(format!(
                        "{} values for {} handles",
                        items.len(),
                        handles.len()
                    )));
                }
                (0..handles.len())
                    .map(|i| items.get(i).map_or(Ok(0), cleartext))
                    .collect()
            }
        }
    }
}

fn packed_value(object: &Map<String, Value>) -> Option<&str> {
    object
        .get("response")?
        .as_array()?
        .first()?
        .get("decrypted_value")?
        .as_str()
        .filter(|packed| !packed.is_empty())
}

fn unpack(hex: &str, count: usize) -> Result<Vec<u64>> {
    let digits = hex
        .strip_prefix("0x")
        .or_else(|| hex.strip_prefix("0X"))
        .unwrap_or(hex);
    if digits.is_empty() && count > 0 {
        return Err(ReferendumError::Decode(
            "packed value carries no words".to_string(),
        ));
    }
    if digits.len() % PACKED_WORD_HEX_LEN != 0 {
        return Err(ReferendumError::Decode(format!(
            "packed value has a partial word ({} hex digits)",
            digits.len()
        )));
    }
    let words = digits.len() / PACKED_WORD_HEX_LEN;
    if words > count {
        return Err(ReferendumError::Decode(format!(
            "{words} packed words for {count} handles"
        )));
    }
    (0..count)
        .map(|i| match digits.get(i * PACKED_WORD_HEX_LEN..(i + 1) * PACKED_WORD_HEX_LEN) {
            Some(word) => parse_hex(word),
            None => Ok(0),
        })
        .collect()
}

fn by_handle(map: &Map<String, Value>, handles: &[CiphertextHandle]) -> Result<Vec<u64>> {
    let keyed = map
        .iter()
        .map(|(key, value)| {
            let handle = key
                .parse::<CiphertextHandle>()
                .map_err(|_| ReferendumError::Decode(format!("'{key}' is not a handle")))?;
            Ok((handle, value))
        })
        .collect::<Result<HashMap<_, _>>>()?;
    handles
        .iter()
        .map(|handle| keyed.get(handle).map_or(Ok(0), |value| cleartext(value)))
        .collect()
}

fn cleartext(value: &Value) -> Result<u64> {
    match value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ReferendumError::Decode(format!("not a u64 cleartext: {n}"))),
        Value::String(s) => match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(digits) => parse_hex(digits),
            None => s
                .parse()
                .map_err(|e| ReferendumError::Decode(format!("bad cleartext '{s}': {e}"))),
        },
        other => Err(ReferendumError::Decode(format!(
            "unexpected cleartext: {other}"
        ))),
    }
}

fn parse_hex(digits: &str) -> Result<u64> {
    u64::from_str_radix(digits, 16)
        .map_err(|e| ReferendumError::Decode(format!("bad hex cleartext '{digits}': {e}")))
}

/// Map a non-success relayer answer onto the error taxonomy
fn check_status(response: &RelayerResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let body = &response.body;
    if response.status == 520 || body.contains("Web server") {
        return Err(ReferendumError::RelayerUnavailable(body.clone()));
    }
    if response.status == 403 || body.contains("not allowed") || body.contains("not permitted") {
        return Err(ReferendumError::Acl(body.clone()));
    }
    Err(ReferendumError::Relayer {
        status: response.status,
        body: body.clone(),
    })
}

/// Decrypted tallies of one proposal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedTally {
    pub yes: u64,
    pub no: u64,
}

pub struct DecryptionOrchestrator<T> {
    transport: T,
    config: RelayerConfig,
}

impl<T: RelayerTransport> DecryptionOrchestrator<T> {
    pub fn new(transport: T, config: RelayerConfig) -> Self {
        DecryptionOrchestrator { transport, config }
    }

    pub fn config(&self) -> &RelayerConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn request(&self, handles: &[CiphertextHandle]) -> PublicDecryptRequest {
        PublicDecryptRequest {
            chain_id: self.config.chain_id,
            ciphertext_handles: handles.to_vec(),
            extra_data: self.config.extra_data.clone(),
        }
    }

    /// Ask the relayer for the cleartexts of `handles`, in order.
    ///
    /// Authorization is not checked here; the relayer enforces it and a
    /// refusal comes back as `Acl`. The call is bounded by the configured
    /// timeout and is never retried.
    pub async fn request_reveal(&self, handles: &[CiphertextHandle]) -> Result<Vec<u64>> {
        if handles.is_empty() {
            return Ok(Vec::new());
        }

        let request = self.request(handles);
        debug!(
            count = handles.len(),
            chain_id = request.chain_id,
            "requesting public decryption"
        );

        let pending = self.transport.post_public_decrypt(&request);
        let response = match timeout(self.config.timeout, pending).await {
            Err(_) => {
                warn!(timeout = ?self.config.timeout, "public decryption timed out");
                return Err(ReferendumError::Timeout(self.config.timeout));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "relayer unreachable");
                return Err(ReferendumError::RelayerUnavailable(e.0));
            }
            Ok(Ok(response)) => response,
        };

        check_status(&response).inspect_err(|e| {
            warn!(status = response.status, error = %e, "relayer rejected request");
        })?;

        let values = DecryptionResponse::parse(&response.body)?.values_for(handles)?;
        info!(count = values.len(), "public decryption complete");
        Ok(values)
    }

    /// Reveal both tallies of an authorized proposal
    pub async fn reveal_proposal(&self, registry: &Referendum, id: u64) -> Result<RevealedTally> {
        let handles = registry.get_proposal_handles(id)?;
        match self.request_reveal(&[handles.yes, handles.no]).await?.as_slice() {
            [yes, no] => Ok(RevealedTally { yes: *yes, no: *no }),
            other => Err(ReferendumError::Decode(format!(
                "expected 2 cleartexts, got {}",
                other.len()
            ))),
        }
    }
}
