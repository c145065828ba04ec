//! The JSON-RPC 2.0 surface.
//!
//! The HTTP transport is a collaborator; it decodes requests, takes the
//! chain lock, and calls [`Service::handle`]. Responses are plain values,
//! ready for `serde_json`.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use snowdag_consensus::Parameters;
use snowdag_engine::validators::ValidatorSet;
use snowdag_ids::{Id, ShortId};
use tracing::debug;

use crate::vm::Vm;
use crate::{LedgerError, Result};

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("method not found: {method}"))
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(-32602, format!("invalid params: {}", msg.into()))
    }

    pub fn application(err: &LedgerError) -> Self {
        Self::new(-32000, err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct IssueTxArgs {
    tx: String,
}

#[derive(Debug, Serialize)]
struct IssueTxReply {
    #[serde(rename = "txID")]
    tx_id: Id,
}

#[derive(Debug, Deserialize, Default)]
struct Index {
    #[serde(default)]
    address: String,
    #[serde(default)]
    utxo: String,
}

#[derive(Debug, Deserialize)]
struct GetUtxosArgs {
    addresses: Vec<String>,
    #[serde(default)]
    start_index: Option<Index>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct GetUtxosReply {
    #[serde(rename = "numFetched")]
    num_fetched: usize,
    utxos: Vec<String>,
    #[serde(rename = "endIndex")]
    end_index: EndIndex,
}

#[derive(Debug, Serialize)]
struct EndIndex {
    address: String,
    utxo: Id,
}

#[derive(Debug, Deserialize)]
struct GetTxStatusArgs {
    #[serde(rename = "txID")]
    tx_id: Id,
}

#[derive(Debug, Serialize)]
struct GetTxStatusReply {
    status: String,
}

#[derive(Debug, Serialize)]
struct HealthReply {
    #[serde(rename = "isWellConnected")]
    is_well_connected: bool,
    #[serde(rename = "percentConnected")]
    percent_connected: f64,
}

/// The chain's RPC service.
pub struct Service {
    vm: Arc<Vm>,
    validators: Arc<ValidatorSet>,
    params: Parameters,
    chain_alias: String,
}

impl Service {
    pub fn new(
        vm: Arc<Vm>,
        validators: Arc<ValidatorSet>,
        params: Parameters,
        chain_alias: impl Into<String>,
    ) -> Self {
        Self {
            vm,
            validators,
            params,
            chain_alias: chain_alias.into(),
        }
    }

    /// Formats an address as `alias-CB58`.
    #[must_use]
    pub fn format_address(&self, addr: &ShortId) -> String {
        format!("{}-{}", self.chain_alias, addr)
    }

    /// Parses an `alias-CB58` address for this chain.
    pub fn parse_address(&self, s: &str) -> Result<ShortId> {
        let (alias, raw) = s
            .split_once('-')
            .ok_or_else(|| LedgerError::InvalidAddress(s.to_string()))?;
        if alias != self.chain_alias {
            return Err(LedgerError::InvalidAddress(format!(
                "expected chain {} but got {alias}",
                self.chain_alias
            )));
        }
        ShortId::from_str(raw).map_err(|_| LedgerError::InvalidAddress(s.to_string()))
    }

    /// Dispatches one request.
    pub fn handle(&self, request: Request) -> Response {
        debug!(method = %request.method, "rpc request");
        let id = request.id.clone();
        let result = match request.method.as_str() {
            "snowdag.issueTx" => self.issue_tx(request.params),
            "snowdag.getUTXOs" => self.get_utxos(request.params),
            "snowdag.getTxStatus" => self.get_tx_status(request.params),
            "snowdag.health" => self.health(),
            other => return Response::failure(id, RpcError::method_not_found(other)),
        };
        match result {
            Ok(value) => Response::success(id, value),
            Err(error) => Response::failure(id, error),
        }
    }

    fn issue_tx(&self, params: Option<Value>) -> std::result::Result<Value, RpcError> {
        let args: IssueTxArgs = parse_params(params)?;
        let bytes = hex_decode(&args.tx)?;
        let tx_id = self
            .vm
            .issue_tx(&bytes)
            .map_err(|err| RpcError::application(&err))?;
        to_value(&IssueTxReply { tx_id })
    }

    fn get_utxos(&self, params: Option<Value>) -> std::result::Result<Value, RpcError> {
        let args: GetUtxosArgs = parse_params(params)?;
        let addrs = args
            .addresses
            .iter()
            .map(|s| {
                self.parse_address(s)
                    .map_err(|err| RpcError::invalid_params(err.to_string()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (start_addr, start_utxo) = match &args.start_index {
            None => (ShortId::EMPTY, Id::EMPTY),
            Some(index) => {
                let addr = if index.address.is_empty() {
                    ShortId::EMPTY
                } else {
                    self.parse_address(&index.address)
                        .map_err(|err| RpcError::invalid_params(err.to_string()))?
                };
                let utxo = if index.utxo.is_empty() {
                    Id::EMPTY
                } else {
                    Id::from_str(&index.utxo)
                        .map_err(|err| RpcError::invalid_params(err.to_string()))?
                };
                (addr, utxo)
            }
        };

        let (utxos, last_addr, last_utxo) = self
            .vm
            .get_utxos(&addrs, start_addr, start_utxo, args.limit.unwrap_or(0))
            .map_err(|err| RpcError::application(&err))?;

        let state = self.vm.ledger().state();
        let encoded = utxos
            .iter()
            .map(|utxo| hex::encode(state.marshal(utxo)))
            .collect();
        to_value(&GetUtxosReply {
            num_fetched: utxos.len(),
            utxos: encoded,
            end_index: EndIndex {
                address: self.format_address(&last_addr),
                utxo: last_utxo,
            },
        })
    }

    fn get_tx_status(&self, params: Option<Value>) -> std::result::Result<Value, RpcError> {
        let args: GetTxStatusArgs = parse_params(params)?;
        let status = self
            .vm
            .ledger()
            .state()
            .status(&args.tx_id)
            .map_err(|err| RpcError::application(&err))?;
        to_value(&GetTxStatusReply {
            status: status.to_string(),
        })
    }

    /// Healthy iff the connected stake fraction reaches the configured
    /// quorum fraction alpha/k.
    fn health(&self) -> std::result::Result<Value, RpcError> {
        let percent_connected = self.validators.percent_connected();
        let required = self.params.alpha as f64 / self.params.k as f64;
        to_value(&HealthReply {
            is_well_connected: percent_connected >= required,
            percent_connected,
        })
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(
    params: Option<Value>,
) -> std::result::Result<T, RpcError> {
    let params = params.unwrap_or(Value::Null);
    serde_json::from_value(params).map_err(|err| RpcError::invalid_params(err.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::new(-32603, err.to_string()))
}

fn hex_decode(s: &str) -> std::result::Result<Vec<u8>, RpcError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|err| RpcError::invalid_params(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_roundtrips() {
        let request = Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "snowdag.issueTx".to_string(),
            params: Some(json!({"tx": "0xabcd"})),
            id: json!(1),
        };
        let encoded = serde_json::to_string(&request).unwrap();
        let decoded: Request = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.method, "snowdag.issueTx");
    }

    #[test]
    fn responses_carry_result_or_error() {
        let ok = Response::success(json!(1), json!({"x": 1}));
        assert!(ok.result.is_some() && ok.error.is_none());

        let err = Response::failure(json!(1), RpcError::method_not_found("nope"));
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -32601);
    }

    #[test]
    fn hex_decoding_accepts_prefix() {
        assert_eq!(hex_decode("0x0102").unwrap(), vec![1, 2]);
        assert_eq!(hex_decode("0102").unwrap(), vec![1, 2]);
        assert!(hex_decode("zz").is_err());
    }
}
