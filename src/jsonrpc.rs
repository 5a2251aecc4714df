//! JSON-RPC 2.0 envelopes shared by the Electrum socket and the HTTP node client.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Value) -> Self {
        Self { jsonrpc: "2.0", id, method, params }
    }

    /// One line on the wire, `\n` included.
    pub fn to_line(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self).map_err(|e| Error::Protocol(format!("encode {}: {}", self.method, e)))?;
        line.push(b'\n');
        Ok(line)
    }
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Result { id: Option<u64>, result: Value },
    Error { id: Option<u64>, code: i64, message: String, data: Option<Value> },
    /// Server push (`{method, params}` without id). Subscriptions are not
    /// tracked, so these are dropped by callers.
    Notification { method: String, params: Value },
}

impl Response {
    pub fn parse(frame: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| Error::Protocol(format!("malformed frame: {}", e)))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut obj) = value else {
            return Err(Error::Protocol("malformed frame: not an object".into()));
        };
        let id = match obj.get("id") {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.as_u64().ok_or_else(|| Error::Protocol(format!("non-integer id: {}", v)))?),
        };

        match obj.remove("error") {
            Some(Value::Null) | None => {}
            Some(err) => {
                let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
                let message = match err.get("message").and_then(Value::as_str) {
                    Some(m) => m.to_string(),
                    None => err.to_string(),
                };
                let data = err.get("data").cloned();
                return Ok(Response::Error { id, code, message, data });
            }
        }

        if let Some(result) = obj.remove("result") {
            return Ok(Response::Result { id, result });
        }

        if id.is_none() {
            if let Some(Value::String(method)) = obj.remove("method") {
                let params = obj.remove("params").unwrap_or(Value::Null);
                return Ok(Response::Notification { method, params });
            }
        }

        Err(Error::Protocol("malformed frame: neither result nor error".into()))
    }

    pub fn id(&self) -> Option<u64> {
        match self {
            Response::Result { id, .. } | Response::Error { id, .. } => *id,
            Response::Notification { .. } => None,
        }
    }

    pub fn into_result(self) -> Result<Value> {
        match self {
            Response::Result { result, .. } => Ok(result),
            Response::Error { code, message, .. } => Err(Error::Rpc { code, message }),
            Response::Notification { method, .. } => Err(Error::Protocol(format!("unexpected notification {}", method))),
        }
    }
}
