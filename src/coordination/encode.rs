//! Conversion of JSON step arguments into ABI tokens

use crate::error::{DeployerError, DeployerResult};

use ethers::abi::{Param, ParamType, Token};
use ethers::types::{Address, I256, U256};
use serde_json::Value;

/// Encode `values` against the parameter list of a constructor or function
pub fn tokenize_args(params: &[Param], values: &[Value]) -> DeployerResult<Vec<Token>> {
    if params.len() != values.len() {
        return Err(DeployerError::AbiEncoding(format!(
            "expected {} arguments, got {}",
            params.len(),
            values.len()
        )));
    }

    params
        .iter()
        .zip(values)
        .map(|(param, value)| {
            tokenize(&param.kind, value).map_err(|e| {
                DeployerError::AbiEncoding(format!("argument '{}': {}", param.name, e))
            })
        })
        .collect()
}

fn tokenize(kind: &ParamType, value: &Value) -> Result<Token, String> {
    match kind {
        ParamType::Address => {
            let s = expect_str(value)?;
            s.parse::<Address>()
                .map(Token::Address)
                .map_err(|_| format!("invalid address '{}'", s))
        }
        ParamType::Uint(_) => parse_uint(value).map(Token::Uint),
        ParamType::Int(_) => parse_int(value).map(|i| Token::Int(i.into_raw())),
        ParamType::Bool => match value {
            Value::Bool(b) => Ok(Token::Bool(*b)),
            Value::String(s) if s == "true" => Ok(Token::Bool(true)),
            Value::String(s) if s == "false" => Ok(Token::Bool(false)),
            other => Err(format!("expected bool, got {}", other)),
        },
        ParamType::String => expect_str(value).map(|s| Token::String(s.to_string())),
        ParamType::Bytes => parse_hex(value).map(Token::Bytes),
        ParamType::FixedBytes(size) => {
            let bytes = parse_hex(value)?;
            if bytes.len() != *size {
                return Err(format!("expected {} bytes, got {}", size, bytes.len()));
            }
            Ok(Token::FixedBytes(bytes))
        }
        ParamType::Array(inner) => expect_array(value)?
            .iter()
            .map(|v| tokenize(inner, v))
            .collect::<Result<Vec<_>, _>>()
            .map(Token::Array),
        ParamType::FixedArray(inner, size) => {
            let items = expect_array(value)?;
            if items.len() != *size {
                return Err(format!("expected {} elements, got {}", size, items.len()));
            }
            items
                .iter()
                .map(|v| tokenize(inner, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::FixedArray)
        }
        ParamType::Tuple(kinds) => {
            let items = expect_array(value)?;
            if items.len() != kinds.len() {
                return Err(format!("expected {} tuple fields, got {}", kinds.len(), items.len()));
            }
            kinds
                .iter()
                .zip(items)
                .map(|(k, v)| tokenize(k, v))
                .collect::<Result<Vec<_>, _>>()
                .map(Token::Tuple)
        }
    }
}

fn expect_str(value: &Value) -> Result<&str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected string, got {}", value))
}

fn expect_array(value: &Value) -> Result<&Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", value))
}

fn parse_hex(value: &Value) -> Result<Vec<u8>, String> {
    let s = expect_str(value)?;
    hex::decode(s.trim_start_matches("0x")).map_err(|e| format!("invalid hex '{}': {}", s, e))
}

fn parse_uint(value: &Value) -> Result<U256, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("expected unsigned integer, got {}", n)),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
            None => U256::from_dec_str(s).map_err(|e| e.to_string()),
        },
        other => Err(format!("expected unsigned integer, got {}", other)),
    }
}

fn parse_int(value: &Value) -> Result<I256, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(I256::from)
            .ok_or_else(|| format!("expected integer, got {}", n)),
        Value::String(s) => I256::from_dec_str(s).map_err(|e| e.to_string()),
        other => Err(format!("expected integer, got {}", other)),
    }
}
