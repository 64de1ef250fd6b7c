use crate::error::LedgerError;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub type HttpError = (StatusCode, Json<Value>);

// LedgerError -> (status, {"error": ..}) for axum handlers
pub fn to_http_err(e: LedgerError) -> HttpError {
    let code = match &e {
        LedgerError::Validation(_)    => StatusCode::BAD_REQUEST,
        LedgerError::Authorization(_) => StatusCode::FORBIDDEN,
        LedgerError::NotFound(_)      => StatusCode::NOT_FOUND,
        LedgerError::State(_)         => StatusCode::CONFLICT,
        LedgerError::Storage(_)       => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
    }
    (code, Json(json!({ "error": e.to_string() })))
}

pub fn http_err(code: StatusCode, msg: impl std::fmt::Display) -> HttpError {
    (code, Json(json!({ "error": msg.to_string() })))
}

/// `0x`-prefixed lowercase hex.
pub fn hex0x(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parses `0x`-prefixed (or bare) hex into a fixed-size array.
pub fn parse_hex_array<const N: usize>(s: &str) -> Option<[u8; N]> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_helpers() {
        assert_eq!(hex0x(&[0xab, 0x01]), "0xab01");
        assert_eq!(parse_hex_array::<2>("0xab01"), Some([0xab, 0x01]));
        assert_eq!(parse_hex_array::<2>("ab01"), Some([0xab, 0x01]));
        assert_eq!(parse_hex_array::<3>("0xab01"), None);
        assert_eq!(parse_hex_array::<2>("0xzz01"), None);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(to_http_err(LedgerError::state("x")).0, StatusCode::CONFLICT);
        assert_eq!(to_http_err(LedgerError::validation("x")).0, StatusCode::BAD_REQUEST);
        assert_eq!(to_http_err(LedgerError::Authorization("x".into())).0, StatusCode::FORBIDDEN);
        assert_eq!(to_http_err(LedgerError::NotFound("x".into())).0, StatusCode::NOT_FOUND);
    }
}
