//! Shared plumbing for route handlers
//!
//! JSON body parsing, response builders matching the API's envelope
//! (`{ message?, <entity> }`, `{ total, page, limit, data }`,
//! `{ error }` / `{ errors: [..] }`) and the caller-authentication step
//! every protected route runs first.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::auth::{extract_token_from_header, Role};
use crate::db::schemas::UserDoc;
use crate::db::Page;
use crate::server::AppState;
use crate::types::{ClaustroError, Result};

pub type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

pub fn full_body(data: impl Into<Bytes>) -> BoxBody {
    Full::new(data.into()).map_err(|never| match never {}).boxed()
}

pub fn empty_body() -> BoxBody {
    Full::new(Bytes::new()).map_err(|never| match never {}).boxed()
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<BoxBody> {
    let rendered = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .body(full_body(rendered))
        .unwrap()
}

/// `{ "<key>": <entity> }`, optionally with a leading message.
pub fn entity_response(
    status: StatusCode,
    message: Option<&str>,
    key: &str,
    entity: Value,
) -> Response<BoxBody> {
    let mut body = Map::new();
    if let Some(message) = message {
        body.insert("message".into(), json!(message));
    }
    body.insert(key.into(), entity);
    json_response(status, &Value::Object(body))
}

pub fn message_response(status: StatusCode, message: &str) -> Response<BoxBody> {
    json_response(status, &json!({ "message": message }))
}

/// `{ total, page, limit, data: [...] }`
pub fn page_response<T>(page: Page<T>, render: impl Fn(&T) -> Value) -> Response<BoxBody> {
    let data: Vec<Value> = page.data.iter().map(render).collect();
    json_response(
        StatusCode::OK,
        &json!({
            "total": page.total,
            "page": page.page,
            "limit": page.limit,
            "data": data,
        }),
    )
}

/// Map a service error onto the wire: `{ error }` for single failures,
/// `{ errors: [..] }` for multi-field validation.
pub fn error_response(err: &ClaustroError) -> Response<BoxBody> {
    let status = err.status_code();
    let messages = err.public_messages();

    let body = if messages.len() > 1 {
        json!({ "errors": messages })
    } else {
        json!({ "error": messages.first().cloned().unwrap_or_default() })
    };

    json_response(status, &body)
}

pub fn cors_preflight() -> Response<BoxBody> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Methods", "GET, POST, PATCH, DELETE, OPTIONS")
        .header("Access-Control-Allow-Headers", "Content-Type, Authorization")
        .header("Access-Control-Max-Age", "86400")
        .body(empty_body())
        .unwrap()
}

pub fn not_found_response(path: &str) -> Response<BoxBody> {
    json_response(
        StatusCode::NOT_FOUND,
        &json!({ "error": format!("Ruta no encontrada: {}", path) }),
    )
}

pub async fn parse_json_body<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T> {
    let body = req
        .collect()
        .await
        .map_err(|e| ClaustroError::BadRequest(format!("Failed to read body: {}", e)))?;

    let bytes = body.to_bytes();
    if bytes.len() > 1_048_576 {
        return Err(ClaustroError::BadRequest("Request body too large".into()));
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| ClaustroError::BadRequest(format!("Invalid JSON: {}", e)))
}

pub fn get_auth_header(req: &Request<Incoming>) -> Option<&str> {
    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
}

/// Resolve the caller. Also returns the raw token so logout can revoke
/// exactly this session.
pub async fn authenticate(
    state: &Arc<AppState>,
    req: &Request<Incoming>,
) -> Result<(UserDoc, Role, String)> {
    let token = extract_token_from_header(get_auth_header(req))
        .ok_or_else(|| ClaustroError::Unauthorized("Por favor, autentíquese.".into()))?
        .to_string();

    let (user, role) = state.identity.authenticate(&token).await?;
    Ok((user, role, token))
}

/// Minimal query-string parsing with percent-decoding.
pub fn parse_query(uri: &hyper::Uri) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = uri.query() {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                params.insert(percent_decode(key), percent_decode(value));
            }
        }
    }
    params
}

fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if let (Some(hi), Some(lo)) = (
                    bytes.get(i + 1).and_then(|b| (*b as char).to_digit(16)),
                    bytes.get(i + 2).and_then(|b| (*b as char).to_digit(16)),
                ) {
                    out.push((hi * 16 + lo) as u8);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// page/limit with the API defaults.
pub fn pagination(params: &HashMap<String, String>) -> (u64, u64) {
    let page = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .unwrap_or(1u64)
        .max(1);
    let limit = params
        .get("limit")
        .and_then(|l| l.parse().ok())
        .unwrap_or(10u64)
        .clamp(1, 100);
    (page, limit)
}

/// Parse a path segment as an ObjectId, mapping failure to BadRequest.
pub fn parse_object_id(raw: &str) -> Result<bson::oid::ObjectId> {
    bson::oid::ObjectId::parse_str(raw)
        .map_err(|_| ClaustroError::BadRequest("Identificador inválido".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_decode() {
        assert_eq!(percent_decode("hello+world"), "hello world");
        assert_eq!(percent_decode("caf%C3%A9"), "café");
        assert_eq!(percent_decode("plain"), "plain");
        assert_eq!(percent_decode("bad%2"), "bad%2");
    }

    #[test]
    fn test_pagination_defaults_and_clamping() {
        let mut params = HashMap::new();
        assert_eq!(pagination(&params), (1, 10));

        params.insert("page".into(), "3".into());
        params.insert("limit".into(), "25".into());
        assert_eq!(pagination(&params), (3, 25));

        params.insert("page".into(), "0".into());
        params.insert("limit".into(), "9999".into());
        assert_eq!(pagination(&params), (1, 100));
    }

    #[test]
    fn test_parse_object_id() {
        assert!(parse_object_id("not-an-id").is_err());
        let id = bson::oid::ObjectId::new();
        assert_eq!(parse_object_id(&id.to_hex()).unwrap(), id);
    }
}
