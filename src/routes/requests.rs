//! HTTP routes for requests (ticketing)
//!
//! - POST   /requests                 file a request
//! - GET    /requests?estado=         listing, scoped to own for investigators
//! - GET    /requests/{id}            fetch one (scoped)
//! - PATCH  /requests/{id}            resolve (admin) and/or comment
//! - DELETE /requests/{id}            soft delete by owner or admin
//! - POST   /requests/{id}/restore    administrator restore

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::routes::helpers::{
    authenticate, entity_response, error_response, message_response, page_response,
    pagination, parse_json_body, parse_object_id, parse_query, BoxBody,
};
use crate::server::AppState;
use crate::services::{NewRequest, RequestUpdate};
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/requests") => handle_create(req, state).await,
        (Method::GET, "/requests") => handle_list(req, state).await,
        (Method::POST, p) if p.ends_with("/restore") => {
            let id = p
                .trim_start_matches("/requests/")
                .trim_end_matches("/restore")
                .to_string();
            handle_restore(req, state, &id).await
        }
        (Method::GET, p) if is_request_path(p) => {
            let id = p.trim_start_matches("/requests/").to_string();
            handle_get(req, state, &id).await
        }
        (Method::PATCH, p) if is_request_path(p) => {
            let id = p.trim_start_matches("/requests/").to_string();
            handle_update(req, state, &id).await
        }
        (Method::DELETE, p) if is_request_path(p) => {
            let id = p.trim_start_matches("/requests/").to_string();
            handle_delete(req, state, &id).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

fn is_request_path(path: &str) -> bool {
    path.strip_prefix("/requests/")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let body: NewRequest = parse_json_body(req).await?;
    let request = state.requests.create(body, actor).await?;

    Ok(entity_response(
        StatusCode::CREATED,
        Some("Solicitud creada exitosamente"),
        "request",
        request.view_json(),
    ))
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);
    let estado = params.get("estado").map(String::as_str);

    let result = state.requests.list(estado, actor, role, page, limit).await?;
    Ok(page_response(result, |r| r.view_json()))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let request = state.requests.get(parse_object_id(id)?, actor, role).await?;
    Ok(entity_response(StatusCode::OK, None, "request", request.view_json()))
}

async fn handle_update(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;
    let target = parse_object_id(id)?;

    let body: RequestUpdate = parse_json_body(req).await?;
    let request = state.requests.update(target, body, actor, role).await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Solicitud actualizada exitosamente"),
        "request",
        request.view_json(),
    ))
}

async fn handle_delete(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    state
        .requests
        .delete(parse_object_id(id)?, actor, role)
        .await?;
    Ok(message_response(
        StatusCode::OK,
        "Solicitud eliminada exitosamente (soft delete).",
    ))
}

async fn handle_restore(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let request = state.requests.restore(parse_object_id(id)?, role).await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Solicitud restaurada exitosamente"),
        "request",
        request.view_json(),
    ))
}
