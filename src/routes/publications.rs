//! HTTP routes for publications
//!
//! - POST   /publications                create (author list derived)
//! - GET    /publications                paginated listing with filters
//! - GET    /publications/mine           own publications
//! - GET    /publications/search?q=      search titulo/resumen/palabrasClave
//! - GET    /publications/{id}           fetch one
//! - PATCH  /publications/{id}           strict whitelist update
//! - DELETE /publications/{id}           soft delete
//! - POST   /publications/{id}/restore   administrator restore

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::routes::helpers::{
    authenticate, entity_response, error_response, message_response, page_response,
    pagination, parse_json_body, parse_object_id, parse_query, BoxBody,
};
use crate::server::AppState;
use crate::services::NewPublication;
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/publications") => handle_create(req, state).await,
        (Method::GET, "/publications") => handle_list(req, state).await,
        (Method::GET, "/publications/mine") => handle_list_mine(req, state).await,
        (Method::GET, "/publications/search") => handle_search(req, state).await,
        (Method::POST, p) if p.ends_with("/restore") => {
            let id = p
                .trim_start_matches("/publications/")
                .trim_end_matches("/restore")
                .to_string();
            handle_restore(req, state, &id).await
        }
        (Method::GET, p) if is_publication_path(p) => {
            let id = p.trim_start_matches("/publications/").to_string();
            handle_get(req, state, &id).await
        }
        (Method::PATCH, p) if is_publication_path(p) => {
            let id = p.trim_start_matches("/publications/").to_string();
            handle_update(req, state, &id).await
        }
        (Method::DELETE, p) if is_publication_path(p) => {
            let id = p.trim_start_matches("/publications/").to_string();
            handle_delete(req, state, &id).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

fn is_publication_path(path: &str) -> bool {
    path.strip_prefix("/publications/")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let body: NewPublication = parse_json_body(req).await?;
    let publication = state.publications.create(body, actor, role).await?;

    Ok(entity_response(
        StatusCode::CREATED,
        Some("Publicación creada exitosamente"),
        "publication",
        publication.view_json(),
    ))
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);
    let titulo = params.get("titulo").map(String::as_str);
    let tipo = params.get("tipoPublicacion").map(String::as_str);

    let result = state.publications.list(titulo, tipo, page, limit).await?;
    Ok(page_response(result, |p| p.view_json()))
}

async fn handle_list_mine(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);

    let result = state.publications.list_mine(actor, page, limit).await?;
    Ok(page_response(result, |p| p.view_json()))
}

async fn handle_search(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);
    let query = params
        .get("q")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ClaustroError::BadRequest("El parámetro q es requerido".into()))?;

    let result = state.publications.search(query, page, limit).await?;
    Ok(page_response(result, |p| p.view_json()))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;
    let publication = state.publications.get(parse_object_id(id)?).await?;
    Ok(entity_response(
        StatusCode::OK,
        None,
        "publication",
        publication.view_json(),
    ))
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

    let patch: Map<String, Value> = parse_json_body(req).await?;
    let publication = state
        .publications
        .update(target, patch, actor, role)
        .await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Publicación actualizada exitosamente"),
        "publication",
        publication.view_json(),
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
        .publications
        .delete(parse_object_id(id)?, actor, role)
        .await?;
    Ok(message_response(
        StatusCode::OK,
        "Publicación eliminada (soft delete).",
    ))
}

async fn handle_restore(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let publication = state
        .publications
        .restore(parse_object_id(id)?, role)
        .await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Publicación restaurada exitosamente."),
        "publication",
        publication.view_json(),
    ))
}
