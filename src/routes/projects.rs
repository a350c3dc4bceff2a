//! HTTP routes for projects
//!
//! - POST   /projects                      create
//! - GET    /projects                      paginated listing with ?search=
//! - GET    /projects/mine                 own projects
//! - GET    /projects/search?q=            free-text search
//! - GET    /projects/{id}                 fetch one
//! - PATCH  /projects/{id}                 whitelist update
//! - DELETE /projects/{id}                 soft delete
//! - POST   /projects/{id}/restore         administrator restore
//! - POST   /projects/{id}/evaluations     evaluate (administrator)
//! - GET    /projects/{id}/evaluations     evaluations of one project

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::routes::helpers::{
    authenticate, entity_response, error_response, json_response, message_response,
    page_response, pagination, parse_json_body, parse_object_id, parse_query, BoxBody,
};
use crate::server::AppState;
use crate::services::{EvaluationInput, NewProject};
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::POST, "/projects") => handle_create(req, state).await,
        (Method::GET, "/projects") => handle_list(req, state).await,
        (Method::GET, "/projects/mine") => handle_list_mine(req, state).await,
        (Method::GET, "/projects/search") => handle_search(req, state).await,
        (Method::POST, p) if p.ends_with("/restore") && segment(p).is_some() => {
            let id = segment(p).unwrap();
            handle_restore(req, state, &id).await
        }
        (Method::POST, p) if p.ends_with("/evaluations") && segment(p).is_some() => {
            let id = segment(p).unwrap();
            handle_evaluate(req, state, &id).await
        }
        (Method::GET, p) if p.ends_with("/evaluations") && segment(p).is_some() => {
            let id = segment(p).unwrap();
            handle_project_evaluations(req, state, &id).await
        }
        (Method::GET, p) if is_project_path(p) => {
            let id = p.trim_start_matches("/projects/").to_string();
            handle_get(req, state, &id).await
        }
        (Method::PATCH, p) if is_project_path(p) => {
            let id = p.trim_start_matches("/projects/").to_string();
            handle_update(req, state, &id).await
        }
        (Method::DELETE, p) if is_project_path(p) => {
            let id = p.trim_start_matches("/projects/").to_string();
            handle_delete(req, state, &id).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

fn is_project_path(path: &str) -> bool {
    path.strip_prefix("/projects/")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

/// The `{id}` of `/projects/{id}/<action>` paths.
fn segment(path: &str) -> Option<String> {
    let rest = path.strip_prefix("/projects/")?;
    let (id, _action) = rest.split_once('/')?;
    if id.is_empty() {
        return None;
    }
    Some(id.to_string())
}

async fn handle_create(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (user, _role, _token) = authenticate(&state, &req).await?;
    let creator = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let body: NewProject = parse_json_body(req).await?;
    let project = state.projects.create(body, creator).await?;

    Ok(entity_response(
        StatusCode::CREATED,
        Some("Proyecto creado exitosamente"),
        "project",
        project.view_json(),
    ))
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);
    let search = params.get("search").map(String::as_str);

    let result = state.projects.list(search, page, limit).await?;
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
    let search = params.get("search").map(String::as_str);

    let result = state.projects.list_mine(actor, search, page, limit).await?;
    Ok(page_response(result, |p| p.view_json()))
}

async fn handle_search(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;

    let params = parse_query(req.uri());
    let query = params
        .get("q")
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ClaustroError::BadRequest("El parámetro q es requerido".into()))?;

    let projects = state.projects.search(query).await?;
    let rendered: Vec<Value> = projects.iter().map(|p| p.view_json()).collect();
    Ok(json_response(StatusCode::OK, &json!({ "projects": rendered })))
}

async fn handle_get(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;
    let project = state.projects.get(parse_object_id(id)?).await?;
    Ok(entity_response(StatusCode::OK, None, "project", project.view_json()))
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
    let project = state.projects.update(target, patch, actor, role).await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Proyecto actualizado correctamente"),
        "project",
        project.view_json(),
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
        .projects
        .soft_delete(parse_object_id(id)?, actor, role)
        .await?;
    Ok(message_response(StatusCode::OK, "Proyecto eliminado exitosamente"))
}

async fn handle_restore(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    let project = state.projects.restore(parse_object_id(id)?, role).await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Proyecto restaurado exitosamente"),
        "project",
        project.view_json(),
    ))
}

async fn handle_evaluate(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;
    let project = parse_object_id(id)?;

    let body: EvaluationInput = parse_json_body(req).await?;
    let evaluation = state.evaluations.create(project, body, actor, role).await?;

    Ok(entity_response(
        StatusCode::CREATED,
        Some("Evaluación registrada exitosamente"),
        "evaluation",
        evaluation.view_json(),
    ))
}

async fn handle_project_evaluations(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (_user, _role, _token) = authenticate(&state, &req).await?;
    let evaluations = state.evaluations.by_project(parse_object_id(id)?).await?;

    let rendered: Vec<Value> = evaluations.iter().map(|e| e.view_json()).collect();
    Ok(json_response(StatusCode::OK, &json!({ "evaluations": rendered })))
}
