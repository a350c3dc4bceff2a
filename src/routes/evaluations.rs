//! HTTP routes for evaluations
//!
//! Creation lives under /projects/{id}/evaluations; this module covers the
//! unscoped listing and per-evaluation mutation.
//!
//! - GET    /evaluations?project=&evaluator=   administrator listing
//! - PATCH  /evaluations/{id}                  evaluator-only update
//! - DELETE /evaluations/{id}                  evaluator-only soft delete
//! - POST   /evaluations/{id}/restore          evaluator-only restore

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::auth::Operation;
use crate::routes::helpers::{
    authenticate, entity_response, error_response, message_response, page_response,
    pagination, parse_json_body, parse_object_id, parse_query, BoxBody,
};
use crate::server::AppState;
use crate::services::EvaluationInput;
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/evaluations") => handle_list(req, state).await,
        (Method::POST, p) if p.ends_with("/restore") => {
            let id = p
                .trim_start_matches("/evaluations/")
                .trim_end_matches("/restore")
                .to_string();
            handle_restore(req, state, &id).await
        }
        (Method::PATCH, p) if is_evaluation_path(p) => {
            let id = p.trim_start_matches("/evaluations/").to_string();
            handle_update(req, state, &id).await
        }
        (Method::DELETE, p) if is_evaluation_path(p) => {
            let id = p.trim_start_matches("/evaluations/").to_string();
            handle_delete(req, state, &id).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

fn is_evaluation_path(path: &str) -> bool {
    path.strip_prefix("/evaluations/")
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}

async fn handle_list(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    if !state.policy.allows(role, false, Operation::EvaluationList) {
        return Err(ClaustroError::Forbidden(
            "Acceso denegado. Usted no cumple con el rol requerido".into(),
        ));
    }

    let params = parse_query(req.uri());
    let (page, limit) = pagination(&params);
    let project = params
        .get("project")
        .map(|p| parse_object_id(p))
        .transpose()?;
    let evaluator = params
        .get("evaluator")
        .map(|e| parse_object_id(e))
        .transpose()?;

    let result = state
        .evaluations
        .list(project, evaluator, page, limit)
        .await?;
    Ok(page_response(result, |e| e.view_json()))
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

    let body: EvaluationInput = parse_json_body(req).await?;
    let evaluation = state.evaluations.update(target, body, actor, role).await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Evaluación actualizada exitosamente"),
        "evaluation",
        evaluation.view_json(),
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
        .evaluations
        .delete(parse_object_id(id)?, actor, role)
        .await?;
    Ok(message_response(StatusCode::OK, "Evaluación eliminada exitosamente."))
}

async fn handle_restore(
    req: Request<Incoming>,
    state: Arc<AppState>,
    id: &str,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;

    let evaluation = state
        .evaluations
        .restore(parse_object_id(id)?, actor, role)
        .await?;

    Ok(entity_response(
        StatusCode::OK,
        Some("Evaluación restaurada exitosamente"),
        "evaluation",
        evaluation.view_json(),
    ))
}
