//! HTTP routes for report exports
//!
//! CSV downloads with generated attachment filenames. Global reports are
//! administrator-only; the /reports/my/* variants cover the caller's own
//! projects and their evaluations.

use hyper::body::Incoming;
use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::auth::Operation;
use crate::routes::helpers::{authenticate, error_response, full_body, BoxBody};
use crate::server::AppState;
use crate::services::reports::generate_unique_filename;
use crate::services::ReportScope;
use crate::types::{ClaustroError, Result};

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str()) {
        (Method::GET, "/reports/projects.csv") => {
            global_csv(req, state, Report::Projects).await
        }
        (Method::GET, "/reports/evaluations.csv") => {
            global_csv(req, state, Report::Evaluations).await
        }
        (Method::GET, "/reports/my/projects.csv") => {
            own_csv(req, state, Report::Projects).await
        }
        (Method::GET, "/reports/my/evaluations.csv") => {
            own_csv(req, state, Report::Evaluations).await
        }
        _ => return None,
    };

    Some(response.unwrap_or_else(|e| error_response(&e)))
}

#[derive(Clone, Copy)]
enum Report {
    Projects,
    Evaluations,
}

async fn global_csv(
    req: Request<Incoming>,
    state: Arc<AppState>,
    report: Report,
) -> Result<Response<BoxBody>> {
    let (_user, role, _token) = authenticate(&state, &req).await?;
    if !state.policy.allows(role, false, Operation::ReportGlobal) {
        return Err(ClaustroError::Forbidden(
            "Acceso denegado. Usted no cumple con el rol requerido".into(),
        ));
    }

    render(state, report, ReportScope::Global).await
}

async fn own_csv(
    req: Request<Incoming>,
    state: Arc<AppState>,
    report: Report,
) -> Result<Response<BoxBody>> {
    let (user, role, _token) = authenticate(&state, &req).await?;
    if !state.policy.allows(role, false, Operation::ReportOwn) {
        return Err(ClaustroError::Forbidden(
            "Acceso denegado. Usted no cumple con el rol requerido".into(),
        ));
    }

    let actor = user
        ._id
        .ok_or_else(|| ClaustroError::Internal("User document without id".into()))?;
    render(state, report, ReportScope::Investigator(actor)).await
}

async fn render(
    state: Arc<AppState>,
    report: Report,
    scope: ReportScope,
) -> Result<Response<BoxBody>> {
    let (csv, prefix) = match (report, &scope) {
        (Report::Projects, ReportScope::Global) => {
            (state.reports.projects_csv(scope).await?, "Project_Reports")
        }
        (Report::Projects, ReportScope::Investigator(_)) => (
            state.reports.projects_csv(scope).await?,
            "My_Projects_Report",
        ),
        (Report::Evaluations, ReportScope::Global) => (
            state.reports.evaluations_csv(scope).await?,
            "Evaluations_Report",
        ),
        (Report::Evaluations, ReportScope::Investigator(_)) => (
            state.reports.evaluations_csv(scope).await?,
            "My_Projects_Evaluations_Report",
        ),
    };

    let filename = generate_unique_filename(prefix, "csv");

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/csv; charset=utf-8")
        .header(
            "Content-Disposition",
            format!("attachment; filename={}", filename),
        )
        .header("Access-Control-Allow-Origin", "*")
        .body(full_body(csv))
        .unwrap())
}
