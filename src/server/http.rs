//! HTTP server implementation
//!
//! hyper http1 with TokioIo. Each connection is served on its own task;
//! request handling never holds mutable state across awaits beyond the
//! store handle itself.

use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::auth::{JwtValidator, PolicyTable};
use crate::config::Args;
use crate::db::MongoClient;
use crate::routes;
use crate::routes::helpers::{cors_preflight, not_found_response, BoxBody};
use crate::services::{
    EvaluationService, IdentityService, Mailer, ProjectService, PublicationService,
    ReportService, RequestService,
};
use crate::types::ClaustroError;

/// Shared application state: configuration, the policy table and one
/// instance of every service.
pub struct AppState {
    pub args: Args,
    pub mongo: MongoClient,
    pub policy: Arc<PolicyTable>,
    pub identity: IdentityService,
    pub projects: ProjectService,
    pub evaluations: EvaluationService,
    pub publications: PublicationService,
    pub requests: RequestService,
    pub reports: ReportService,
}

impl AppState {
    pub fn new(
        args: Args,
        mongo: MongoClient,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self, ClaustroError> {
        let jwt = if args.dev_mode && args.jwt_secret.is_none() {
            JwtValidator::new_dev()
        } else {
            JwtValidator::new(
                args.jwt_secret(),
                args.jwt_expiry_seconds,
                args.reset_expiry_seconds,
            )?
        };

        let policy = Arc::new(PolicyTable::standard());

        Ok(Self {
            identity: IdentityService::new(
                mongo.clone(),
                jwt,
                Arc::clone(&policy),
                mailer,
                &args,
            ),
            projects: ProjectService::new(mongo.clone(), Arc::clone(&policy)),
            evaluations: EvaluationService::new(mongo.clone(), Arc::clone(&policy)),
            publications: PublicationService::new(mongo.clone(), Arc::clone(&policy)),
            requests: RequestService::new(mongo.clone(), Arc::clone(&policy)),
            reports: ReportService::new(mongo.clone()),
            policy,
            mongo,
            args,
        })
    }
}

pub async fn run(state: Arc<AppState>) -> Result<(), ClaustroError> {
    let listener = TcpListener::bind(state.args.listen).await?;

    info!("claustro listening on {}", state.args.listen);
    if state.args.dev_mode {
        warn!("Development mode enabled - using the built-in JWT secret");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests by path prefix.
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("[{}] {} {}", addr, method, path);

    if method == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    match (&method, path.as_str()) {
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            return Ok(routes::health_check(state))
        }
        (&Method::GET, "/version") => return Ok(routes::version_info()),
        _ => {}
    }

    if path.starts_with("/auth") {
        if let Some(response) = routes::auth_routes::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/users") {
        if let Some(response) = routes::users::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/projects") {
        if let Some(response) = routes::projects::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/evaluations") {
        if let Some(response) = routes::evaluations::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/publications") {
        if let Some(response) = routes::publications::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/requests") {
        if let Some(response) = routes::requests::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    if path.starts_with("/reports") {
        if let Some(response) = routes::reports::handle(req, state).await {
            return Ok(response);
        }
        return Ok(not_found_response(&path));
    }

    Ok(not_found_response(&path))
}
