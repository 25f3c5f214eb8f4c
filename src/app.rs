use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode, Uri};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;

use crate::api;
use crate::core::alerts::AlertRecipients;
use crate::core::config::ConfigManager;
use crate::core::environment::{DataMode, ServerConfig};
use crate::core::error::Result;
use crate::core::graph::GraphClient;
use crate::core::lifecycle;
use crate::core::notify::{GraphMailer, Mailer, Notifier};
use crate::core::scheduler::{self, AlertSchedule};
use crate::core::service::TaskService;
use crate::core::store::{LocalStore, SharePointStore, TaskStore};

/// Uploaded workbooks are capped at this size.
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TaskService>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn mode(&self) -> DataMode {
        self.service.mode()
    }
}

/// Wire the backend, mailer and service described by `config`.
pub fn build_state(config: ServerConfig) -> Result<AppState> {
    let mode = config.resolve_mode();

    let client = if mode == DataMode::SharePoint || config.mail_enabled() {
        Some(Arc::new(GraphClient::from_config(&config.graph)?))
    } else {
        None
    };

    let store: Arc<dyn TaskStore> = match (
        mode,
        &client,
        &config.graph.site_id,
        &config.graph.tasks_list_id,
    ) {
        (DataMode::SharePoint, Some(client), Some(site_id), Some(list_id)) => {
            Arc::new(SharePointStore::new(
                client.clone(),
                site_id.clone(),
                list_id.clone(),
                config.graph.team_list_id.clone(),
                &config.data_dir,
            ))
        }
        _ => Arc::new(LocalStore::new(&config.data_dir)),
    };

    let mailer: Option<Arc<dyn Mailer>> = match (&client, &config.mail.sender) {
        (Some(client), Some(sender)) if config.mail_enabled() => {
            Some(Arc::new(GraphMailer::new(client.clone(), sender.clone())))
        }
        _ => None,
    };
    let notifier = Notifier::new(
        mailer,
        AlertRecipients {
            project_lead: config.mail.project_lead.clone(),
            manager: config.mail.manager.clone(),
        },
    );

    let service = TaskService::new(
        store,
        notifier,
        ConfigManager::new(&config.data_dir),
        config.task_id_prefix.clone(),
    );
    Ok(AppState {
        service: Arc::new(service),
        config: Arc::new(config),
    })
}

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/config", get(api::get_config))
        .route("/api/settings", get(api::get_settings).put(api::put_settings))
        .route("/api/tasks", get(api::list_tasks).post(api::create_task))
        .route("/api/tasks/:id", put(api::update_task).delete(api::delete_task))
        .route("/api/team", get(api::list_team).post(api::create_member))
        .route("/api/team/:id", put(api::update_member).delete(api::delete_member))
        .route("/api/alerts", get(api::list_alerts))
        .route("/api/alerts/send", post(api::send_alerts))
        .route("/api/email/test", post(api::send_test_email))
        .route("/api/dashboard", get(api::dashboard))
        .route("/api/export", get(api::export))
        .route("/api/import", post(api::import))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut router = Router::new()
        .route("/healthz", get(api::healthz))
        .merge(api_routes);

    router = match (&state.config.static_dir, state.config.production) {
        (Some(_), true) => router.fallback(static_handler),
        _ => router.fallback(not_found_handler),
    };

    router
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(from_fn(cors_middleware))
        .with_state(state)
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Response {
    let mut resp = if req.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(req).await
    };
    let headers = resp.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,PUT,DELETE,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("authorization,content-type"),
    );
    resp
}

/// Bearer token presence check, enforced for SharePoint mode in production.
async fn auth_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    if state.mode() == DataMode::Local || !state.config.production {
        return next.run(req).await;
    }
    let has_token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| !token.trim().is_empty());
    if !has_token {
        log::debug!("Rejected {} {}: no bearer token", req.method(), req.uri().path());
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "No authorization token provided" })),
        )
            .into_response();
    }
    next.run(req).await
}

async fn not_found_handler(uri: Uri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("No route for {}", uri.path()) })),
    )
        .into_response()
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or_default() {
        "html" => "text/html; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Relative file path for `uri`, or `None` if it tries to leave the root.
fn static_path(root: &Path, uri: &Uri) -> Option<PathBuf> {
    let relative = Path::new(uri.path().trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// Built dashboard files, falling back to `index.html` for client routes.
async fn static_handler(State(state): State<AppState>, uri: Uri) -> Response {
    let Some(root) = state.config.static_dir.as_deref() else {
        return not_found_handler(uri).await;
    };
    if uri.path().starts_with("/api/") {
        return not_found_handler(uri).await;
    }

    let index = root.join("index.html");
    let candidate = static_path(root, &uri).filter(|p| p.is_file()).unwrap_or(index);
    match tokio::fs::read(&candidate).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(&candidate))], bytes).into_response(),
        Err(e) => {
            log::warn!("Static file {:?} unavailable: {}", candidate, e);
            not_found_handler(uri).await
        }
    }
}

/// Start the weekday alert job when mail delivery is configured.
fn start_alert_schedule(state: &AppState) -> Option<tokio::task::JoinHandle<()>> {
    if !state.service.notifier().is_enabled() {
        log::info!("Email alerts disabled: no sender mailbox or Graph credentials");
        return None;
    }
    let schedule = AlertSchedule::from_config(&state.config.alert_schedule)?;
    let service = state.service.clone();
    Some(scheduler::spawn(schedule, move || {
        let service = service.clone();
        async move {
            match service.send_alerts(lifecycle::today()).await {
                Ok(report) => log::info!(
                    "Scheduled alert check: {} sent, {} failed",
                    report.sent,
                    report.failed
                ),
                Err(e) => log::error!("Scheduled alert check failed: {}", e),
            }
        }
    }))
}

async fn serve(config: ServerConfig) -> Result<()> {
    let port = config.port;
    let state = build_state(config)?;
    log::info!(
        "Data mode: {} (data dir {:?})",
        state.mode(),
        state.config.data_dir
    );
    let _alerts = start_alert_schedule(&state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("Task dashboard API listening on http://localhost:{}", port);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

#[tokio::main]
pub async fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = serve(ServerConfig::from_env()).await {
        log::error!("Server stopped: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_path_rejects_traversal() {
        let root = Path::new("/srv/dist");
        let ok: Uri = "/assets/app.js".parse().unwrap();
        assert_eq!(
            static_path(root, &ok),
            Some(PathBuf::from("/srv/dist/assets/app.js"))
        );
        let evil: Uri = "/../secret.txt".parse().unwrap();
        assert_eq!(static_path(root, &evil), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(content_type(Path::new("a/b.css")), "text/css; charset=utf-8");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_local_state_has_no_mailer() {
        let dir = tempfile::tempdir().unwrap();
        let state = build_state(ServerConfig::local(dir.path())).unwrap();
        assert_eq!(state.mode(), DataMode::Local);
        assert!(!state.service.notifier().is_enabled());
    }
}
