//! JSON handlers behind the `/api` routes.

use std::borrow::Cow;

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::core::config::{Settings, SettingsPatch};
use crate::core::environment::DataMode;
use crate::core::error::Error;
use crate::core::lifecycle::today;
use crate::core::model::{MemberDraft, MemberPatch, TaskDraft, TaskPatch};
use crate::core::notify::TestEmail;
use crate::core::service::ImportReport;
use crate::core::workbook::export_filename;

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A failed request: the route it happened on and the cause.
#[derive(Debug)]
pub struct ApiError {
    route: Cow<'static, str>,
    error: Error,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        log::error!("{} failed ({}): {}", self.route, status.as_u16(), self.error);
        (status, Json(json!({ "error": self.error.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

trait AtRoute<T> {
    fn at(self, route: &'static str) -> ApiResult<T>;
}

impl<T> AtRoute<T> for crate::core::error::Result<T> {
    fn at(self, route: &'static str) -> ApiResult<T> {
        self.map_err(|error| ApiError {
            route: Cow::Borrowed(route),
            error,
        })
    }
}

/// `Json` whose rejections answer like every other failed request.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let route = format!("{} {}", req.method(), req.uri().path());
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError {
                route: Cow::Owned(route),
                error: Error::invalid(rejection_message(&rejection)),
            }),
        }
    }
}

fn rejection_message(rejection: &JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected a JSON body (Content-Type: application/json)".to_string()
        }
        other => other.body_text(),
    }
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// What the dashboard needs before its first request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    pub mode: DataMode,
    pub tenant: Option<String>,
    pub client_id: Option<String>,
}

pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    let frontend_auth = state.config.frontend_auth;
    let pick = |value: &Option<String>| value.clone().filter(|_| frontend_auth);
    Json(ClientConfig {
        mode: state.mode(),
        tenant: pick(&state.config.graph.tenant_id),
        client_id: pick(&state.config.graph.client_id),
    })
}

pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.service.settings())
}

pub async fn put_settings(
    State(state): State<AppState>,
    JsonBody(patch): JsonBody<SettingsPatch>,
) -> ApiResult<Json<Settings>> {
    state.service.update_settings(patch).map(Json).at("PUT /api/settings")
}

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let tasks = state.service.list_tasks().await.at("GET /api/tasks")?;
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn create_task(
    State(state): State<AppState>,
    JsonBody(draft): JsonBody<TaskDraft>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let task = state.service.create_task(draft).await.at("POST /api/tasks")?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

pub async fn update_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<TaskPatch>,
) -> ApiResult<Json<Value>> {
    let task = state
        .service
        .update_task(&id, patch)
        .await
        .at("PUT /api/tasks/:id")?;
    Ok(Json(json!({ "task": task })))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.service.delete_task(&id).await.at("DELETE /api/tasks/:id")?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_team(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let team = state.service.list_team().await.at("GET /api/team")?;
    Ok(Json(json!({ "team": team })))
}

pub async fn create_member(
    State(state): State<AppState>,
    JsonBody(draft): JsonBody<MemberDraft>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let member = state.service.create_member(draft).await.at("POST /api/team")?;
    Ok((StatusCode::CREATED, Json(json!({ "member": member }))))
}

pub async fn update_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<MemberPatch>,
) -> ApiResult<Json<Value>> {
    let member = state
        .service
        .update_member(&id, patch)
        .await
        .at("PUT /api/team/:id")?;
    Ok(Json(json!({ "member": member })))
}

pub async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    state.service.delete_member(&id).await.at("DELETE /api/team/:id")?;
    Ok(Json(json!({ "success": true })))
}

pub async fn list_alerts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let date = today();
    let alerts = state.service.alerts(date).await.at("GET /api/alerts")?;
    Ok(Json(json!({ "date": date, "alerts": alerts })))
}

pub async fn send_alerts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let report = state
        .service
        .send_alerts(today())
        .await
        .at("POST /api/alerts/send")?;
    Ok(Json(json!({
        "success": report.failed == 0,
        "message": format!("Alert check done: {} sent, {} failed", report.sent, report.failed),
        "sent": report.sent,
        "failed": report.failed,
    })))
}

pub async fn send_test_email(
    State(state): State<AppState>,
    body: Option<Json<TestEmail>>,
) -> ApiResult<Json<Value>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let to = state
        .service
        .send_test_email(request)
        .await
        .at("POST /api/email/test")?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Test email sent to {}", to.join(", ")),
    })))
}

pub async fn dashboard(State(state): State<AppState>) -> ApiResult<Response> {
    let summary = state.service.dashboard(today()).await.at("GET /api/dashboard")?;
    Ok(Json(summary).into_response())
}

pub async fn export(State(state): State<AppState>) -> ApiResult<Response> {
    let date = today();
    let bytes = state.service.export(date).await.at("GET /api/export")?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(date));
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_MIME.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

pub async fn import(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportReport>> {
    const ROUTE: &str = "POST /api/import";
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid(format!("Invalid upload: {e}")))
        .at(ROUTE)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::invalid(format!("Invalid upload: {e}")))
            .at(ROUTE)?;
        upload = Some(bytes);
        break;
    }
    let bytes = upload
        .ok_or_else(|| Error::invalid("No file uploaded"))
        .at(ROUTE)?;
    state.service.import(&bytes).await.map(Json).at(ROUTE)
}
