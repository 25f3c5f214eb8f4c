//! SharePoint mode against an in-process fake of the Graph list and mail API.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use reqwest::Client;
use serde_json::{json, Map, Value};
use task_dashboard::app::{build_router, build_state};
use task_dashboard::core::environment::ServerConfig;
use tempfile::tempdir;

const TOKEN: &str = "test-token";
/// Small pages so listing has to follow `@odata.nextLink`.
const PAGE: usize = 2;

#[derive(Default)]
struct FakeGraph {
    base: String,
    lists: HashMap<String, Vec<(u64, Map<String, Value>)>>,
    next_id: u64,
    mail: Vec<Value>,
}

type Shared = Arc<Mutex<FakeGraph>>;

impl FakeGraph {
    fn seed(&mut self, list: &str, fields: Value) {
        self.next_id += 1;
        let fields = fields.as_object().cloned().unwrap_or_default();
        self.lists
            .entry(list.to_string())
            .or_default()
            .push((self.next_id, fields));
    }

    fn fields_where(&self, list: &str, column: &str, value: &str) -> Option<Map<String, Value>> {
        self.lists.get(list)?.iter().find_map(|(_, fields)| {
            (fields.get(column).and_then(Value::as_str) == Some(value)).then(|| fields.clone())
        })
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {TOKEN}").as_str())
}

fn item_json(id: u64, fields: &Map<String, Value>) -> Value {
    json!({
        "id": id.to_string(),
        "lastModifiedDateTime": "2024-06-01T10:00:00Z",
        "fields": fields,
    })
}

async fn list_items(
    State(graph): State<Shared>,
    Path((site, list)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let graph = graph.lock().expect("fake graph lock");
    let page: usize = query.get("page").and_then(|p| p.parse().ok()).unwrap_or(0);
    let items = graph.lists.get(&list).cloned().unwrap_or_default();
    let value: Vec<Value> = items
        .iter()
        .skip(page * PAGE)
        .take(PAGE)
        .map(|(id, fields)| item_json(*id, fields))
        .collect();
    let mut body = json!({ "value": value });
    if (page + 1) * PAGE < items.len() {
        body["@odata.nextLink"] = json!(format!(
            "{}/sites/{site}/lists/{list}/items?page={}",
            graph.base,
            page + 1
        ));
    }
    Json(body).into_response()
}

async fn create_item(
    State(graph): State<Shared>,
    Path((_site, list)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let mut graph = graph.lock().expect("fake graph lock");
    graph.seed(&list, body["fields"].clone());
    // Like the real API, the create answer does not echo custom columns
    let id = graph.next_id;
    (StatusCode::CREATED, Json(json!({ "id": id.to_string() }))).into_response()
}

async fn get_item(
    State(graph): State<Shared>,
    Path((_site, list, id)): Path<(String, String, u64)>,
) -> Response {
    let graph = graph.lock().expect("fake graph lock");
    graph
        .lists
        .get(&list)
        .and_then(|items| items.iter().find(|(item, _)| *item == id))
        .map(|(id, fields)| Json(item_json(*id, fields)).into_response())
        .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

async fn delete_item(
    State(graph): State<Shared>,
    Path((_site, list, id)): Path<(String, String, u64)>,
) -> StatusCode {
    let mut graph = graph.lock().expect("fake graph lock");
    match graph.lists.get_mut(&list) {
        Some(items) if items.iter().any(|(item, _)| *item == id) => {
            items.retain(|(item, _)| *item != id);
            StatusCode::NO_CONTENT
        }
        _ => StatusCode::NOT_FOUND,
    }
}

async fn patch_fields(
    State(graph): State<Shared>,
    Path((_site, list, id)): Path<(String, String, u64)>,
    Json(body): Json<Map<String, Value>>,
) -> Response {
    let mut graph = graph.lock().expect("fake graph lock");
    let Some((_, fields)) = graph
        .lists
        .get_mut(&list)
        .and_then(|items| items.iter_mut().find(|(item, _)| *item == id))
    else {
        return StatusCode::NOT_FOUND.into_response();
    };
    fields.extend(body);
    Json(Value::Object(fields.clone())).into_response()
}

async fn send_mail(
    State(graph): State<Shared>,
    Path(sender): Path<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut graph = graph.lock().expect("fake graph lock");
    graph.mail.push(json!({ "sender": sender, "message": body["message"] }));
    StatusCode::ACCEPTED
}

async fn spawn_fake_graph() -> (String, Shared) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake graph");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let shared: Shared = Arc::new(Mutex::new(FakeGraph {
        base: base.clone(),
        ..FakeGraph::default()
    }));
    let router = Router::new()
        .route(
            "/sites/:site/lists/:list/items",
            get(list_items).post(create_item),
        )
        .route(
            "/sites/:site/lists/:list/items/:id",
            get(get_item).delete(delete_item),
        )
        .route("/sites/:site/lists/:list/items/:id/fields", patch(patch_fields))
        .route("/users/:sender/sendMail", post(send_mail))
        .with_state(shared.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve fake graph");
    });
    (base, shared)
}

async fn spawn_app(graph_base: &str, data_dir: &FsPath, team_list: bool) -> String {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("DATA_MODE", "sharepoint".to_string()),
        ("DATA_DIR", data_dir.display().to_string()),
        ("GRAPH_BASE_URL", graph_base.to_string()),
        ("GRAPH_TOKEN", TOKEN.to_string()),
        ("SHAREPOINT_SITE_ID", "site-1".to_string()),
        ("SHAREPOINT_TASKS_LIST_ID", "tasks".to_string()),
        ("NOTIFICATION_SENDER_EMAIL", "bot@example.com".to_string()),
        ("PM_EMAIL", "pm@example.com".to_string()),
        ("MANAGER_EMAIL", "boss@example.com".to_string()),
    ]);
    if team_list {
        vars.insert("SHAREPOINT_TEAM_LIST_ID", "team".to_string());
    }
    let config = ServerConfig::from_lookup(|name| vars.get(name).cloned());
    let state = build_state(config).expect("build state");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind app");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.expect("serve app");
    });
    format!("http://{addr}")
}

fn seed_tasks(graph: &Shared) {
    let mut graph = graph.lock().expect("fake graph lock");
    graph.seed(
        "tasks",
        json!({ "Title": "Collect data", "TaskId": "TASK-001", "Status": "In Progress", "Priority": "High", "Progress": 40 }),
    );
    graph.seed(
        "tasks",
        json!({ "Title": "Analyse", "TaskId": "TASK-002", "Status": "To Do", "Priority": "Medium", "Dependency": "TASK-001" }),
    );
    graph.seed(
        "tasks",
        json!({ "Title": "Publish", "TaskId": "TASK-003", "Status": "To Do", "Priority": "Low" }),
    );
    // Rows without a TaskId are not tasks
    graph.seed("tasks", json!({ "Title": "Stray row" }));
}

async fn json_of(resp: reqwest::Response) -> Value {
    resp.json::<Value>().await.expect("json body")
}

#[tokio::test]
async fn test_task_crud_through_lists() {
    let (graph_base, graph) = spawn_fake_graph().await;
    seed_tasks(&graph);
    let dir = tempdir().expect("tempdir");
    let base = spawn_app(&graph_base, dir.path(), true).await;
    let client = Client::new();

    let config = json_of(client.get(format!("{base}/api/config")).send().await.expect("config")).await;
    assert_eq!(config["mode"], "sharepoint");

    let listed = json_of(client.get(format!("{base}/api/tasks")).send().await.expect("list")).await;
    assert_eq!(listed["tasks"].as_array().map(Vec::len), Some(3));

    let created = client
        .post(format!("{base}/api/tasks"))
        .json(&json!({ "name": "Report", "priority": "High" }))
        .send()
        .await
        .expect("create");
    assert_eq!(created.status(), StatusCode::CREATED.as_u16());
    let created = json_of(created).await;
    assert_eq!(created["task"]["id"], "TASK-004");
    assert_eq!(created["task"]["name"], "Report");

    let updated = json_of(
        client
            .put(format!("{base}/api/tasks/TASK-001"))
            .json(&json!({ "progress": 100 }))
            .send()
            .await
            .expect("update"),
    )
    .await;
    assert_eq!(updated["task"]["status"], "Done");
    {
        let graph = graph.lock().expect("fake graph lock");
        let fields = graph
            .fields_where("tasks", "TaskId", "TASK-001")
            .expect("TASK-001 item");
        assert_eq!(fields["Status"], "Done");
        assert_eq!(fields["Progress"], 100);
        assert!(fields["CompletedDate"].is_string());
    }

    let deleted = client
        .delete(format!("{base}/api/tasks/TASK-001"))
        .send()
        .await
        .expect("delete");
    assert_eq!(json_of(deleted).await, json!({ "success": true }));
    {
        let graph = graph.lock().expect("fake graph lock");
        assert!(graph.fields_where("tasks", "TaskId", "TASK-001").is_none());
        let dependent = graph
            .fields_where("tasks", "TaskId", "TASK-002")
            .expect("TASK-002 item");
        assert_eq!(dependent["Dependency"], "");
    }

    let missing = client
        .delete(format!("{base}/api/tasks/TASK-001"))
        .send()
        .await
        .expect("delete again");
    assert_eq!(missing.status(), StatusCode::NOT_FOUND.as_u16());
}

#[tokio::test]
async fn test_alert_dispatch_sends_mail_through_graph() {
    let (graph_base, graph) = spawn_fake_graph().await;
    let overdue = (chrono::Utc::now().date_naive() - chrono::Duration::days(8)).to_string();
    {
        let mut graph = graph.lock().expect("fake graph lock");
        graph.seed(
            "tasks",
            json!({ "Title": "Stuck", "TaskId": "TASK-001", "Status": "Blocked", "Priority": "High", "Assignee": "Anna", "DueDate": overdue }),
        );
        graph.seed(
            "team",
            json!({ "Title": "Anna", "MemberId": "anna", "Role": "Analyst", "Hours": 40, "Email": "anna@example.com" }),
        );
    }
    let dir = tempdir().expect("tempdir");
    let base = spawn_app(&graph_base, dir.path(), true).await;

    let report = json_of(
        Client::new()
            .post(format!("{base}/api/alerts/send"))
            .send()
            .await
            .expect("send alerts"),
    )
    .await;
    assert_eq!(report["success"], true);
    assert_eq!(report["sent"], 2);

    let graph = graph.lock().expect("fake graph lock");
    assert_eq!(graph.mail.len(), 2);
    let overdue_mail = &graph.mail[1];
    assert_eq!(overdue_mail["sender"], "bot@example.com");
    let recipients: Vec<&str> = overdue_mail["message"]["toRecipients"]
        .as_array()
        .expect("recipients")
        .iter()
        .filter_map(|r| r["emailAddress"]["address"].as_str())
        .collect();
    assert_eq!(
        recipients,
        vec!["pm@example.com", "anna@example.com", "boss@example.com"]
    );
}

#[tokio::test]
async fn test_team_list_crud() {
    let (graph_base, graph) = spawn_fake_graph().await;
    let dir = tempdir().expect("tempdir");
    let base = spawn_app(&graph_base, dir.path(), true).await;
    let client = Client::new();

    let created = client
        .post(format!("{base}/api/team"))
        .json(&json!({ "name": "Piotr Kowalski", "role": "Consultant", "hours": 32 }))
        .send()
        .await
        .expect("create member");
    assert_eq!(created.status(), StatusCode::CREATED.as_u16());
    assert_eq!(json_of(created).await["member"]["id"], "piotr.kowalski");

    let team = json_of(client.get(format!("{base}/api/team")).send().await.expect("team")).await;
    assert_eq!(team["team"][0]["hours"], 32.0);

    client
        .delete(format!("{base}/api/team/piotr.kowalski"))
        .send()
        .await
        .expect("delete member");
    let graph = graph.lock().expect("fake graph lock");
    assert!(graph.lists.get("team").is_some_and(Vec::is_empty));
}

#[tokio::test]
async fn test_team_falls_back_to_local_file() {
    let (graph_base, _graph) = spawn_fake_graph().await;
    let dir = tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("data.json"),
        json!({ "tasks": [], "team": [{ "id": "ola", "name": "Ola", "role": "PM", "hours": 40 }] })
            .to_string(),
    )
    .expect("write data.json");
    let base = spawn_app(&graph_base, dir.path(), false).await;
    let client = Client::new();

    let team = json_of(client.get(format!("{base}/api/team")).send().await.expect("team")).await;
    assert_eq!(team["team"][0]["name"], "Ola");

    let rejected = client
        .post(format!("{base}/api/team"))
        .json(&json!({ "name": "New Person" }))
        .send()
        .await
        .expect("create member");
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST.as_u16());
}
