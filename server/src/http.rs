//! HTTP/JSON surface over the coordination kernel.
//!
//! Every response wraps its payload: `{ok:true,data}` on success,
//! `{ok:false,error}` on failure, with the status code taken from the
//! kernel error kind. The one deliberate exception is a claim conflict:
//! the response is 409 but the body is still `ok:true` carrying
//! `{claim, conflictsWith}`, because a conflict is an answer, not a
//! failure.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use foreman_core::error::CoordError;
use foreman_core::models::{
    Author, ChangeType, NewChange, NewEvidence, NewGate, NewGateRun, NewIntent, NewTask,
    TaskFilter, TaskStatus, UpdateOptions, UpdateTask,
};
use foreman_core::store::Store;
use foreman_core::Coordinator;

use crate::config::Config;
use crate::rate_limit::RateLimiter;
use crate::ws;

pub struct AppState<S> {
    pub coord: Arc<Coordinator<S>>,
    pub config: Arc<Config>,
    pub limiter: RateLimiter,
    pub started: Instant,
}

impl<S: Store> AppState<S> {
    pub fn new(coord: Arc<Coordinator<S>>, config: Arc<Config>) -> Self {
        let limiter = RateLimiter::new(config.coordination.rate_limit_rpm);
        Self {
            coord,
            config,
            limiter,
            started: Instant::now(),
        }
    }
}

/// Build the full router. The API routes sit behind the key/rate guard;
/// the websocket endpoint does not.
pub fn app<S: Store>(state: Arc<AppState<S>>) -> Router {
    let api = Router::new()
        .route("/api/status", get(get_status::<S>))
        .route("/api/feed", get(get_feed::<S>))
        .route(
            "/api/agents",
            get(get_agents::<S>).post(register_agent::<S>),
        )
        .route("/api/agents/:id/heartbeat", post(agent_heartbeat::<S>))
        .route("/api/tasks", post(create_task::<S>).get(list_tasks::<S>))
        .route(
            "/api/tasks/:id",
            get(get_task::<S>)
                .patch(update_task::<S>)
                .delete(delete_task::<S>),
        )
        .route("/api/board", get(get_board::<S>))
        .route("/api/tasks/:id/dependencies", post(add_dependency::<S>))
        .route(
            "/api/tasks/:id/dependencies/:dep",
            axum::routing::delete(remove_dependency::<S>),
        )
        .route("/api/tasks/:id/ready", get(get_readiness::<S>))
        .route(
            "/api/wip-limits",
            put(set_wip_limit::<S>).get(get_wip_limits::<S>),
        )
        .route("/api/intents", post(post_intent::<S>))
        .route("/api/tasks/:id/intents", get(get_task_intents::<S>))
        .route(
            "/api/claims",
            post(create_claim::<S>)
                .get(get_claims::<S>)
                .delete(release_claims::<S>),
        )
        .route("/api/claims/extend", post(extend_claims::<S>))
        .route("/api/evidence", post(attach_evidence::<S>))
        .route("/api/tasks/:id/evidence", get(get_task_evidence::<S>))
        .route("/api/changes", post(log_change::<S>))
        .route("/api/tasks/:id/changes", get(get_task_changes::<S>))
        .route("/api/gates", post(define_gate::<S>))
        .route("/api/gates/:id/runs", post(record_gate_run::<S>))
        .route("/api/tasks/:id/gates", get(get_gate_status::<S>))
        .route("/api/tasks/:id/compliance", get(get_compliance::<S>))
        .route("/api/tasks/:id/comments", post(add_comment::<S>))
        .route("/api/tasks/:id/blockers", post(add_blocker::<S>))
        .route("/api/blockers/:id/resolve", post(resolve_blocker::<S>))
        .layer(middleware::from_fn_with_state(state.clone(), guard::<S>));

    Router::new()
        .merge(api)
        .route("/ws", get(ws::ws_handler::<S>))
        .with_state(state)
}

fn ok<T: serde::Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({"ok": true, "data": data}))).into_response()
}

fn fail(err: CoordError) -> Response {
    let status = StatusCode::from_u16(err.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"ok": false, "error": err.to_string()}))).into_response()
}

fn reply<T: serde::Serialize>(result: foreman_core::Result<T>) -> Response {
    match result {
        Ok(data) => ok(data),
        Err(err) => fail(err),
    }
}

/// API-key auth plus per-key rate limiting, in one pass.
async fn guard<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if state.config.auth.enabled {
        match &key {
            None => {
                return fail(CoordError::Unauthorized("missing x-api-key".to_string()));
            }
            Some(provided) if !state.config.auth.api_keys.contains(provided) => {
                return fail(CoordError::Forbidden("api key rejected".to_string()));
            }
            Some(_) => {}
        }
    }

    let limit_key = key.unwrap_or_else(|| "anonymous".to_string());
    if !state.limiter.check(&limit_key) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"ok": false, "error": "rate limit exceeded"})),
        )
            .into_response();
    }

    next.run(request).await
}

// ---- status & feed ----

async fn get_status<S: Store>(State(state): State<Arc<AppState<S>>>) -> Response {
    match state.coord.status_summary().await {
        Ok(summary) => ok(json!({
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeMs": state.started.elapsed().as_millis() as u64,
            "summary": summary,
        })),
        Err(err) => fail(err),
    }
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

async fn get_feed<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50).min(500) as usize;
    ok(state.coord.recent_events(limit))
}

// ---- agents ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterAgentBody {
    agent_id: String,
    #[serde(default)]
    capabilities: Vec<String>,
}

async fn get_agents<S: Store>(State(state): State<Arc<AppState<S>>>) -> Response {
    reply(state.coord.list_agents().await)
}

async fn register_agent<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<RegisterAgentBody>,
) -> Response {
    reply(
        state
            .coord
            .register_agent(&body.agent_id, body.capabilities)
            .await,
    )
}

async fn agent_heartbeat<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(agent_id): Path<String>,
) -> Response {
    reply(state.coord.agent_heartbeat(&agent_id).await)
}

// ---- tasks ----

async fn create_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<NewTask>,
) -> Response {
    reply(state.coord.create_task(body).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TasksQuery {
    status: Option<String>,
    assigned_agent: Option<String>,
    label: Option<String>,
    limit: Option<u32>,
}

impl TasksQuery {
    fn into_filter(self) -> Result<TaskFilter, CoordError> {
        let status = self
            .status
            .map(|raw| raw.parse::<TaskStatus>())
            .transpose()
            .map_err(CoordError::Validation)?;
        Ok(TaskFilter {
            status,
            assigned_agent: self.assigned_agent,
            label: self.label,
            limit: self.limit,
        })
    }
}

async fn list_tasks<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<TasksQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => reply(state.coord.list_tasks(&filter).await),
        Err(err) => fail(err),
    }
}

async fn get_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.get_task(&task_id).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskBody {
    #[serde(flatten)]
    updates: UpdateTask,
    enforce_dependencies: Option<bool>,
    enforce_wip_limits: Option<bool>,
}

async fn update_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Json(body): Json<UpdateTaskBody>,
) -> Response {
    let opts = UpdateOptions {
        enforce_dependencies: body
            .enforce_dependencies
            .unwrap_or(state.config.coordination.strict_mode),
        enforce_wip_limits: body.enforce_wip_limits.unwrap_or(false),
    };
    reply(state.coord.update_task(&task_id, body.updates, opts).await)
}

async fn delete_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.delete_task(&task_id).await)
}

async fn get_board<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<TasksQuery>,
) -> Response {
    match query.into_filter() {
        Ok(filter) => reply(state.coord.board(&filter).await),
        Err(err) => fail(err),
    }
}

// ---- dependencies & readiness & wip ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DependencyBody {
    depends_on_task_id: String,
}

async fn add_dependency<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Json(body): Json<DependencyBody>,
) -> Response {
    reply(
        state
            .coord
            .add_dependency(&task_id, &body.depends_on_task_id)
            .await,
    )
}

async fn remove_dependency<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((task_id, dep)): Path<(String, String)>,
) -> Response {
    reply(state.coord.remove_dependency(&task_id, &dep).await)
}

async fn get_readiness<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.task_readiness(&task_id).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WipLimitBody {
    status: TaskStatus,
    limit: Option<u32>,
}

async fn set_wip_limit<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<WipLimitBody>,
) -> Response {
    reply(state.coord.set_wip_limit(body.status, body.limit).await)
}

async fn get_wip_limits<S: Store>(State(state): State<Arc<AppState<S>>>) -> Response {
    reply(state.coord.list_wip_limits().await)
}

// ---- intents ----

async fn post_intent<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<NewIntent>,
) -> Response {
    reply(state.coord.post_intent(body).await)
}

async fn get_task_intents<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.task_intents(&task_id).await)
}

// ---- claims ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateClaimBody {
    agent_id: String,
    files: Vec<String>,
    ttl_seconds: u32,
}

async fn create_claim<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateClaimBody>,
) -> Response {
    match state
        .coord
        .create_claim(&body.agent_id, &body.files, body.ttl_seconds)
        .await
    {
        Ok(outcome) => {
            // A conflict is a useful answer: 409, but still ok:true.
            let status = if outcome.granted() {
                StatusCode::OK
            } else {
                StatusCode::CONFLICT
            };
            (status, Json(json!({"ok": true, "data": outcome}))).into_response()
        }
        Err(err) => fail(err),
    }
}

async fn get_claims<S: Store>(State(state): State<Arc<AppState<S>>>) -> Response {
    reply(state.coord.active_claims().await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseClaimsBody {
    agent_id: String,
    files: Option<Vec<String>>,
}

async fn release_claims<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ReleaseClaimsBody>,
) -> Response {
    match state
        .coord
        .release_claims(&body.agent_id, body.files.as_deref())
        .await
    {
        Ok(released) => ok(json!({"released": released})),
        Err(err) => fail(err),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtendClaimsBody {
    agent_id: String,
    additional_seconds: u32,
    files: Option<Vec<String>>,
}

async fn extend_claims<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ExtendClaimsBody>,
) -> Response {
    match state
        .coord
        .extend_claims(&body.agent_id, body.additional_seconds, body.files.as_deref())
        .await
    {
        Ok(extended) => ok(json!({"extended": extended})),
        Err(err) => fail(err),
    }
}

// ---- evidence & changelog ----

async fn attach_evidence<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<NewEvidence>,
) -> Response {
    reply(state.coord.attach_evidence(body).await)
}

async fn get_task_evidence<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.task_evidence(&task_id).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeBody {
    task_id: Option<String>,
    agent_id: String,
    file_path: Option<String>,
    change_type: ChangeType,
    summary: String,
    diff_snippet: Option<String>,
    commit_hash: Option<String>,
}

async fn log_change<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<ChangeBody>,
) -> Response {
    let change = NewChange {
        task_id: body.task_id,
        author: Author::from(body.agent_id),
        file_path: body.file_path,
        change_type: body.change_type,
        summary: body.summary,
        diff_snippet: body.diff_snippet,
        commit_hash: body.commit_hash,
    };
    reply(state.coord.log_change(change).await)
}

async fn get_task_changes<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
) -> Response {
    reply(state.coord.task_changes(&task_id).await)
}

// ---- gates ----

async fn define_gate<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<NewGate>,
) -> Response {
    reply(state.coord.define_gate(body).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateRunBody {
    agent_id: String,
    passed: bool,
    output: Option<String>,
    duration_ms: Option<i64>,
}

async fn record_gate_run<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(gate_id): Path<String>,
    Json(body): Json<GateRunBody>,
) -> Response {
    let run = NewGateRun {
        gate_id,
        agent_id: body.agent_id,
        passed: body.passed,
        output: body.output,
        duration_ms: body.duration_ms,
    };
    reply(state.coord.record_gate_run(run).await)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GateStatusQuery {
    for_status: String,
}

async fn get_gate_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Query(query): Query<GateStatusQuery>,
) -> Response {
    let for_status = match query.for_status.parse::<TaskStatus>() {
        Ok(status) => status,
        Err(e) => return fail(CoordError::Validation(e)),
    };
    reply(state.coord.gate_status(&task_id, for_status).await)
}

// ---- compliance ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComplianceQuery {
    agent_id: String,
}

async fn get_compliance<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Query(query): Query<ComplianceQuery>,
) -> Response {
    reply(
        state
            .coord
            .compliance_check(&task_id, &query.agent_id)
            .await,
    )
}

// ---- comments & blockers ----

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentBody {
    author: String,
    body: String,
}

async fn add_comment<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Response {
    reply(
        state
            .coord
            .add_comment(&task_id, Author::from(body.author), &body.body)
            .await,
    )
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockerBody {
    agent_id: String,
    reason: String,
}

async fn add_blocker<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Json(body): Json<BlockerBody>,
) -> Response {
    reply(
        state
            .coord
            .add_blocker(&task_id, &body.agent_id, &body.reason)
            .await,
    )
}

async fn resolve_blocker<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(blocker_id): Path<String>,
) -> Response {
    reply(state.coord.resolve_blocker(&blocker_id).await)
}
