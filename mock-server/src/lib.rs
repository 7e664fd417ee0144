use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

const ACCOUNTS_PATH: &str = "/v1/organisation/accounts";
const DEFAULT_PAGE_SIZE: usize = 100;

/// Single-resource envelope, as accepted on create.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub data: AccountData,
}

/// Stored record. Attributes are kept as opaque JSON; the ledger echoes
/// whatever it was given.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountData {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub organisation_id: String,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub attributes: Value,
}

#[derive(Deserialize)]
pub struct DeleteParams {
    pub version: Option<u64>,
}

/// In-memory ledger state.
///
/// `warmup_checks` health checks answer 503 before the service reports
/// itself up.
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: RwLock<Vec<AccountData>>,
    warmup_checks: AtomicU32,
}

pub type Db = Arc<Ledger>;

struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error_message": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    app_with_warmup(0)
}

pub fn app_with_warmup(warmup_checks: u32) -> Router {
    let db: Db = Arc::new(Ledger {
        accounts: RwLock::new(Vec::new()),
        warmup_checks: AtomicU32::new(warmup_checks),
    });
    Router::new()
        .route("/v1/health", get(health))
        .route(ACCOUNTS_PATH, get(list_accounts).post(create_account))
        .route(
            "/v1/organisation/accounts/{id}",
            get(fetch_account).delete(delete_account),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_warmup(listener, 0).await
}

pub async fn run_with_warmup(listener: TcpListener, warmup_checks: u32) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_warmup(warmup_checks)).await
}

fn self_link(id: &str) -> Value {
    json!({ "self": format!("{ACCOUNTS_PATH}/{id}") })
}

async fn health(State(db): State<Db>) -> (StatusCode, Json<Value>) {
    let warming_up = db
        .warmup_checks
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok();
    if warming_up {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "down" })))
    } else {
        (StatusCode::OK, Json(json!({ "status": "up" })))
    }
}

async fn list_accounts(
    State(db): State<Db>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, Failure> {
    let page_number = page_param(&params, "page[number]")?.unwrap_or(0);
    let page_size = page_param(&params, "page[size]")?.unwrap_or(DEFAULT_PAGE_SIZE);

    let accounts = db.accounts.read().await;
    let page: Vec<&AccountData> = accounts
        .iter()
        .skip(page_number.saturating_mul(page_size))
        .take(page_size)
        .collect();
    Ok(Json(json!({
        "data": page,
        "links": { "self": ACCOUNTS_PATH },
    })))
}

fn page_param(params: &HashMap<String, String>, key: &str) -> Result<Option<usize>, Failure> {
    params
        .get(key)
        .map(|raw| {
            raw.parse().map_err(|_| {
                Failure::new(StatusCode::BAD_REQUEST, format!("invalid {key}: {raw}"))
            })
        })
        .transpose()
}

async fn create_account(
    State(db): State<Db>,
    Json(input): Json<Account>,
) -> Result<(StatusCode, Json<Value>), Failure> {
    let data = input.data;
    if Uuid::parse_str(&data.id).is_err() {
        return Err(Failure::new(
            StatusCode::BAD_REQUEST,
            format!("id in body must be a valid uuid: {}", data.id),
        ));
    }

    let mut accounts = db.accounts.write().await;
    if accounts.iter().any(|existing| existing.id == data.id) {
        return Err(Failure::new(
            StatusCode::CONFLICT,
            "Account cannot be created as it violates a duplicate constraint",
        ));
    }
    info!(id = %data.id, "account created");
    let links = self_link(&data.id);
    accounts.push(data.clone());
    Ok((StatusCode::CREATED, Json(json!({ "data": data, "links": links }))))
}

async fn fetch_account(
    State(db): State<Db>,
    Path(id): Path<String>,
) -> Result<Json<Value>, Failure> {
    let accounts = db.accounts.read().await;
    let data = accounts
        .iter()
        .find(|account| account.id == id)
        .ok_or_else(|| not_found(&id))?;
    Ok(Json(json!({ "data": data, "links": self_link(&id) })))
}

async fn delete_account(
    State(db): State<Db>,
    Path(id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<StatusCode, Failure> {
    let version = params
        .version
        .ok_or_else(|| Failure::new(StatusCode::BAD_REQUEST, "version is required"))?;

    let mut accounts = db.accounts.write().await;
    let index = accounts
        .iter()
        .position(|account| account.id == id)
        .ok_or_else(|| not_found(&id))?;
    if accounts[index].version != version {
        return Err(Failure::new(StatusCode::CONFLICT, "invalid version"));
    }
    accounts.remove(index);
    info!(%id, version, "account deleted");
    Ok(StatusCode::OK)
}

fn not_found(id: &str) -> Failure {
    Failure::new(StatusCode::NOT_FOUND, format!("record {id} does not exist"))
}
