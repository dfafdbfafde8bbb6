use crate::config::Config;
use crate::cpf::is_valid_cpf_value;
use crate::db_storage::{AddressStorage, UserStorage};
use crate::errors::{AppError, ResultExt};
use crate::metrics::Metrics;
use crate::models::*;
use crate::services::ViaCepService;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: PgPool,
    /// Application configuration.
    pub config: Config,
    /// Prometheus registry and metric families.
    pub metrics: Arc<Metrics>,
    /// Postal-code lookup used to enrich addresses.
    pub cep_service: ViaCepService,
}

impl AppState {
    fn users(&self) -> UserStorage {
        UserStorage::new(self.db.clone(), self.metrics.clone())
    }

    fn addresses(&self) -> AddressStorage {
        AddressStorage::new(self.db.clone(), self.metrics.clone())
    }
}

/// Keys under which a CPF may arrive.
const CPF_KEYS: [&str; 2] = ["cpf", "taxId"];

fn cpf_field(body: &Value) -> Option<&Value> {
    CPF_KEYS.iter().find_map(|key| body.get(*key))
}

fn parse_body<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn invalid_tax_id() -> AppError {
    AppError::BadRequest("invalid tax id".to_string())
}

fn user_not_found() -> AppError {
    AppError::NotFound("user not found".to_string())
}

fn address_not_found() -> AppError {
    AppError::NotFound("address not found for this user".to_string())
}

/// GET /
///
/// Liveness probe.
pub async fn root() -> &'static str {
    "API Operacional"
}

/// GET /metrics
///
/// Prometheus text exposition of the request and storage counters.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .encode()
        .map_err(|e| AppError::InternalError(format!("Failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "application/openmetrics-text; version=1.0.0; charset=utf-8",
        )],
        body,
    ))
}

/// POST /api/usuarios
///
/// Creates a user after validating the CPF check digits.
///
/// # Returns
///
/// * `201` with the stored user.
/// * `400` for an invalid CPF or malformed fields.
/// * `409` when the CPF or email already exists.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let Json(body) = payload?;

    if !cpf_field(&body).is_some_and(is_valid_cpf_value) {
        return Err(invalid_tax_id());
    }

    let new_user = parse_body::<NewUser>(body)?.validated()?;
    tracing::info!("POST /usuarios");

    let user = state.users().create(&new_user).await?;
    tracing::info!("User {} created", user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

/// GET /api/usuarios
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>, AppError> {
    let users = state.users().list().await?;
    Ok(Json(users))
}

/// PUT /api/usuarios/:id
///
/// Partial update: only the supplied fields change. An empty body or an
/// unknown field is a 400.
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Path(id) = id?;
    let Json(body) = payload?;
    tracing::info!("PUT /usuarios/{}", id);

    if let Some(cpf) = cpf_field(&body).filter(|v| !v.is_null()) {
        if !is_valid_cpf_value(cpf) {
            return Err(invalid_tax_id());
        }
    }

    let changes = parse_body::<UserChanges>(body)?.validated()?;

    let user = state
        .users()
        .update(id, &changes)
        .await?
        .ok_or_else(user_not_found)?;

    Ok(Json(user))
}

/// DELETE /api/usuarios/:id
///
/// Removes the user and, through the foreign key, all of its addresses.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    id: Result<Path<i32>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id?;
    tracing::info!("DELETE /usuarios/{}", id);

    if state.users().delete(id).await? == 0 {
        return Err(user_not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/usuarios/:id/enderecos
///
/// Creates an address from `cep` + `numero`; street, neighborhood, city and
/// state come from ViaCEP.
///
/// # Returns
///
/// * `201` with the stored address.
/// * `400` when `cep` or `numero` is missing.
/// * `404` when the user or the postal code does not exist.
pub async fn create_address(
    State(state): State<Arc<AppState>>,
    usuario_id: Result<Path<i32>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Address>), AppError> {
    let Path(usuario_id) = usuario_id?;
    let Json(body) = payload?;
    let input = parse_body::<AddressRequest>(body)?.validated()?;
    tracing::info!("POST /usuarios/{}/enderecos - cep: {}", usuario_id, input.cep);

    if !state.users().exists(usuario_id).await? {
        return Err(user_not_found());
    }

    let postal = state
        .cep_service
        .lookup(&input.cep)
        .await
        .with_context(|| format!("enriching new address of user {}", usuario_id))?;
    let address = state
        .addresses()
        .create(usuario_id, &NewAddress::merge(input, postal))
        .await?;

    Ok((StatusCode::CREATED, Json(address)))
}

/// GET /api/usuarios/:id/enderecos
///
/// A user without addresses yields 404 rather than an empty list.
pub async fn list_addresses(
    State(state): State<Arc<AppState>>,
    usuario_id: Result<Path<i32>, PathRejection>,
) -> Result<Json<Vec<Address>>, AppError> {
    let Path(usuario_id) = usuario_id?;
    let addresses = state.addresses().list(usuario_id).await?;

    if addresses.is_empty() {
        return Err(AppError::NotFound(
            "no addresses found for this user".to_string(),
        ));
    }

    Ok(Json(addresses))
}

/// PUT /api/usuarios/:id/enderecos/:endereco_id
///
/// Re-runs the postal lookup and replaces the address fields.
pub async fn update_address(
    State(state): State<Arc<AppState>>,
    ids: Result<Path<(i32, i32)>, PathRejection>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Address>, AppError> {
    let Path((usuario_id, endereco_id)) = ids?;
    let Json(body) = payload?;
    let input = parse_body::<AddressRequest>(body)?.validated()?;
    tracing::info!(
        "PUT /usuarios/{}/enderecos/{} - cep: {}",
        usuario_id,
        endereco_id,
        input.cep
    );

    let addresses = state.addresses();
    if addresses.find(usuario_id, endereco_id).await?.is_none() {
        return Err(address_not_found());
    }

    let postal = state
        .cep_service
        .lookup(&input.cep)
        .await
        .with_context(|| format!("enriching address {} of user {}", endereco_id, usuario_id))?;
    let address = addresses
        .update(usuario_id, endereco_id, &NewAddress::merge(input, postal))
        .await?
        .ok_or_else(address_not_found)?;

    Ok(Json(address))
}

/// DELETE /api/usuarios/:id/enderecos/:endereco_id
pub async fn delete_address(
    State(state): State<Arc<AppState>>,
    ids: Result<Path<(i32, i32)>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path((usuario_id, endereco_id)) = ids?;
    tracing::info!("DELETE /usuarios/{}/enderecos/{}", usuario_id, endereco_id);

    if state.addresses().delete(usuario_id, endereco_id).await? == 0 {
        return Err(address_not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}
