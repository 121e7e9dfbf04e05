//! REST API handlers for blueprint and factory management.
//!
//! Error mapping: validation → 400, not found → 404, conflict → 409,
//! storage failures → 500. Batch upgrades always return 200 with
//! per-factory entries; partial failure is data, not an error status.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use forgeline_binding::BindingError;
use forgeline_rollout::{BatchOptions, RolloutError};
use forgeline_state::{FactoryId, UpdatePolicy};
use forgeline_version::VersionError;

use crate::ApiState;

/// Response wrapper for API endpoints.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn api_error(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn version_error(err: VersionError) -> axum::response::Response {
    let status = match &err {
        VersionError::Validation(_) => StatusCode::BAD_REQUEST,
        VersionError::NotFound(_) => StatusCode::NOT_FOUND,
        VersionError::Conflict(_) => StatusCode::CONFLICT,
        VersionError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(&err.to_string(), status)
}

fn binding_error(err: BindingError) -> axum::response::Response {
    let status = match &err {
        BindingError::Validation(_) => StatusCode::BAD_REQUEST,
        BindingError::NotFound(_) => StatusCode::NOT_FOUND,
        BindingError::Conflict(_) => StatusCode::CONFLICT,
        BindingError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(&err.to_string(), status)
}

fn rollout_error(err: RolloutError) -> axum::response::Response {
    let status = match &err {
        RolloutError::Validation(_) => StatusCode::BAD_REQUEST,
        RolloutError::NotFound(_) => StatusCode::NOT_FOUND,
        RolloutError::Conflict(_) => StatusCode::CONFLICT,
        RolloutError::State(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(&err.to_string(), status)
}

// ── Versions ──────────────────────────────────────────────────────

/// GET /api/v1/blueprints/:id/versions
pub async fn list_versions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.versions.version_history(&id) {
        Ok(history) => ApiResponse::ok(history).into_response(),
        Err(e) => version_error(e),
    }
}

/// GET /api/v1/blueprints/:id/versions/latest
pub async fn latest_version(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.versions.latest_version(&id) {
        Ok(latest) => ApiResponse::ok(latest).into_response(),
        Err(e) => version_error(e),
    }
}

/// Request body to create a draft version.
#[derive(serde::Deserialize)]
pub struct CreateDraftRequest {
    pub description: String,
}

/// POST /api/v1/blueprints/:id/versions
pub async fn create_draft(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CreateDraftRequest>,
) -> impl IntoResponse {
    match state.versions.create_draft(&id, &req.description) {
        Ok(draft) => (StatusCode::CREATED, ApiResponse::ok(draft)).into_response(),
        Err(e) => version_error(e),
    }
}

/// Request body to publish a draft.
#[derive(serde::Deserialize)]
pub struct PublishRequest {
    pub version: u32,
    pub release_notes: String,
    /// Emit a publish event for auto-upgrade evaluation. Defaults to true.
    #[serde(default = "default_notify")]
    pub notify: bool,
}

fn default_notify() -> bool {
    true
}

/// POST /api/v1/blueprints/:id/publish
pub async fn publish_version(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> impl IntoResponse {
    match state
        .versions
        .publish(&id, req.version, &req.release_notes, req.notify)
    {
        Ok(published) => ApiResponse::ok(published).into_response(),
        Err(e) => version_error(e),
    }
}

/// Query parameters for version comparison.
#[derive(serde::Deserialize)]
pub struct CompareQuery {
    pub from: u32,
    pub to: u32,
}

/// GET /api/v1/blueprints/:id/compare?from=&to=
pub async fn compare_versions(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<CompareQuery>,
) -> impl IntoResponse {
    match state.comparator.compare(&id, query.from, query.to) {
        Ok(summary) => ApiResponse::ok(summary).into_response(),
        Err(e) => version_error(e),
    }
}

// ── Factories ─────────────────────────────────────────────────────

/// GET /api/v1/blueprints/:id/factories
pub async fn list_factories(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.bindings_for(&id) {
        Ok(bindings) => ApiResponse::ok(bindings).into_response(),
        Err(e) => binding_error(e),
    }
}

/// GET /api/v1/blueprints/:id/factories/outdated
pub async fn outdated_factories(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.outdated_for(&id) {
        Ok(bindings) => ApiResponse::ok(bindings).into_response(),
        Err(e) => binding_error(e),
    }
}

/// Request body to bind a factory to a blueprint.
#[derive(serde::Deserialize)]
pub struct BindRequest {
    pub factory_id: String,
    pub blueprint_id: String,
    /// Version to adopt; defaults to the latest published version.
    pub version: Option<u32>,
}

/// POST /api/v1/factories/bind
pub async fn bind_factory(
    State(state): State<ApiState>,
    Json(req): Json<BindRequest>,
) -> impl IntoResponse {
    match state
        .registry
        .bind(&req.factory_id, &req.blueprint_id, req.version)
    {
        Ok(binding) => (StatusCode::CREATED, ApiResponse::ok(binding)).into_response(),
        Err(e) => binding_error(e),
    }
}

/// Request body for a batch upgrade.
#[derive(serde::Deserialize)]
pub struct BatchUpgradeRequest {
    pub factory_ids: Vec<FactoryId>,
    #[serde(default)]
    pub force: bool,
}

/// POST /api/v1/factories/upgrade
///
/// Always 200: per-factory failures are entries in the result list.
pub async fn batch_upgrade(
    State(state): State<ApiState>,
    Json(req): Json<BatchUpgradeRequest>,
) -> impl IntoResponse {
    let results = state
        .orchestrator
        .batch_upgrade(&req.factory_ids, BatchOptions { force: req.force })
        .await;
    ApiResponse::ok(results).into_response()
}

/// Request body for a rollback.
#[derive(serde::Deserialize)]
pub struct RollbackRequest {
    pub target_version: u32,
    pub reason: String,
}

/// POST /api/v1/factories/:id/rollback
pub async fn rollback_factory(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<RollbackRequest>,
) -> impl IntoResponse {
    match state
        .rollback
        .rollback(&id, req.target_version, &req.reason)
        .await
    {
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => rollout_error(e),
    }
}

/// Request body to update binding settings.
///
/// The policy arrives as a string so unrecognized values surface as a
/// 400 with a clear message rather than a generic decode failure.
#[derive(serde::Deserialize)]
pub struct SettingsRequest {
    pub auto_update: bool,
    pub update_policy: String,
}

fn parse_policy(raw: &str) -> Option<UpdatePolicy> {
    match raw {
        "manual" => Some(UpdatePolicy::Manual),
        "auto_minor" => Some(UpdatePolicy::AutoMinor),
        "auto_all" => Some(UpdatePolicy::AutoAll),
        _ => None,
    }
}

/// PUT /api/v1/factories/:id/settings
pub async fn update_settings(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<SettingsRequest>,
) -> impl IntoResponse {
    let Some(policy) = parse_policy(&req.update_policy) else {
        return api_error(
            &format!("unknown update policy: {}", req.update_policy),
            StatusCode::BAD_REQUEST,
        );
    };
    match state.registry.update_settings(&id, req.auto_update, policy) {
        Ok(binding) => ApiResponse::ok(binding).into_response(),
        Err(e) => binding_error(e),
    }
}

// ── Audit ─────────────────────────────────────────────────────────

/// Query parameters for the audit listing.
#[derive(serde::Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: usize,
}

fn default_audit_limit() -> usize {
    50
}

/// GET /api/v1/audit?limit=
pub async fn list_audit(
    State(state): State<ApiState>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    match state.store.list_audit(query.limit) {
        Ok(entries) => ApiResponse::ok(entries).into_response(),
        Err(e) => api_error(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_binding::BindingRegistry;
    use forgeline_rollout::{BindingLocks, RollbackManager, RolloutOrchestrator};
    use forgeline_state::StateStore;
    use forgeline_version::{VersionComparator, VersionStore};

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        let versions = VersionStore::new(store.clone());
        let comparator = VersionComparator::new(store.clone());
        let registry = BindingRegistry::new(store.clone());
        let locks = BindingLocks::new();
        let orchestrator =
            RolloutOrchestrator::new(store.clone(), registry.clone(), locks.clone());
        let rollback = RollbackManager::new(store.clone(), registry.clone(), locks);
        ApiState {
            store,
            versions,
            comparator,
            registry,
            orchestrator,
            rollback,
        }
    }

    fn seed_published(state: &ApiState, blueprint_id: &str, upto: u32) {
        for version in 1..=upto {
            state.versions.create_draft(blueprint_id, "rev").unwrap();
            state
                .versions
                .publish(blueprint_id, version, "notes", false)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn draft_then_publish_flow() {
        let state = test_state();

        let resp = create_draft(
            State(state.clone()),
            Path("bp1".to_string()),
            Json(CreateDraftRequest {
                description: "initial".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = publish_version(
            State(state.clone()),
            Path("bp1".to_string()),
            Json(PublishRequest {
                version: 1,
                release_notes: "first".to_string(),
                notify: false,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        // Re-publish conflicts.
        let resp = publish_version(
            State(state),
            Path("bp1".to_string()),
            Json(PublishRequest {
                version: 1,
                release_notes: "again".to_string(),
                notify: false,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn publish_empty_notes_bad_request() {
        let state = test_state();
        state.versions.create_draft("bp1", "initial").unwrap();

        let resp = publish_version(
            State(state),
            Path("bp1".to_string()),
            Json(PublishRequest {
                version: 1,
                release_notes: "".to_string(),
                notify: false,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn latest_version_missing_blueprint() {
        let state = test_state();
        let resp = latest_version(State(state), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn compare_missing_version_not_found() {
        let state = test_state();
        seed_published(&state, "bp1", 1);

        let resp = compare_versions(
            State(state),
            Path("bp1".to_string()),
            Query(CompareQuery { from: 1, to: 9 }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn bind_and_batch_upgrade() {
        let state = test_state();
        seed_published(&state, "bp1", 1);

        let resp = bind_factory(
            State(state.clone()),
            Json(BindRequest {
                factory_id: "f1".to_string(),
                blueprint_id: "bp1".to_string(),
                version: None,
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        state.versions.create_draft("bp1", "rev").unwrap();
        state.versions.publish("bp1", 2, "notes", false).unwrap();

        let resp = batch_upgrade(
            State(state.clone()),
            Json(BatchUpgradeRequest {
                factory_ids: vec!["f1".to_string(), "ghost".to_string()],
                force: false,
            }),
        )
        .await
        .into_response();
        // Partial failure is still 200.
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.registry.binding("f1").unwrap().applied_version, 2);
    }

    #[tokio::test]
    async fn rollback_conflict_maps_to_409() {
        let state = test_state();
        seed_published(&state, "bp1", 1);
        state.registry.bind("f1", "bp1", Some(1)).unwrap();

        let resp = rollback_factory(
            State(state),
            Path("f1".to_string()),
            Json(RollbackRequest {
                target_version: 1,
                reason: "not earlier".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_policy_rejected() {
        let state = test_state();
        seed_published(&state, "bp1", 1);
        state.registry.bind("f1", "bp1", None).unwrap();

        let resp = update_settings(
            State(state.clone()),
            Path("f1".to_string()),
            Json(SettingsRequest {
                auto_update: true,
                update_policy: "yolo".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = update_settings(
            State(state),
            Path("f1".to_string()),
            Json(SettingsRequest {
                auto_update: true,
                update_policy: "auto_minor".to_string(),
            }),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn audit_listing() {
        let state = test_state();
        seed_published(&state, "bp1", 2);

        let resp = list_audit(State(state), Query(AuditQuery { limit: 10 }))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
