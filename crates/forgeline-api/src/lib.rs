//! forgeline-api — REST API for Forgeline.
//!
//! Provides axum route handlers for blueprint version management and
//! factory rollout operations. Confirmation flows live entirely in the
//! caller; every operation here is direct and already validated.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/blueprints/{id}/versions` | Version history |
//! | POST | `/api/v1/blueprints/{id}/versions` | Create a draft |
//! | GET | `/api/v1/blueprints/{id}/versions/latest` | Latest published version |
//! | POST | `/api/v1/blueprints/{id}/publish` | Publish a draft |
//! | GET | `/api/v1/blueprints/{id}/compare` | Diff two versions |
//! | GET | `/api/v1/blueprints/{id}/factories` | Bound factories |
//! | GET | `/api/v1/blueprints/{id}/factories/outdated` | Outdated factories |
//! | POST | `/api/v1/factories/bind` | Bind a factory |
//! | POST | `/api/v1/factories/upgrade` | Batch upgrade |
//! | POST | `/api/v1/factories/{id}/rollback` | Roll back one factory |
//! | PUT | `/api/v1/factories/{id}/settings` | Update binding settings |
//! | GET | `/api/v1/audit` | Recent audit entries |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post, put};

use forgeline_binding::BindingRegistry;
use forgeline_rollout::{RollbackManager, RolloutOrchestrator};
use forgeline_state::StateStore;
use forgeline_version::{VersionComparator, VersionStore};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub versions: VersionStore,
    pub comparator: VersionComparator,
    pub registry: BindingRegistry,
    pub orchestrator: RolloutOrchestrator,
    pub rollback: RollbackManager,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/blueprints/{id}/versions",
            get(handlers::list_versions).post(handlers::create_draft),
        )
        .route("/blueprints/{id}/versions/latest", get(handlers::latest_version))
        .route("/blueprints/{id}/publish", post(handlers::publish_version))
        .route("/blueprints/{id}/compare", get(handlers::compare_versions))
        .route("/blueprints/{id}/factories", get(handlers::list_factories))
        .route(
            "/blueprints/{id}/factories/outdated",
            get(handlers::outdated_factories),
        )
        .route("/factories/bind", post(handlers::bind_factory))
        .route("/factories/upgrade", post(handlers::batch_upgrade))
        .route("/factories/{id}/rollback", post(handlers::rollback_factory))
        .route("/factories/{id}/settings", put(handlers::update_settings))
        .route("/audit", get(handlers::list_audit))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
