use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::jwt::JwtConfig;
use crate::routes::{auth, catalog, health, requests, roles, sites, users, workflows};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config);

    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let role_routes = Router::new()
        .route("/", get(roles::list_roles))
        .route("/", post(roles::create_role))
        .route("/:id", get(roles::get_role))
        .route("/:id", put(roles::update_role))
        .route("/:id", delete(roles::delete_role))
        .route("/:id/clone", post(roles::clone_role));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/", post(users::create_user))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id/roles", get(users::list_user_roles))
        .route("/:id/roles", post(users::replace_user_roles))
        .route("/:id/access", put(users::replace_user_access));

    // Areas nest under their site for list/create; item-level operations
    // address the area directly.
    let site_routes = Router::new()
        .route("/", get(sites::list_sites))
        .route("/", post(sites::create_site))
        .route("/:id", put(sites::update_site))
        .route("/:id", delete(sites::delete_site))
        .route("/:id/areas", get(sites::list_areas))
        .route("/:id/areas", post(sites::create_area));

    let area_routes = Router::new()
        .route("/:id", put(sites::update_area))
        .route("/:id", delete(sites::delete_area));

    let category_routes = Router::new()
        .route("/", get(catalog::list_categories))
        .route("/", post(catalog::create_category))
        .route("/:id", delete(catalog::delete_category));

    let item_routes = Router::new()
        .route("/", get(catalog::list_items))
        .route("/", post(catalog::create_item))
        .route("/:id", put(catalog::update_item))
        .route("/:id", delete(catalog::delete_item));

    let workflow_routes = Router::new()
        .route("/", get(workflows::list_workflows))
        .route("/", post(workflows::create_workflow))
        .route("/:id", get(workflows::get_workflow))
        .route("/:id", put(workflows::update_workflow))
        .route("/:id", delete(workflows::delete_workflow))
        .route("/:id/activate", patch(workflows::activate_workflow))
        .route("/:id/duplicate", post(workflows::duplicate_workflow));

    let request_routes = Router::new()
        .route("/", get(requests::list_requests))
        .route("/", post(requests::create_request))
        .route("/:id", get(requests::get_request))
        .route("/:id/approve", post(requests::approve_request))
        .route("/:id/reject", post(requests::reject_request))
        .route("/:id/fulfill", post(requests::fulfill_request));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/permissions", get(roles::list_permissions))
        .nest("/auth", auth_routes)
        .nest("/roles", role_routes)
        .nest("/end-users", user_routes)
        .nest("/sites", site_routes)
        .nest("/areas", area_routes)
        .nest("/categories", category_routes)
        .nest("/items", item_routes)
        .nest("/workflows", workflow_routes)
        .nest("/requests", request_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
