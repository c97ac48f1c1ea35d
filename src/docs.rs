use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health,
        routes::auth::register,
        routes::auth::login,
        routes::auth::me,
        routes::auth::logout,
        routes::roles::list_roles,
        routes::roles::create_role,
        routes::roles::get_role,
        routes::roles::update_role,
        routes::roles::delete_role,
        routes::roles::clone_role,
        routes::roles::list_permissions,
        routes::users::list_users,
        routes::users::create_user,
        routes::users::get_user,
        routes::users::update_user,
        routes::users::list_user_roles,
        routes::users::replace_user_roles,
        routes::users::replace_user_access,
        routes::sites::list_sites,
        routes::sites::create_site,
        routes::sites::update_site,
        routes::sites::delete_site,
        routes::sites::list_areas,
        routes::sites::create_area,
        routes::sites::update_area,
        routes::sites::delete_area,
        routes::catalog::list_categories,
        routes::catalog::create_category,
        routes::catalog::delete_category,
        routes::catalog::list_items,
        routes::catalog::create_item,
        routes::catalog::update_item,
        routes::catalog::delete_item,
        routes::workflows::list_workflows,
        routes::workflows::create_workflow,
        routes::workflows::get_workflow,
        routes::workflows::update_workflow,
        routes::workflows::activate_workflow,
        routes::workflows::duplicate_workflow,
        routes::workflows::delete_workflow,
        routes::requests::list_requests,
        routes::requests::create_request,
        routes::requests::get_request,
        routes::requests::approve_request,
        routes::requests::reject_request,
        routes::requests::fulfill_request
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            models::user::User,
            models::user::UserDetail,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::UserCreateRequest,
            models::user::UserUpdateRequest,
            models::user::RoleAssignmentEntry,
            models::user::ReplaceAssignmentsRequest,
            models::user::ReplaceAccessRequest,
            models::role::Role,
            models::role::RoleScope,
            models::role::RoleCreateRequest,
            models::role::RoleUpdateRequest,
            models::role::RoleCloneRequest,
            models::role::PermissionInfo,
            models::role::PermissionGroup,
            models::site::Site,
            models::site::SiteCreateRequest,
            models::site::SiteUpdateRequest,
            models::site::Area,
            models::site::AreaCreateRequest,
            models::site::AreaUpdateRequest,
            models::catalog::Category,
            models::catalog::CategoryCreateRequest,
            models::catalog::CatalogItem,
            models::catalog::CatalogItemCreateRequest,
            models::catalog::CatalogItemUpdateRequest,
            models::workflow::ApprovalWorkflow,
            models::workflow::ApprovalLevel,
            models::workflow::LevelInput,
            models::workflow::WorkflowCreateRequest,
            models::workflow::WorkflowUpdateRequest,
            models::workflow::WorkflowDuplicateRequest,
            models::request::PurchaseRequest,
            models::request::Priority,
            models::request::RequestItem,
            models::request::ApprovalLevelInstance,
            models::request::RequestItemInput,
            models::request::RequestCreateRequest,
            models::request::ApproveBody,
            models::request::RejectBody,
            crate::workflow::RequestStatus,
            crate::workflow::LevelStatus
        )
    ),
    tags(
        (name = "Health", description = "Liveness and database checks"),
        (name = "Auth", description = "Registration, login, session"),
        (name = "Roles", description = "Roles and the permission catalog"),
        (name = "End users", description = "Staff accounts, role assignments, access grants"),
        (name = "Sites", description = "Sites and their areas"),
        (name = "Catalog", description = "Categories and catalog items"),
        (name = "Workflows", description = "Approval workflow templates"),
        (name = "Requests", description = "Purchase requests and approvals")
    )
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
    let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

    ensure_security_components(&mut doc);
    ensure_global_security(&mut doc);
    ensure_servers(&mut doc, port);

    Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .with_credentials(true)
        .persist_authorization(true);

    let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

    let json_route = {
        let doc_json = Arc::clone(&doc_json);
        get(move || {
            let doc_json = Arc::clone(&doc_json);
            async move { Json((*doc_json).clone()) }
        })
    };

    Router::new()
        .route("/api-docs/openapi.json", json_route)
        .merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut Value) {
    let components = doc
        .as_object_mut()
        .expect("OpenAPI root must be an object")
        .entry("components")
        .or_insert_with(|| json!({}));

    if let Some(components) = components.as_object_mut() {
        let schemes = components
            .entry("securitySchemes")
            .or_insert_with(|| json!({}));
        if let Some(schemes) = schemes.as_object_mut() {
            schemes.insert(
                "bearerAuth".to_string(),
                json!({
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT"
                }),
            );
        }
    }
}

fn ensure_global_security(doc: &mut Value) {
    // Register/login stay open via their operation-level (absent) security.
    if doc.get("security").is_none() {
        doc["security"] = json!([{"bearerAuth": []}]);
    }
}

fn ensure_servers(doc: &mut Value, port: u16) {
    if doc.get("servers").is_none() {
        doc["servers"] = json!([
            { "url": format!("http://localhost:{}", port) }
        ]);
    }
}
