use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

fn active_count(workflows: &Value) -> usize {
    workflows
        .as_array()
        .map(|w| {
            w.iter()
                .filter(|wf| wf["is_active"] == true && wf["trigger_type"] == "request_submitted")
                .count()
        })
        .unwrap_or(0)
}

/// Exactly one workflow per trigger type is active, whichever one was
/// activated last; the seeded default cannot be edited or deleted.
#[tokio::test]
async fn workflow_activation_and_default_protection() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Eastgate Supply", "eva").await?;

    let (status, workflows) = harness.send("GET", "/workflows", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workflows.as_array().map(Vec::len), Some(1));
    let default = &workflows[0];
    assert_eq!(default["is_default"], true);
    assert_eq!(default["is_active"], true);
    assert_eq!(default["levels"].as_array().map(Vec::len), Some(1));
    let default_id = default["id"].as_str().unwrap().to_string();

    let (status, _) = harness
        .send(
            "PUT",
            &format!("/workflows/{}", default_id),
            Some(&admin),
            Some(json!({ "name": "Renamed" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .send("DELETE", &format!("/workflows/{}", default_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A second workflow starts inactive and takes over only on activation.
    let manager_role = harness.role_id(&admin, "Manager").await?;
    let (status, second) = harness
        .send(
            "POST",
            "/workflows",
            Some(&admin),
            Some(json!({
                "name": "Double sign-off",
                "levels": [{ "role_id": manager_role }, { "role_id": manager_role }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["is_active"], false);
    assert_eq!(second["is_default"], false);
    let second_id = common::id_of(&second)?;

    let (status, workflows) = harness.send("GET", "/workflows", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active_count(&workflows), 1);

    let (status, second) = harness
        .send("PATCH", &format!("/workflows/{}/activate", second_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["is_active"], true);

    let (status, workflows) = harness.send("GET", "/workflows", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active_count(&workflows), 1);

    // Reactivating the default flips it back, still exactly one active.
    let (status, default) = harness
        .send("PATCH", &format!("/workflows/{}/activate", default_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(default["is_active"], true);

    let (status, workflows) = harness.send("GET", "/workflows", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active_count(&workflows), 1);

    // Duplicates copy the levels but never the active/default flags.
    let (status, copy) = harness
        .send(
            "POST",
            &format!("/workflows/{}/duplicate", second_id),
            Some(&admin),
            Some(json!({ "name": "Double sign-off (copy)" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(copy["is_active"], false);
    assert_eq!(copy["is_default"], false);
    assert_eq!(copy["levels"].as_array().map(Vec::len), Some(2));
    assert_eq!(copy["version"], 1);

    // Level updates bump the version.
    let (status, second) = harness
        .send(
            "PUT",
            &format!("/workflows/{}", second_id),
            Some(&admin),
            Some(json!({ "name": "Double sign-off v2" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["version"], 2);

    // A workflow without levels is rejected up front.
    let (status, body) = harness
        .send(
            "POST",
            "/workflows",
            Some(&admin),
            Some(json!({ "name": "Empty", "levels": [] })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("validation_error"));

    Ok(())
}

/// Roles: system roles are read-only, deletion requires zero assignments,
/// clones copy the permission set.
#[tokio::test]
async fn role_lifecycle() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Foxtrot Goods", "fern").await?;

    // The permission catalog is grouped by category.
    let (status, groups) = harness.send("GET", "/permissions", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    let requests_group = groups
        .as_array()
        .and_then(|g| g.iter().find(|group| group["category"] == "requests"))
        .expect("requests group missing");
    assert!(requests_group["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .any(|p| p["full_name"] == "requests.create_requests"));

    let manager_role = harness.role_id(&admin, "Manager").await?;
    let (status, _) = harness
        .send(
            "PUT",
            &format!("/roles/{}", manager_role),
            Some(&admin),
            Some(json!({ "name": "Hacked" })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = harness
        .send("DELETE", &format!("/roles/{}", manager_role), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, auditor) = harness
        .send(
            "POST",
            "/roles",
            Some(&admin),
            Some(json!({
                "name": "Auditor",
                "scope": "organization",
                "permissions": ["requests.view_requests", "workflows.view_workflows"]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let auditor_id = common::id_of(&auditor)?;

    // An unknown permission name never creates a role.
    let (status, body) = harness
        .send(
            "POST",
            "/roles",
            Some(&admin),
            Some(json!({
                "name": "Broken",
                "scope": "organization",
                "permissions": ["requests.frobnicate"]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("validation_error"));

    let (status, clone) = harness
        .send(
            "POST",
            &format!("/roles/{}/clone", auditor_id),
            Some(&admin),
            Some(json!({ "name": "Auditor (copy)" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(clone["is_system"], false);
    assert_eq!(clone["permissions"], auditor["permissions"]);

    // Assignment blocks deletion until it is withdrawn.
    let user_id = harness.create_user(&admin, "uri").await?;
    let (status, _) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({ "assignments": [{ "role_id": auditor_id }] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .send("DELETE", &format!("/roles/{}", auditor_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(common::error_code(&body), Some("conflict"));

    let (status, _) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({ "assignments": [] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .send("DELETE", &format!("/roles/{}", auditor_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

/// Deletes of rows other records point at come back as structured 409
/// conflicts, never as raw database errors.
#[tokio::test]
async fn referenced_resources_cannot_be_deleted() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Harbor Supplies", "hana").await?;

    let (status, site) = harness
        .send("POST", "/sites", Some(&admin), Some(json!({ "name": "Pier 4" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let site_id = common::id_of(&site)?;

    let (status, area) = harness
        .send(
            "POST",
            &format!("/sites/{}/areas", site_id),
            Some(&admin),
            Some(json!({ "name": "Dock A" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let area_id = common::id_of(&area)?;

    let (status, category) = harness
        .send("POST", "/categories", Some(&admin), Some(json!({ "name": "Rigging" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, item) = harness
        .send(
            "POST",
            "/items",
            Some(&admin),
            Some(json!({
                "category_id": common::id_of(&category)?,
                "name": "Rope",
                "cost_per_unit": 9.5
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = common::id_of(&item)?;

    let (status, _) = harness
        .send(
            "POST",
            "/requests",
            Some(&admin),
            Some(json!({
                "site_id": site_id,
                "area_id": area_id,
                "items": [{ "catalog_item_id": item_id, "quantity": 2 }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    // The request snapshot pins the item, the area, and the site.
    for uri in [
        format!("/items/{}", item_id),
        format!("/areas/{}", area_id),
        format!("/sites/{}", site_id),
    ] {
        let (status, body) = harness.send("DELETE", &uri, Some(&admin), None).await?;
        assert_eq!(status, StatusCode::CONFLICT, "{} should conflict", uri);
        assert_eq!(common::error_code(&body), Some("conflict"));
    }

    // A role bound to a workflow level blocks deletion even with zero
    // assignments; unbinding it frees the role.
    let (status, gatekeeper) = harness
        .send(
            "POST",
            "/roles",
            Some(&admin),
            Some(json!({
                "name": "Gatekeeper",
                "scope": "site",
                "permissions": ["requests.approve_requests"]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let gatekeeper_id = common::id_of(&gatekeeper)?;

    let (status, gate_flow) = harness
        .send(
            "POST",
            "/workflows",
            Some(&admin),
            Some(json!({
                "name": "Gate check",
                "levels": [{ "role_id": gatekeeper_id }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let gate_flow_id = common::id_of(&gate_flow)?;

    let (status, body) = harness
        .send("DELETE", &format!("/roles/{}", gatekeeper_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(common::error_code(&body), Some("conflict"));

    let (status, _) = harness
        .send("DELETE", &format!("/workflows/{}", gate_flow_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = harness
        .send("DELETE", &format!("/roles/{}", gatekeeper_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

/// The assignment matrix: a site-level grant implies every area, stored
/// triples come back normalized, and a cell with both site and area is
/// invalid.
#[tokio::test]
async fn assignment_matrix_normalization() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Granite Partners", "gus").await?;

    let (status, site) = harness
        .send("POST", "/sites", Some(&admin), Some(json!({ "name": "Campus" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let site_id = common::id_of(&site)?;

    let mut area_ids = Vec::new();
    for name in ["East Wing", "West Wing"] {
        let (status, area) = harness
            .send(
                "POST",
                &format!("/sites/{}/areas", site_id),
                Some(&admin),
                Some(json!({ "name": name })),
            )
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        area_ids.push(common::id_of(&area)?);
    }

    let manager_role = harness.role_id(&admin, "Manager").await?;
    let user_id = harness.create_user(&admin, "vera").await?;

    let (status, body) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({
                "assignments": [{ "role_id": manager_role, "site_id": site_id, "area_id": area_ids[0] }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(common::error_code(&body), Some("validation_error"));

    // A site cell cascades into its areas on save.
    let (status, entries) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({
                "assignments": [{ "role_id": manager_role, "site_id": site_id }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().any(|e| e["site_id"] == site_id.as_str()));
    for area_id in &area_ids {
        assert!(entries.iter().any(|e| e["area_id"] == area_id.as_str()));
    }

    // All areas checked individually promotes the site cell.
    let (status, entries) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({
                "assignments": [
                    { "role_id": manager_role, "area_id": area_ids[0] },
                    { "role_id": manager_role, "area_id": area_ids[1] }
                ]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().any(|e| e["site_id"] == site_id.as_str()));

    // A single area stays a single area.
    let (status, entries) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", user_id),
            Some(&admin),
            Some(json!({
                "assignments": [{ "role_id": manager_role, "area_id": area_ids[0] }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["area_id"], area_ids[0].as_str());

    Ok(())
}
