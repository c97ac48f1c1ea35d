use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

mod common;

/// Two-level chain: Manager signs off first, then Finance. Walks the
/// request from submission to fulfilment, checking the gates on the way.
#[tokio::test]
async fn two_level_approval_to_fulfilment() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Northwind Supplies", "ada").await?;

    // Reference data.
    let (status, site) = harness
        .send(
            "POST",
            "/sites",
            Some(&admin),
            Some(json!({ "name": "Head Office", "address": "1 Main St" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let site_id = common::id_of(&site)?;

    let (status, area) = harness
        .send(
            "POST",
            &format!("/sites/{}/areas", site_id),
            Some(&admin),
            Some(json!({ "name": "3rd Floor" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let area_id = common::id_of(&area)?;

    let (status, category) = harness
        .send("POST", "/categories", Some(&admin), Some(json!({ "name": "Stationery" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let category_id = common::id_of(&category)?;

    let (status, paper) = harness
        .send(
            "POST",
            "/items",
            Some(&admin),
            Some(json!({
                "category_id": category_id,
                "name": "A4 paper",
                "unit": "ream",
                "cost_per_unit": 4.5
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let paper_id = common::id_of(&paper)?;

    let (status, stapler) = harness
        .send(
            "POST",
            "/items",
            Some(&admin),
            Some(json!({ "category_id": category_id, "name": "Stapler", "unit": "piece" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let stapler_id = common::id_of(&stapler)?;

    // Roles: the seeded Manager plus a custom Finance role.
    let manager_role = harness.role_id(&admin, "Manager").await?;
    let requester_role = harness.role_id(&admin, "Requester").await?;

    let (status, finance_role) = harness
        .send(
            "POST",
            "/roles",
            Some(&admin),
            Some(json!({
                "name": "Finance",
                "scope": "site",
                "permissions": [
                    "requests.view_requests",
                    "requests.approve_requests",
                    "requests.reject_requests"
                ]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let finance_role = common::id_of(&finance_role)?;

    // Two-level workflow replaces the seeded single-level default.
    let (status, workflow) = harness
        .send(
            "POST",
            "/workflows",
            Some(&admin),
            Some(json!({
                "name": "Two-step approval",
                "levels": [
                    { "role_id": manager_role },
                    { "role_id": finance_role }
                ]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(workflow["is_active"], false);
    let workflow_id = common::id_of(&workflow)?;

    let (status, workflow) = harness
        .send("PATCH", &format!("/workflows/{}/activate", workflow_id), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workflow["is_active"], true);

    // Staff: a manager and a finance reviewer at the site, an org-wide requester.
    let manager_id = harness.create_user(&admin, "grace").await?;
    let finance_id = harness.create_user(&admin, "frida").await?;
    let requester_id = harness.create_user(&admin, "rita").await?;

    for (user_id, role_id, at_site) in [
        (&manager_id, &manager_role, true),
        (&finance_id, &finance_role, true),
        (&requester_id, &requester_role, false),
    ] {
        let assignment = if at_site {
            json!({ "role_id": role_id, "site_id": site_id })
        } else {
            json!({ "role_id": role_id })
        };
        let (status, body) = harness
            .send(
                "POST",
                &format!("/end-users/{}/roles", user_id),
                Some(&admin),
                Some(json!({ "assignments": [assignment] })),
            )
            .await?;
        assert_eq!(status, StatusCode::OK, "assignment failed: {}", body);
    }

    let manager = harness.login("grace").await?;
    let finance = harness.login("frida").await?;
    let requester = harness.login("rita").await?;

    // Submission snapshots the chain: level 1 pending, level 2 awaiting.
    let (status, request) = harness
        .send(
            "POST",
            "/requests",
            Some(&requester),
            Some(json!({
                "site_id": site_id,
                "area_id": area_id,
                "priority": "high",
                "items": [
                    { "catalog_item_id": paper_id, "quantity": 4 },
                    { "catalog_item_id": stapler_id, "quantity": 2 }
                ]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "submit failed: {}", request);
    let request_id = common::id_of(&request)?;

    assert_eq!(request["status"], "pending");
    assert_eq!(request["priority"], "high");
    assert_eq!(request["total_value"], 18.0);
    assert_eq!(request["unpriced_items"], 1);
    let levels = request["approval_levels"].as_array().unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0]["status"], "pending");
    assert_eq!(levels[1]["status"], "awaiting");

    // The requester cannot review their own request.
    let (status, body) = harness
        .send("POST", &format!("/requests/{}/approve", request_id), Some(&requester), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(common::error_code(&body), Some("cannot_approve_own_request"));

    // Finance holds approve_requests but not the Manager role bound to level 1.
    let (status, _body) = harness
        .send("POST", &format!("/requests/{}/approve", request_id), Some(&finance), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Manager approves level 1; level 2 becomes pending.
    let (status, request) = harness
        .send(
            "POST",
            &format!("/requests/{}/approve", request_id),
            Some(&manager),
            Some(json!({ "notes": "within budget" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "pending");
    let levels = request["approval_levels"].as_array().unwrap();
    assert_eq!(levels[0]["status"], "approved");
    assert_eq!(levels[0]["comments"], "within budget");
    assert_eq!(levels[1]["status"], "pending");

    // Not fulfillable before the chain completes.
    let (status, body) = harness
        .send("POST", &format!("/requests/{}/fulfill", request_id), Some(&manager), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(common::error_code(&body), Some("invalid_request_status"));

    // Finance approves the final level; the request as a whole is approved.
    let (status, request) = harness
        .send("POST", &format!("/requests/{}/approve", request_id), Some(&finance), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "approved");
    assert!(request["approved_at"].is_string());

    // Editing the template never rewrites the snapshot on the request.
    let (status, workflow) = harness
        .send(
            "PUT",
            &format!("/workflows/{}", workflow_id),
            Some(&admin),
            Some(json!({ "levels": [{ "role_id": manager_role }] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(workflow["version"], 2);

    let (status, request) = harness
        .send("GET", &format!("/requests/{}", request_id), Some(&requester), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["approval_levels"].as_array().unwrap().len(), 2);

    // Fulfilment is terminal.
    let (status, request) = harness
        .send("POST", &format!("/requests/{}/fulfill", request_id), Some(&manager), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(request["status"], "fulfilled");
    assert!(request["fulfilled_at"].is_string());

    let (status, body) = harness
        .send("POST", &format!("/requests/{}/fulfill", request_id), Some(&manager), None)
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(common::error_code(&body), Some("request_already_processed"));

    Ok(())
}

/// A reviewer whose only grant sits at a different site cannot act on the
/// request even though the permission name matches.
#[tokio::test]
async fn approval_is_scoped_to_the_request_location() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Acme Industrial", "amy").await?;

    let mut site_ids = Vec::new();
    for name in ["Plant North", "Plant South"] {
        let (status, site) = harness
            .send("POST", "/sites", Some(&admin), Some(json!({ "name": name })))
            .await?;
        assert_eq!(status, StatusCode::CREATED);
        site_ids.push(common::id_of(&site)?);
    }

    let (status, category) = harness
        .send("POST", "/categories", Some(&admin), Some(json!({ "name": "Safety" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let (status, item) = harness
        .send(
            "POST",
            "/items",
            Some(&admin),
            Some(json!({
                "category_id": common::id_of(&category)?,
                "name": "Gloves",
                "cost_per_unit": 2.0
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let item_id = common::id_of(&item)?;

    let manager_role = harness.role_id(&admin, "Manager").await?;
    let requester_role = harness.role_id(&admin, "Requester").await?;

    // Manager only at Plant South; the request goes to Plant North.
    let manager_id = harness.create_user(&admin, "mona").await?;
    let (status, _) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", manager_id),
            Some(&admin),
            Some(json!({ "assignments": [{ "role_id": manager_role, "site_id": site_ids[1] }] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let requester_id = harness.create_user(&admin, "ray").await?;
    let (status, _) = harness
        .send(
            "POST",
            &format!("/end-users/{}/roles", requester_id),
            Some(&admin),
            Some(json!({ "assignments": [{ "role_id": requester_role }] })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);

    let manager = harness.login("mona").await?;
    let requester = harness.login("ray").await?;

    let (status, request) = harness
        .send(
            "POST",
            "/requests",
            Some(&requester),
            Some(json!({
                "site_id": site_ids[0],
                "items": [{ "catalog_item_id": item_id, "quantity": 1 }]
            })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = common::id_of(&request)?;

    let (status, _) = harness
        .send("POST", &format!("/requests/{}/approve", request_id), Some(&manager), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    Ok(())
}

/// Zero assignments means zero visibility beyond the user's own requests.
#[tokio::test]
async fn unassigned_user_has_no_permissions() -> Result<()> {
    let harness = common::setup().await?;
    let admin = harness.register("Borealis Labs", "bea").await?;

    harness.create_user(&admin, "nils").await?;
    let nils = harness.login("nils").await?;

    for uri in ["/roles", "/end-users", "/workflows", "/items"] {
        let (status, _body) = harness.send("GET", uri, Some(&nils), None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{} should be forbidden", uri);
    }

    // Listing requests works but shows nothing.
    let (status, body) = harness.send("GET", "/requests", Some(&nils), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(0));

    Ok(())
}
