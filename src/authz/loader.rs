use std::collections::HashMap;

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::catalog::Permission;
use super::principal::{LocationKey, Principal, RoleGrant};
use crate::jwt::AuthUser;

/// Resolve the caller's role grants from the database.
///
/// A fetch failure degrades to an empty grant set (the caller simply has no
/// permissions) rather than failing the request; authentication itself has
/// already happened at the token layer.
pub async fn load_principal(pool: &SqlitePool, auth: &AuthUser) -> Principal {
    match fetch_grants(pool, auth).await {
        Ok(grants) => Principal {
            user_id: auth.user_id,
            org_id: auth.org_id,
            grants,
        },
        Err(err) => {
            tracing::warn!(
                user_id = %auth.user_id,
                error = %err,
                "failed to load role grants, degrading to empty permission set"
            );
            Principal::new(auth.user_id, auth.org_id)
        }
    }
}

async fn fetch_grants(pool: &SqlitePool, auth: &AuthUser) -> Result<Vec<RoleGrant>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT ra.id as assignment_id, ra.role_id, ra.site_id, ra.area_id, rp.permission
        FROM role_assignments ra
        INNER JOIN roles r ON r.id = ra.role_id
        LEFT JOIN role_permissions rp ON rp.role_id = ra.role_id
        WHERE ra.user_id = ? AND r.org_id = ?
        "#,
    )
    .bind(auth.user_id.to_string())
    .bind(auth.org_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut grants: HashMap<String, RoleGrant> = HashMap::new();

    for row in rows {
        let assignment_id: String = row.get("assignment_id");
        let role_id: String = row.get("role_id");
        let site_id: Option<String> = row.get("site_id");
        let area_id: Option<String> = row.get("area_id");
        let permission: Option<String> = row.get("permission");

        let Ok(role_id) = Uuid::parse_str(&role_id) else {
            continue;
        };
        let site_id = site_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());
        let area_id = area_id.as_deref().and_then(|s| Uuid::parse_str(s).ok());

        let grant = grants.entry(assignment_id).or_insert_with(|| RoleGrant {
            role_id,
            location: LocationKey::from_ids(site_id, area_id),
            permissions: Default::default(),
        });

        if let Some(name) = permission {
            match Permission::parse(&name) {
                Some(p) => {
                    grant.permissions.insert(p);
                }
                None => {
                    tracing::debug!(permission = %name, "skipping unknown permission name");
                }
            }
        }
    }

    Ok(grants.into_values().collect())
}
