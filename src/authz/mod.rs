//! Authorization module - permission catalog, resolver, and assignment matrix
//!
//! This module implements scoped RBAC with support for:
//! - A typed, system-defined permission catalog
//! - Role grants at organization, site, or area scope
//! - Super admin bypass via `system.full_admin_access`
//! - The site/area assignment-matrix cascade rules

mod catalog;
mod evaluator;
mod loader;
pub mod matrix;
mod principal;

pub use catalog::{Permission, PermissionCategory};
pub use evaluator::{DefaultPolicyEvaluator, PolicyEvaluator};
pub use loader::load_principal;
pub use principal::{LocationKey, Principal, RoleGrant};
