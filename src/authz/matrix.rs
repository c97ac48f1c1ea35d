//! Role assignment matrix with site/area cascade rules.
//!
//! The matrix is the set of checked `(role, location)` cells for one user.
//! The site-level cell is never independent state: it means "this role is
//! granted at every area of the site", and the cascade rules keep that
//! reading consistent after every toggle. On save the matrix is flattened
//! into `{role_id, site_id?, area_id?}` triples and replaces the user's
//! prior assignment set atomically.

use std::collections::HashSet;

use uuid::Uuid;

use super::principal::LocationKey;

/// A site together with its area ids, as needed for cascade evaluation.
#[derive(Debug, Clone)]
pub struct SiteAreas {
    pub site_id: Uuid,
    pub area_ids: Vec<Uuid>,
}

/// A flattened matrix cell, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentEntry {
    pub role_id: Uuid,
    pub site_id: Option<Uuid>,
    pub area_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentMatrix {
    checked: HashSet<(Uuid, LocationKey)>,
}

impl AssignmentMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Uuid, LocationKey)>) -> Self {
        Self {
            checked: entries.into_iter().collect(),
        }
    }

    pub fn is_checked(&self, role_id: Uuid, location: LocationKey) -> bool {
        self.checked.contains(&(role_id, location))
    }

    /// Flip one cell, applying the cascade rules:
    /// 1. checking a site checks every area under it
    /// 2. unchecking a site unchecks every area under it
    /// 3. unchecking an area unchecks its parent site cell
    /// 4. checking the last unchecked area of a site checks the site cell
    pub fn toggle(&mut self, role_id: Uuid, location: LocationKey, sites: &[SiteAreas]) {
        let turning_on = !self.is_checked(role_id, location);

        match location {
            LocationKey::OrgWide => {
                self.set(role_id, location, turning_on);
            }
            LocationKey::Site(site_id) => {
                self.set(role_id, location, turning_on);
                if let Some(site) = sites.iter().find(|s| s.site_id == site_id) {
                    for area_id in &site.area_ids {
                        self.set(role_id, LocationKey::Area(*area_id), turning_on);
                    }
                }
            }
            LocationKey::Area(area_id) => {
                self.set(role_id, location, turning_on);
                if let Some(site) = sites.iter().find(|s| s.area_ids.contains(&area_id)) {
                    if turning_on {
                        let all_checked = site
                            .area_ids
                            .iter()
                            .all(|a| self.is_checked(role_id, LocationKey::Area(*a)));
                        if all_checked {
                            self.set(role_id, LocationKey::Site(site.site_id), true);
                        }
                    } else {
                        // Partial revoke breaks the whole-site grant.
                        self.set(role_id, LocationKey::Site(site.site_id), false);
                    }
                }
            }
        }
    }

    /// Recompute the implied site cells from the area cells, so that a
    /// matrix assembled from stored triples satisfies the same invariant
    /// the toggle cascades maintain.
    pub fn normalize(&mut self, sites: &[SiteAreas]) {
        let roles: HashSet<Uuid> = self.checked.iter().map(|(r, _)| *r).collect();
        for role_id in roles {
            for site in sites {
                if site.area_ids.is_empty() {
                    continue;
                }
                if self.is_checked(role_id, LocationKey::Site(site.site_id)) {
                    for area_id in &site.area_ids {
                        self.set(role_id, LocationKey::Area(*area_id), true);
                    }
                } else {
                    let all_checked = site
                        .area_ids
                        .iter()
                        .all(|a| self.is_checked(role_id, LocationKey::Area(*a)));
                    if all_checked {
                        self.set(role_id, LocationKey::Site(site.site_id), true);
                    }
                }
            }
        }
    }

    /// Flatten into persistence triples, sorted for deterministic replace.
    pub fn flatten(&self) -> Vec<AssignmentEntry> {
        let mut entries: Vec<AssignmentEntry> = self
            .checked
            .iter()
            .map(|(role_id, location)| match location {
                LocationKey::OrgWide => AssignmentEntry {
                    role_id: *role_id,
                    site_id: None,
                    area_id: None,
                },
                LocationKey::Site(site_id) => AssignmentEntry {
                    role_id: *role_id,
                    site_id: Some(*site_id),
                    area_id: None,
                },
                LocationKey::Area(area_id) => AssignmentEntry {
                    role_id: *role_id,
                    site_id: None,
                    area_id: Some(*area_id),
                },
            })
            .collect();

        entries.sort_by_key(|e| (e.role_id, e.site_id, e.area_id));
        entries
    }
}

impl AssignmentMatrix {
    fn set(&mut self, role_id: Uuid, location: LocationKey, on: bool) {
        if on {
            self.checked.insert((role_id, location));
        } else {
            self.checked.remove(&(role_id, location));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Uuid, SiteAreas, [Uuid; 3]) {
        let role = Uuid::new_v4();
        let areas = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let site = SiteAreas {
            site_id: Uuid::new_v4(),
            area_ids: areas.to_vec(),
        };
        (role, site, areas)
    }

    #[test]
    fn checking_site_checks_all_areas() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::Site(site.site_id), &sites);

        assert!(matrix.is_checked(role, LocationKey::Site(site.site_id)));
        for area in areas {
            assert!(matrix.is_checked(role, LocationKey::Area(area)));
        }
    }

    #[test]
    fn unchecking_site_unchecks_all_areas() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::Site(site.site_id), &sites);
        matrix.toggle(role, LocationKey::Site(site.site_id), &sites);

        assert!(!matrix.is_checked(role, LocationKey::Site(site.site_id)));
        for area in areas {
            assert!(!matrix.is_checked(role, LocationKey::Area(area)));
        }
    }

    #[test]
    fn unchecking_area_breaks_whole_site_grant() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::Site(site.site_id), &sites);
        matrix.toggle(role, LocationKey::Area(areas[1]), &sites);

        assert!(!matrix.is_checked(role, LocationKey::Site(site.site_id)));
        assert!(matrix.is_checked(role, LocationKey::Area(areas[0])));
        assert!(!matrix.is_checked(role, LocationKey::Area(areas[1])));
        assert!(matrix.is_checked(role, LocationKey::Area(areas[2])));
    }

    #[test]
    fn completing_all_areas_promotes_to_site_grant() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::Area(areas[0]), &sites);
        matrix.toggle(role, LocationKey::Area(areas[1]), &sites);
        assert!(!matrix.is_checked(role, LocationKey::Site(site.site_id)));

        matrix.toggle(role, LocationKey::Area(areas[2]), &sites);
        assert!(matrix.is_checked(role, LocationKey::Site(site.site_id)));
    }

    #[test]
    fn org_wide_toggle_is_independent_of_sites() {
        let (role, site, _areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::OrgWide, &sites);
        assert!(matrix.is_checked(role, LocationKey::OrgWide));
        assert!(!matrix.is_checked(role, LocationKey::Site(site.site_id)));

        matrix.toggle(role, LocationKey::OrgWide, &sites);
        assert!(!matrix.is_checked(role, LocationKey::OrgWide));
    }

    #[test]
    fn normalize_restores_cascade_invariant() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];

        // Stored triples with every area checked but no site cell.
        let mut matrix = AssignmentMatrix::from_entries(
            areas.iter().map(|a| (role, LocationKey::Area(*a))),
        );
        matrix.normalize(&sites);
        assert!(matrix.is_checked(role, LocationKey::Site(site.site_id)));

        // A bare site cell gets its area cells back.
        let mut matrix =
            AssignmentMatrix::from_entries([(role, LocationKey::Site(site.site_id))]);
        matrix.normalize(&sites);
        for area in areas {
            assert!(matrix.is_checked(role, LocationKey::Area(area)));
        }
    }

    #[test]
    fn flatten_emits_persistence_triples() {
        let (role, site, areas) = fixture();
        let sites = vec![site.clone()];
        let mut matrix = AssignmentMatrix::new();

        matrix.toggle(role, LocationKey::OrgWide, &sites);
        matrix.toggle(role, LocationKey::Area(areas[0]), &sites);

        let entries = matrix.flatten();
        assert_eq!(entries.len(), 2);
        assert!(entries.contains(&AssignmentEntry {
            role_id: role,
            site_id: None,
            area_id: None
        }));
        assert!(entries.contains(&AssignmentEntry {
            role_id: role,
            site_id: None,
            area_id: Some(areas[0])
        }));
    }
}
