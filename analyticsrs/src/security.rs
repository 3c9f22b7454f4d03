//! Data-visibility constraints for analytics queries.
//!
//! [`decide_access`] rejects requests reaching outside the principal's granted
//! organisation-unit subtree; [`with_user_constraints`] then derives a copy of
//! the query narrowed to what the principal may see.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::models::{DimensionId, DimensionalQuery, ItemId, OrgUnitMode, OrgUnitRef};

/// The authenticated actor a query runs for. Supplied by the identity
/// collaborator and read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Principal {
    pub username: String,
    pub super_user: bool,
    pub data_view_org_units: BTreeSet<OrgUnitRef>,
    pub data_capture_org_units: BTreeSet<OrgUnitRef>,
    /// Category-style restrictions: dimension id to the items the principal may read.
    pub dimension_constraints: BTreeMap<DimensionId, BTreeSet<ItemId>>,
}

impl Principal {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn super_user(username: impl Into<String>) -> Self {
        Self {
            super_user: true,
            ..Self::new(username)
        }
    }

    pub fn with_data_view_org_unit(mut self, unit: OrgUnitRef) -> Self {
        self.data_view_org_units.insert(unit);
        self
    }

    pub fn with_data_capture_org_unit(mut self, unit: OrgUnitRef) -> Self {
        self.data_capture_org_units.insert(unit);
        self
    }

    pub fn with_dimension_constraint<I, S>(mut self, dimension: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimension_constraints
            .insert(dimension.into(), items.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_super(&self) -> bool {
        self.super_user
    }

    pub fn data_view_org_units(&self) -> &BTreeSet<OrgUnitRef> {
        &self.data_view_org_units
    }

    pub fn dimension_constraints(&self) -> &BTreeMap<DimensionId, BTreeSet<ItemId>> {
        &self.dimension_constraints
    }

    /// Data-view units, or the data-capture units when none are configured.
    pub fn granted_org_units(&self) -> &BTreeSet<OrgUnitRef> {
        if self.data_view_org_units.is_empty() {
            &self.data_capture_org_units
        } else {
            &self.data_view_org_units
        }
    }

    pub fn can_view(&self, unit: &OrgUnitRef) -> bool {
        self.granted_org_units()
            .iter()
            .any(|granted| unit.is_descendant_or_self_of(granted))
    }
}

/// Resolves the principal of the current request.
pub trait IdentityProvider: Send + Sync {
    fn principal(&self) -> Result<Principal>;
}

/// A fixed principal, for batch jobs and tests.
impl IdentityProvider for Principal {
    fn principal(&self) -> Result<Principal> {
        Ok(self.clone())
    }
}

fn denied(principal: &Principal, reason: String) -> AnalyticsError {
    tracing::warn!(user = %principal.username, reason = %reason, "analytics access denied");
    AnalyticsError::AccessDenied(reason)
}

/// Check that every explicitly requested organisation unit, whether output
/// dimension, row filter or enrollment filter, lies inside the principal's
/// granted subtree.
pub fn decide_access(query: &DimensionalQuery, principal: &Principal) -> Result<()> {
    if principal.is_super() {
        return Ok(());
    }

    if query.org_unit_mode() == OrgUnitMode::All {
        return Err(denied(
            principal,
            format!(
                "user {} may not query all organisation units",
                principal.username
            ),
        ));
    }

    let requested = query
        .organisation_units()
        .iter()
        .chain(query.org_unit_filters())
        .chain(query.enrollment_org_units());
    for unit in requested {
        if !principal.can_view(unit) {
            return Err(denied(
                principal,
                format!(
                    "user {} may not view data of organisation unit {}",
                    principal.username, unit.uid
                ),
            ));
        }
    }

    Ok(())
}

/// Derive a copy of `query` narrowed to the principal's granted scope.
///
/// A query without any organisation-unit constraint gets the principal's
/// granted units as its organisation-unit dimension. Either an explicit
/// organisation-unit dimension, an organisation-unit filter or an enrollment
/// organisation-unit filter counts as a constraint and suppresses that
/// default. Dimension constraints are intersected into the matching filter
/// or output dimension.
pub fn with_user_constraints(
    query: &DimensionalQuery,
    principal: &Principal,
) -> Result<DimensionalQuery> {
    if principal.is_super() {
        return Ok(query.clone());
    }

    if query.org_unit_mode() == OrgUnitMode::All {
        return Err(denied(
            principal,
            format!(
                "user {} may not run unconstrained queries",
                principal.username
            ),
        ));
    }

    let mut builder = query.to_builder();

    if !query.has_any_org_unit_constraint() {
        let granted = principal.granted_org_units();
        if granted.is_empty() {
            return Err(denied(
                principal,
                format!(
                    "user {} has no data view organisation units",
                    principal.username
                ),
            ));
        }
        tracing::debug!(
            user = %principal.username,
            units = ?granted.iter().map(|u| u.uid.as_str()).collect::<Vec<_>>(),
            "injecting data view organisation units"
        );
        builder = builder.organisation_units(granted.iter().cloned());
    }

    for (dimension, allowed) in principal.dimension_constraints() {
        if let Some(requested) = query.filters().get(dimension) {
            let narrowed = narrow(principal, dimension, requested, allowed)?;
            builder = builder.filter(dimension, narrowed);
        } else if let Some(output) = query.dimension(dimension) {
            let narrowed = narrow(principal, dimension, &output.items, allowed)?;
            builder = builder.dimension(dimension, narrowed);
        } else {
            if allowed.is_empty() {
                return Err(denied(
                    principal,
                    format!("user {} may not read any item of {dimension}", principal.username),
                ));
            }
            builder = builder.filter(dimension, allowed.iter().cloned());
        }
    }

    builder.build()
}

/// Intersect requested items with the allowed ones; an empty request means
/// every item and is replaced by the allowed set.
fn narrow(
    principal: &Principal,
    dimension: &str,
    requested: &BTreeSet<ItemId>,
    allowed: &BTreeSet<ItemId>,
) -> Result<BTreeSet<ItemId>> {
    let narrowed: BTreeSet<ItemId> = if requested.is_empty() {
        allowed.clone()
    } else {
        requested.intersection(allowed).cloned().collect()
    };
    if narrowed.is_empty() {
        return Err(denied(
            principal,
            format!(
                "no requested item of {dimension} is readable by user {}",
                principal.username
            ),
        ));
    }
    Ok(narrowed)
}
