//! Role assignment collection
//!
//! Fetches role assignments scope by scope, filters them against the
//! privileged-role allow-list and resolves principal names. Collection is
//! sequential and tolerates partial failure: a scope that cannot be fetched
//! is recorded as a warning and the remaining scopes are still collected.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::cloud::{CloudApi, RawRoleAssignment};
use crate::errors::Result;
use crate::privileged_roles::is_privileged_role;
use crate::resolver::PrincipalResolver;
use crate::session::AzureSession;
use crate::types::{AssignmentScope, AuditWarning, CollectionOutcome, PrincipalType, RoleAssignment};

/// Collects privileged role assignments for one subscription
pub struct AssignmentCollector<'a> {
    cloud: &'a dyn CloudApi,
    resolver: &'a PrincipalResolver<'a>,
    session: &'a AzureSession,
    include_resource_groups: bool,
    /// Role definition id -> role name, resolved once per definition per run
    role_names: HashMap<String, String>,
}

impl<'a> AssignmentCollector<'a> {
    pub fn new(
        cloud: &'a dyn CloudApi,
        resolver: &'a PrincipalResolver<'a>,
        session: &'a AzureSession,
        include_resource_groups: bool,
    ) -> Self {
        Self {
            cloud,
            resolver,
            session,
            include_resource_groups,
            role_names: HashMap::new(),
        }
    }

    /// Collect every privileged assignment in scope.
    ///
    /// Never fails: per-scope fetch errors become warnings on the outcome
    /// and that scope contributes zero assignments.
    pub async fn collect(&mut self) -> CollectionOutcome {
        let mut outcome = CollectionOutcome::default();

        let subscription_scope = self.session.subscription_scope();
        match self
            .fetch_scope(
                &subscription_scope,
                AssignmentScope::Subscription,
                None,
                &mut outcome.warnings,
            )
            .await
        {
            Ok(assignments) => outcome.assignments.extend(assignments),
            Err(e) => {
                warn!(scope = %subscription_scope, error = %e, "scope fetch failed, continuing");
                outcome.warnings.push(AuditWarning {
                    subject: subscription_scope.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.include_resource_groups {
            let groups = match self
                .cloud
                .list_resource_groups(&self.session.subscription_id)
                .await
            {
                Ok(groups) => groups,
                Err(e) => {
                    warn!(error = %e, "resource group enumeration failed, continuing with subscription scope only");
                    outcome.warnings.push(AuditWarning {
                        subject: format!("{}/resourceGroups", subscription_scope),
                        reason: e.to_string(),
                    });
                    Vec::new()
                }
            };

            for group in groups {
                let scope = self.session.resource_group_scope(&group);
                match self
                    .fetch_scope(
                        &scope,
                        AssignmentScope::ResourceGroup,
                        Some(&group),
                        &mut outcome.warnings,
                    )
                    .await
                {
                    Ok(assignments) => outcome.assignments.extend(assignments),
                    Err(e) => {
                        warn!(scope = %scope, error = %e, "scope fetch failed, continuing");
                        outcome.warnings.push(AuditWarning {
                            subject: scope,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            assignments = outcome.assignments.len(),
            warnings = outcome.warnings.len(),
            "collection complete"
        );
        outcome
    }

    /// Fetch one scope and keep only privileged assignments created at it.
    ///
    /// Listings at a resource group include assignments inherited from the
    /// subscription; those are dropped here so each assignment appears once,
    /// at the scope it was created at. A failed role definition lookup drops
    /// the assignment and records a warning, since the dropped row may well
    /// have been privileged.
    async fn fetch_scope(
        &mut self,
        scope_path: &str,
        scope: AssignmentScope,
        resource_group: Option<&str>,
        warnings: &mut Vec<AuditWarning>,
    ) -> Result<Vec<RoleAssignment>> {
        let raw = self.cloud.list_role_assignments(scope_path).await?;
        debug!(scope = %scope_path, fetched = raw.len(), "fetched role assignments");

        let mut kept = Vec::new();
        for entry in raw {
            if !entry.scope.eq_ignore_ascii_case(scope_path) {
                continue; // inherited from a broader scope
            }

            let role_name = match self.role_name(&entry.role_definition_id).await {
                Ok(name) => name,
                Err(e) => {
                    warn!(
                        role_definition_id = %entry.role_definition_id,
                        error = %e,
                        "role definition lookup failed, skipping assignment"
                    );
                    warnings.push(AuditWarning {
                        subject: entry.id.clone(),
                        reason: format!(
                            "role definition {} could not be resolved: {}",
                            entry.role_definition_id, e
                        ),
                    });
                    continue;
                }
            };
            if !is_privileged_role(&role_name) {
                continue;
            }

            kept.push(self.build_assignment(entry, role_name, scope, resource_group).await);
        }
        Ok(kept)
    }

    async fn build_assignment(
        &self,
        entry: RawRoleAssignment,
        role_name: String,
        scope: AssignmentScope,
        resource_group: Option<&str>,
    ) -> RoleAssignment {
        let principal_type =
            PrincipalType::from_api(entry.principal_type.as_deref().unwrap_or(""));
        let fallback = entry
            .principal_display_name
            .clone()
            .unwrap_or_else(|| entry.principal_id.clone());
        let resolved = self
            .resolver
            .resolve(&entry.principal_id, principal_type, &fallback)
            .await;

        RoleAssignment {
            subscription_id: self.session.subscription_id.clone(),
            subscription_name: self.session.subscription_name.clone(),
            scope,
            resource_group_name: resource_group.map(str::to_string),
            role_name,
            principal_type,
            principal_id: entry.principal_id,
            principal_name: resolved.display_name,
            sign_in_name: resolved.sign_in_name,
            assignment_id: entry.id,
        }
    }

    async fn role_name(&mut self, role_definition_id: &str) -> Result<String> {
        if let Some(name) = self.role_names.get(role_definition_id) {
            return Ok(name.clone());
        }
        let name = self
            .cloud
            .get_role_definition_name(role_definition_id)
            .await?;
        self.role_names
            .insert(role_definition_id.to_string(), name.clone());
        Ok(name)
    }
}
