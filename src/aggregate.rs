//! Summary aggregation over the collected assignment list
//!
//! Groups assignments by role name, principal type and scope label, each
//! breakdown sorted by count descending with the key ascending as a
//! deterministic tiebreak. The sum of counts in every breakdown equals the
//! total assignment count.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::RoleAssignment;

/// One (key, count) row of a breakdown table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BreakdownEntry {
    pub key: String,
    pub count: usize,
}

/// Derived, read-only summary of a collection run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAuditSummary {
    pub total_assignments: usize,
    pub by_role: Vec<BreakdownEntry>,
    pub by_principal_type: Vec<BreakdownEntry>,
    pub by_scope: Vec<BreakdownEntry>,
    pub generated_at: String,
}

/// Build the three breakdowns for a collected assignment list
pub fn summarize(assignments: &[RoleAssignment]) -> RoleAuditSummary {
    RoleAuditSummary {
        total_assignments: assignments.len(),
        by_role: count_by(assignments.iter().map(|a| a.role_name.as_str())),
        by_principal_type: count_by(assignments.iter().map(|a| a.principal_type.as_str())),
        by_scope: count_by(assignments.iter().map(|a| a.scope.label())),
        generated_at: chrono::Utc::now().to_rfc3339(),
    }
}

fn count_by<'k>(keys: impl Iterator<Item = &'k str>) -> Vec<BreakdownEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    let mut entries: Vec<BreakdownEntry> = counts
        .into_iter()
        .map(|(key, count)| BreakdownEntry {
            key: key.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AssignmentScope, PrincipalType};

    fn assignment(role: &str, ptype: PrincipalType, scope: AssignmentScope) -> RoleAssignment {
        RoleAssignment {
            subscription_id: "sub-1".to_string(),
            subscription_name: "Production".to_string(),
            scope,
            resource_group_name: match scope {
                AssignmentScope::ResourceGroup => Some("rg-1".to_string()),
                AssignmentScope::Subscription => None,
            },
            role_name: role.to_string(),
            principal_type: ptype,
            principal_id: "p".to_string(),
            principal_name: "name".to_string(),
            sign_in_name: None,
            assignment_id: "ra".to_string(),
        }
    }

    #[test]
    fn test_breakdown_counts_sum_to_total() {
        let assignments = vec![
            assignment("Owner", PrincipalType::User, AssignmentScope::Subscription),
            assignment("Owner", PrincipalType::Group, AssignmentScope::ResourceGroup),
            assignment(
                "Contributor",
                PrincipalType::User,
                AssignmentScope::ResourceGroup,
            ),
            assignment(
                "Network Contributor",
                PrincipalType::ServicePrincipal,
                AssignmentScope::ResourceGroup,
            ),
        ];
        let summary = summarize(&assignments);

        assert_eq!(summary.total_assignments, 4);
        for breakdown in [
            &summary.by_role,
            &summary.by_principal_type,
            &summary.by_scope,
        ] {
            let total: usize = breakdown.iter().map(|e| e.count).sum();
            assert_eq!(total, 4);
        }
    }

    #[test]
    fn test_sorted_by_count_then_key() {
        let assignments = vec![
            assignment("Owner", PrincipalType::User, AssignmentScope::Subscription),
            assignment("Owner", PrincipalType::User, AssignmentScope::Subscription),
            assignment(
                "Contributor",
                PrincipalType::User,
                AssignmentScope::Subscription,
            ),
            assignment(
                "Automation Contributor",
                PrincipalType::User,
                AssignmentScope::Subscription,
            ),
        ];
        let summary = summarize(&assignments);

        assert_eq!(summary.by_role[0].key, "Owner");
        assert_eq!(summary.by_role[0].count, 2);
        // Tie between the two single-count roles broken alphabetically
        assert_eq!(summary.by_role[1].key, "Automation Contributor");
        assert_eq!(summary.by_role[2].key, "Contributor");
    }

    #[test]
    fn test_empty_input() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_assignments, 0);
        assert!(summary.by_role.is_empty());
        assert!(summary.by_principal_type.is_empty());
        assert!(summary.by_scope.is_empty());
    }

    #[test]
    fn test_scope_labels_in_breakdown() {
        let assignments = vec![
            assignment("Owner", PrincipalType::User, AssignmentScope::Subscription),
            assignment("Owner", PrincipalType::User, AssignmentScope::ResourceGroup),
            assignment("Owner", PrincipalType::User, AssignmentScope::ResourceGroup),
        ];
        let summary = summarize(&assignments);
        assert_eq!(summary.by_scope[0].key, "Resource Group");
        assert_eq!(summary.by_scope[0].count, 2);
        assert_eq!(summary.by_scope[1].key, "Subscription");
        assert_eq!(summary.by_scope[1].count, 1);
    }
}
