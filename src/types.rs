//! Shared data model for the privileged role audit
//!
//! Fixed-field record types used across collection, aggregation and report
//! rendering. Assignments are immutable once collected; identity is the
//! pair (assignment id, scope).

use serde::{Deserialize, Serialize};

/// The hierarchical level at which a role assignment applies
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AssignmentScope {
    Subscription,
    ResourceGroup,
}

impl AssignmentScope {
    /// Human-readable label used in reports and scope breakdowns
    pub fn label(&self) -> &'static str {
        match self {
            AssignmentScope::Subscription => "Subscription",
            AssignmentScope::ResourceGroup => "Resource Group",
        }
    }
}

/// Kind of identity holding a role assignment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PrincipalType {
    User,
    Group,
    ServicePrincipal,
    Other,
}

impl PrincipalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalType::User => "User",
            PrincipalType::Group => "Group",
            PrincipalType::ServicePrincipal => "ServicePrincipal",
            PrincipalType::Other => "Other",
        }
    }

    /// Map the principalType string returned by the management API.
    /// Unrecognized or absent values map to `Other`.
    pub fn from_api(value: &str) -> Self {
        match value {
            "User" => PrincipalType::User,
            "Group" => PrincipalType::Group,
            "ServicePrincipal" => PrincipalType::ServicePrincipal,
            _ => PrincipalType::Other,
        }
    }
}

/// One privileged role assignment, fully resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub subscription_id: String,
    pub subscription_name: String,
    pub scope: AssignmentScope,
    pub resource_group_name: Option<String>,
    pub role_name: String,
    pub principal_type: PrincipalType,
    pub principal_id: String,
    pub principal_name: String,
    pub sign_in_name: Option<String>,
    pub assignment_id: String,
}

/// A non-fatal degradation recorded during a run: a scope that could not be
/// fetched, or a report file that could not be written. Kept on the outcome
/// so callers can tell an empty result from a partial one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditWarning {
    /// The scope path or output path the warning applies to
    pub subject: String,
    pub reason: String,
}

/// Result of the collection phase: the filtered assignment list plus every
/// warning accumulated along the way.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CollectionOutcome {
    pub assignments: Vec<RoleAssignment>,
    pub warnings: Vec<AuditWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_labels() {
        assert_eq!(AssignmentScope::Subscription.label(), "Subscription");
        assert_eq!(AssignmentScope::ResourceGroup.label(), "Resource Group");
    }

    #[test]
    fn test_principal_type_mapping() {
        assert_eq!(PrincipalType::from_api("User"), PrincipalType::User);
        assert_eq!(PrincipalType::from_api("Group"), PrincipalType::Group);
        assert_eq!(
            PrincipalType::from_api("ServicePrincipal"),
            PrincipalType::ServicePrincipal
        );
        assert_eq!(
            PrincipalType::from_api("ForeignGroup"),
            PrincipalType::Other
        );
        assert_eq!(PrincipalType::from_api(""), PrincipalType::Other);
        // Case-sensitive on purpose: the API emits exact casing
        assert_eq!(PrincipalType::from_api("user"), PrincipalType::Other);
    }

    #[test]
    fn test_assignment_serialization_round_trip() {
        let assignment = RoleAssignment {
            subscription_id: "0000-1111".to_string(),
            subscription_name: "Production".to_string(),
            scope: AssignmentScope::ResourceGroup,
            resource_group_name: Some("rg-network".to_string()),
            role_name: "Owner".to_string(),
            principal_type: PrincipalType::User,
            principal_id: "abc".to_string(),
            principal_name: "Jordan Admin".to_string(),
            sign_in_name: Some("jordan@contoso.com".to_string()),
            assignment_id: "/subscriptions/0000-1111/providers/Microsoft.Authorization/roleAssignments/xyz".to_string(),
        };

        let json = serde_json::to_string(&assignment).unwrap();
        let back: RoleAssignment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.role_name, "Owner");
        assert_eq!(back.scope, AssignmentScope::ResourceGroup);
        assert_eq!(back.resource_group_name.as_deref(), Some("rg-network"));
    }
}
