//! Privileged role allow-list
//!
//! The fixed set of Azure role names considered privileged by this audit.
//! Matching is case-sensitive and exact: assignments whose role name is not
//! in this list are discarded before aggregation, so the final result set
//! can never contain a non-privileged role.

/// Role names treated as privileged. Exact strings, case-sensitive.
pub const PRIVILEGED_ROLES: [&str; 20] = [
    "Owner",
    "Contributor",
    "User Access Administrator",
    "Co-Administrator",
    "Service Administrator",
    "Account Administrator",
    "Key Vault Administrator",
    "SQL DB Contributor",
    "SQL Security Manager",
    "Storage Account Contributor",
    "Azure Kubernetes Service Cluster Admin Role",
    "Virtual Machine Administrator Login",
    "Virtual Machine Contributor",
    "Network Contributor",
    "Security Administrator",
    "Azure Service Deploy Release Management Contributor",
    "Automation Contributor",
    "Log Analytics Contributor",
    "Application Administrator",
    "Cloud Application Administrator",
];

/// Roles flagged in the HTML report as highest risk
pub const HIGH_RISK_ROLES: [&str; 2] = ["Owner", "Contributor"];

/// Case-sensitive exact-match test against the allow-list
pub fn is_privileged_role(role_name: &str) -> bool {
    PRIVILEGED_ROLES.contains(&role_name)
}

/// Whether a role gets the high-risk highlight in the HTML report
pub fn is_high_risk_role(role_name: &str) -> bool {
    HIGH_RISK_ROLES.contains(&role_name)
}
