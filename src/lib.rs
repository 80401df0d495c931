//! Operational tooling for Microsoft identity infrastructure.
//!
//! Three flows, exposed as subcommands of the `identity-audit` binary:
//!
//! - provisioning a group-managed service account (gMSA) as a Directory
//!   Services Account for an identity-monitoring sensor ([`gmsa::create_dsa`]);
//! - validating that account's configuration ([`gmsa::validate_dsa`]);
//! - auditing privileged Azure role assignments across a subscription and
//!   its resource groups ([`audit::run_privileged_role_audit`]).
//!
//! The audit flow is deliberately resilient: a scope that cannot be fetched
//! or a report file that cannot be written shrinks the output and records a
//! warning instead of aborting the run.

pub mod aggregate;
pub mod audit;
pub mod cloud;
pub mod collector;
pub mod directory;
pub mod errors;
pub mod gmsa;
pub mod ldap_support;
pub mod privileged_roles;
pub mod report;
pub mod resolver;
pub mod session;
pub mod types;

pub use audit::{run_privileged_role_audit, AuditOptions, RoleAuditOutcome};
pub use errors::{AuditError, Result};
pub use report::OutputFormat;
pub use types::{AssignmentScope, AuditWarning, PrincipalType, RoleAssignment};
