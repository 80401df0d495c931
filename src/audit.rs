//! Privileged role audit orchestration
//!
//! Runs the full flow (session resolution, collection, aggregation, report
//! writing) and returns the in-memory result for further scripting. Only
//! session resolution can fail; everything after degrades to warnings.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::aggregate::{summarize, RoleAuditSummary};
use crate::cloud::CloudApi;
use crate::collector::AssignmentCollector;
use crate::directory::DirectoryApi;
use crate::errors::Result;
use crate::report::{default_report_path, write_reports, OutputFormat};
use crate::resolver::PrincipalResolver;
use crate::session::AzureSession;
use crate::types::{AuditWarning, RoleAssignment};

/// Options for one audit run
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub subscription_id: Option<String>,
    pub include_resource_groups: bool,
    pub output_format: OutputFormat,
    /// Defaults to a timestamped filename in the current directory
    pub output_csv: Option<PathBuf>,
    pub output_html: Option<PathBuf>,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            subscription_id: None,
            include_resource_groups: true,
            output_format: OutputFormat::Both,
            output_csv: None,
            output_html: None,
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RoleAuditOutcome {
    pub session: AzureSession,
    pub assignments: Vec<RoleAssignment>,
    pub summary: RoleAuditSummary,
    pub warnings: Vec<AuditWarning>,
}

/// Run the privileged role audit end to end.
///
/// Fatal errors (`NoActiveSession`, `SubscriptionNotFound`, `AccessDenied`)
/// surface before any collection; per-scope and per-report failures are
/// returned as warnings on the outcome.
pub async fn run_privileged_role_audit(
    cloud: &dyn CloudApi,
    directory: &dyn DirectoryApi,
    options: &AuditOptions,
) -> Result<RoleAuditOutcome> {
    let session = AzureSession::resolve(cloud, options.subscription_id.as_deref()).await?;

    let resolver = PrincipalResolver::new(directory);
    let mut collector = AssignmentCollector::new(
        cloud,
        &resolver,
        &session,
        options.include_resource_groups,
    );
    let outcome = collector.collect().await;
    let mut warnings = outcome.warnings;
    let assignments = outcome.assignments;

    info!(
        cache_hits = resolver.cache_hits(),
        cache_misses = resolver.cache_misses(),
        "principal resolution finished"
    );

    let summary = summarize(&assignments);

    let csv_path = options
        .output_csv
        .clone()
        .unwrap_or_else(|| default_report_path("csv"));
    let html_path = options
        .output_html
        .clone()
        .unwrap_or_else(|| default_report_path("html"));
    warnings.extend(write_reports(
        options.output_format,
        &csv_path,
        &html_path,
        &session.subscription_name,
        &session.subscription_id,
        &summary,
        &assignments,
    ));

    if !warnings.is_empty() {
        warn!(
            count = warnings.len(),
            "run completed with warnings; the report may be incomplete"
        );
    }

    Ok(RoleAuditOutcome {
        session,
        assignments,
        summary,
        warnings,
    })
}
