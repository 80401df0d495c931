//! Report rendering: CSV and HTML
//!
//! The two output paths are independent. A write failure on one format is
//! logged, recorded as a warning and never prevents the other format from
//! being attempted.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::aggregate::RoleAuditSummary;
use crate::privileged_roles::is_high_risk_role;
use crate::types::{AuditWarning, RoleAssignment};

/// Which report files to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    Csv,
    Html,
    #[default]
    Both,
}

impl OutputFormat {
    pub fn wants_csv(&self) -> bool {
        matches!(self, OutputFormat::Csv | OutputFormat::Both)
    }

    pub fn wants_html(&self) -> bool {
        matches!(self, OutputFormat::Html | OutputFormat::Both)
    }
}

/// CSV column order. `IsPIM` is always emitted as `Unknown`; PIM elevation
/// status is out of scope and never resolved.
pub const CSV_COLUMNS: [&str; 11] = [
    "SubscriptionName",
    "SubscriptionId",
    "Scope",
    "ResourceGroupName",
    "RoleName",
    "PrincipalType",
    "PrincipalId",
    "PrincipalName",
    "SignInName",
    "AssignmentId",
    "IsPIM",
];

/// Default timestamped output path in the current directory
pub fn default_report_path(extension: &str) -> PathBuf {
    PathBuf::from(format!(
        "PrivilegedRoleAudit-{}.{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        extension
    ))
}

/// Quote a field per RFC 4180 when it embeds a comma, quote or newline
fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render the full assignment list as CSV, header row first
pub fn render_csv(assignments: &[RoleAssignment]) -> String {
    let mut out = String::new();
    out.push_str(&CSV_COLUMNS.join(","));
    out.push('\n');

    for a in assignments {
        let fields = [
            a.subscription_name.as_str(),
            a.subscription_id.as_str(),
            a.scope.label(),
            a.resource_group_name.as_deref().unwrap_or(""),
            a.role_name.as_str(),
            a.principal_type.as_str(),
            a.principal_id.as_str(),
            a.principal_name.as_str(),
            a.sign_in_name.as_deref().unwrap_or(""),
            a.assignment_id.as_str(),
            "Unknown",
        ];
        let row: Vec<String> = fields.iter().map(|f| escape_csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn breakdown_table(out: &mut String, title: &str, entries: &[crate::aggregate::BreakdownEntry]) {
    out.push_str(&format!("<h2>{}</h2>\n<table>\n", escape_html(title)));
    out.push_str("<tr><th>Name</th><th>Count</th></tr>\n");
    for entry in entries {
        out.push_str(&format!(
            "<tr><td>{}</td><td>{}</td></tr>\n",
            escape_html(&entry.key),
            entry.count
        ));
    }
    out.push_str("</table>\n");
}

/// Render the self-contained HTML report: summary counts, the three
/// breakdown tables and the full assignment table. Owner and Contributor
/// rows get a highlight background.
pub fn render_html(
    subscription_name: &str,
    subscription_id: &str,
    summary: &RoleAuditSummary,
    assignments: &[RoleAssignment],
) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>Privileged Role Audit</title>\n<style>\n");
    out.push_str("body { font-family: Segoe UI, Arial, sans-serif; margin: 2em; }\n");
    out.push_str("table { border-collapse: collapse; margin-bottom: 1.5em; }\n");
    out.push_str("th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: left; }\n");
    out.push_str("th { background: #f0f0f0; }\n");
    out.push_str("tr.high-risk td { background: #fde0e0; }\n");
    out.push_str("</style>\n</head>\n<body>\n");

    out.push_str(&format!(
        "<h1>Privileged Role Audit &mdash; {}</h1>\n",
        escape_html(subscription_name)
    ));
    out.push_str(&format!(
        "<p>Subscription: {} ({})<br>Generated: {}<br>Total privileged assignments: {}</p>\n",
        escape_html(subscription_name),
        escape_html(subscription_id),
        escape_html(&summary.generated_at),
        summary.total_assignments
    ));

    breakdown_table(&mut out, "Assignments by Role", &summary.by_role);
    breakdown_table(
        &mut out,
        "Assignments by Principal Type",
        &summary.by_principal_type,
    );
    breakdown_table(&mut out, "Assignments by Scope", &summary.by_scope);

    out.push_str("<h2>All Assignments</h2>\n<table>\n<tr>");
    for column in [
        "Scope",
        "Resource Group",
        "Role",
        "Principal Type",
        "Principal Name",
        "Sign-in Name",
        "Principal Id",
        "Assignment Id",
    ] {
        out.push_str(&format!("<th>{}</th>", column));
    }
    out.push_str("</tr>\n");

    for a in assignments {
        let row_class = if is_high_risk_role(&a.role_name) {
            " class=\"high-risk\""
        } else {
            ""
        };
        out.push_str(&format!(
            "<tr{}><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            row_class,
            escape_html(a.scope.label()),
            escape_html(a.resource_group_name.as_deref().unwrap_or("")),
            escape_html(&a.role_name),
            escape_html(a.principal_type.as_str()),
            escape_html(&a.principal_name),
            escape_html(a.sign_in_name.as_deref().unwrap_or("")),
            escape_html(&a.principal_id),
            escape_html(&a.assignment_id),
        ));
    }
    out.push_str("</table>\n</body>\n</html>\n");
    out
}

fn write_file(path: &Path, contents: &str, label: &str) -> Option<AuditWarning> {
    match std::fs::write(path, contents) {
        Ok(()) => {
            info!(path = %path.display(), "{} report written", label);
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "{} report write failed", label);
            Some(AuditWarning {
                subject: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    }
}

/// Write the selected report files. Each format is attempted independently;
/// failures come back as warnings, never as errors.
pub fn write_reports(
    format: OutputFormat,
    csv_path: &Path,
    html_path: &Path,
    subscription_name: &str,
    subscription_id: &str,
    summary: &RoleAuditSummary,
    assignments: &[RoleAssignment],
) -> Vec<AuditWarning> {
    let mut warnings = Vec::new();

    if format.wants_csv() {
        let csv = render_csv(assignments);
        if let Some(warning) = write_file(csv_path, &csv, "CSV") {
            warnings.push(warning);
        }
    }

    if format.wants_html() {
        let html = render_html(subscription_name, subscription_id, summary, assignments);
        if let Some(warning) = write_file(html_path, &html, "HTML") {
            warnings.push(warning);
        }
    }

    warnings
}
