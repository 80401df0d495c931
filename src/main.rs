//! `identity-audit` command-line entry point

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use identity_audit::audit::{run_privileged_role_audit, AuditOptions};
use identity_audit::cloud::ArmClient;
use identity_audit::directory::GraphClient;
use identity_audit::gmsa::{create_dsa, validate_dsa, DsaConfig};
use identity_audit::report::OutputFormat;
use identity_audit::session;

#[derive(Parser)]
#[command(
    name = "identity-audit",
    version,
    about = "Operational tooling for Microsoft identity infrastructure"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit privileged Azure role assignments and render CSV/HTML reports
    AuditRoles {
        /// Target subscription; defaults to AZURE_SUBSCRIPTION_ID
        #[arg(long)]
        subscription_id: Option<String>,

        /// CSV output path (default: timestamped file in the current directory)
        #[arg(long)]
        output_csv: Option<PathBuf>,

        /// HTML output path (default: timestamped file in the current directory)
        #[arg(long)]
        output_html: Option<PathBuf>,

        /// Collect subscription-level assignments only
        #[arg(long)]
        skip_resource_groups: bool,

        #[arg(long, value_enum, default_value_t = OutputFormat::Both)]
        output_format: OutputFormat,
    },

    /// Provision a gMSA as the sensor's Directory Services Account
    CreateDsa(DsaArgs),

    /// Validate an existing DSA gMSA's configuration
    TestDsa(DsaArgs),
}

#[derive(clap::Args)]
struct DsaArgs {
    /// Domain controller LDAP URL, e.g. ldap://dc01.corp.contoso.com
    #[arg(long)]
    ldap_url: String,

    #[arg(long)]
    bind_dn: String,

    /// Bind password; falls back to LDAP_BIND_PASSWORD
    #[arg(long)]
    bind_password: Option<String>,

    /// Domain naming context, e.g. DC=corp,DC=contoso,DC=com
    #[arg(long)]
    base_dn: String,

    /// gMSA name without the trailing $
    #[arg(long, default_value = "mdiSvc01")]
    account_name: String,

    /// dNSHostName for the account; defaults to <account>.<domain from base DN>
    #[arg(long)]
    dns_host_name: Option<String>,

    /// Security group allowed to retrieve the managed password
    #[arg(long, default_value = "mdiSvcGroup")]
    group_name: String,

    /// Sensor computer name allowed to retrieve the password (repeatable)
    #[arg(long = "allowed-host")]
    allowed_hosts: Vec<String>,
}

impl DsaArgs {
    fn into_config(self) -> anyhow::Result<DsaConfig> {
        let bind_password = match self.bind_password {
            Some(pw) => pw,
            None => std::env::var("LDAP_BIND_PASSWORD")
                .map_err(|_| anyhow::anyhow!("no bind password: use --bind-password or LDAP_BIND_PASSWORD"))?,
        };
        let dns_host_name = self.dns_host_name.unwrap_or_else(|| {
            let domain: Vec<&str> = self
                .base_dn
                .split(',')
                .filter_map(|part| part.trim().strip_prefix("DC="))
                .collect();
            format!("{}.{}", self.account_name, domain.join("."))
        });
        Ok(DsaConfig {
            ldap_url: self.ldap_url,
            bind_dn: self.bind_dn,
            bind_password,
            base_dn: self.base_dn,
            account_name: self.account_name,
            dns_host_name,
            group_name: self.group_name,
            allowed_hosts: self.allowed_hosts,
        })
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::AuditRoles {
            subscription_id,
            output_csv,
            output_html,
            skip_resource_groups,
            output_format,
        } => {
            let arm_token = session::access_token_from_env()?;
            let graph_token = session::graph_token_from_env()?;
            let cloud = ArmClient::new(arm_token);
            let directory = GraphClient::new(graph_token);

            let options = AuditOptions {
                subscription_id,
                include_resource_groups: !skip_resource_groups,
                output_format,
                output_csv,
                output_html,
            };
            let outcome = run_privileged_role_audit(&cloud, &directory, &options).await?;

            info!(
                subscription = %outcome.session.subscription_name,
                assignments = outcome.assignments.len(),
                warnings = outcome.warnings.len(),
                "privileged role audit complete"
            );
            for entry in &outcome.summary.by_role {
                info!(role = %entry.key, count = entry.count, "role breakdown");
            }
            Ok(())
        }

        Command::CreateDsa(args) => {
            let config = args.into_config()?;
            create_dsa(&config)?;
            Ok(())
        }

        Command::TestDsa(args) => {
            let config = args.into_config()?;
            let checks = validate_dsa(&config)?;
            let mut all_passed = true;
            for check in &checks {
                let status = if check.passed { "PASS" } else { "FAIL" };
                println!("[{}] {}: {}", status, check.name, check.detail);
                all_passed &= check.passed;
            }
            if !all_passed {
                anyhow::bail!("one or more DSA configuration checks failed");
            }
            Ok(())
        }
    }
}
