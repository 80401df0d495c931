//! gMSA Directory Services Account provisioning and validation
//!
//! Two sequential LDAP flows against a domain controller:
//!
//! - `create_dsa` provisions a group-managed service account for use as the
//!   sensor's Directory Services Account: verifies the KDS root key
//!   prerequisite, ensures the password-retrieval group exists with the
//!   sensor hosts as members, creates the account and points its
//!   `msDS-GroupMSAMembership` descriptor at the group.
//! - `validate_dsa` reads the account back and reports a pass/fail check
//!   list covering object class, enablement, Kerberos encryption types,
//!   DNS host name and the password-retrieval configuration.
//!
//! Both flows are linear scripts: one bind, a handful of operations in
//! order, no retries. Already-existing objects are tolerated and logged so
//! the provisioning script can be re-run.

use std::collections::{HashMap, HashSet};

use ldap3::{LdapConn, Mod, Scope, SearchEntry};
use tracing::{info, warn};

use crate::errors::{AuditError, Result};
use crate::ldap_support::{build_password_retrieval_sd, dacl_trustees, escape_ldap_filter};

const GMSA_OBJECT_CLASS: &str = "msDS-GroupManagedServiceAccount";
const MEMBERSHIP_ATTR: &str = "msDS-GroupMSAMembership";

/// Account is disabled (userAccountControl bit)
const UAC_ACCOUNTDISABLE: u32 = 0x0002;
/// AES128 + AES256 (msDS-SupportedEncryptionTypes bits)
const KERB_AES_MASK: u32 = 0x18;
/// DES-CRC + DES-MD5 + RC4
const KERB_LEGACY_MASK: u32 = 0x07;

/// LDAP result codes tolerated on re-runs
const RC_ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
const RC_ENTRY_ALREADY_EXISTS: u32 = 68;

/// Parameters for the DSA provisioning and validation flows
#[derive(Debug, Clone)]
pub struct DsaConfig {
    /// e.g. `ldap://dc01.corp.contoso.com`
    pub ldap_url: String,
    pub bind_dn: String,
    pub bind_password: String,
    /// Domain naming context, e.g. `DC=corp,DC=contoso,DC=com`
    pub base_dn: String,
    /// gMSA name without the trailing `$`
    pub account_name: String,
    pub dns_host_name: String,
    /// Security group allowed to retrieve the managed password
    pub group_name: String,
    /// Computer names (without `$`) to add to the group
    pub allowed_hosts: Vec<String>,
}

impl DsaConfig {
    fn sam_account_name(&self) -> String {
        format!("{}$", self.account_name)
    }

    fn account_dn(&self) -> String {
        format!(
            "CN={},CN=Managed Service Accounts,{}",
            self.account_name, self.base_dn
        )
    }

    fn group_dn(&self) -> String {
        format!("CN={},CN=Users,{}", self.group_name, self.base_dn)
    }

    fn kds_root_keys_dn(&self) -> String {
        format!(
            "CN=Master Root Keys,CN=Group Key Distribution Service,CN=Services,CN=Configuration,{}",
            self.base_dn
        )
    }
}

/// One validation check result
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GmsaCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl GmsaCheck {
    fn new(name: &str, passed: bool, detail: String) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail,
        }
    }
}

fn bind(config: &DsaConfig) -> Result<LdapConn> {
    let mut ldap = LdapConn::new(&config.ldap_url)?;
    ldap.simple_bind(&config.bind_dn, &config.bind_password)?
        .success()?;
    info!(url = %config.ldap_url, bind_dn = %config.bind_dn, "LDAP bind established");
    Ok(ldap)
}

fn search_one(
    ldap: &mut LdapConn,
    base: &str,
    scope: Scope,
    filter: &str,
    attrs: Vec<&str>,
) -> Result<Option<SearchEntry>> {
    let (entries, _) = ldap.search(base, scope, filter, attrs)?.success()?;
    Ok(entries.into_iter().next().map(SearchEntry::construct))
}

/// Provision the gMSA as a Directory Services Account
pub fn create_dsa(config: &DsaConfig) -> Result<()> {
    let mut ldap = bind(config)?;

    ensure_kds_root_key(&mut ldap, config)?;
    ensure_group(&mut ldap, config)?;
    add_hosts_to_group(&mut ldap, config)?;
    let group_sid = fetch_group_sid(&mut ldap, config)?;
    create_gmsa_account(&mut ldap, config)?;
    set_password_retrieval_group(&mut ldap, config, &group_sid)?;

    let _ = ldap.unbind();
    info!(
        account = %config.sam_account_name(),
        group = %config.group_name,
        "DSA gMSA provisioning complete"
    );
    Ok(())
}

/// A gMSA cannot be created until the domain has a KDS root key.
/// Search failures (access denied, wrong base DN) propagate as-is so the
/// operator is not told to create a key that may already exist.
fn ensure_kds_root_key(ldap: &mut LdapConn, config: &DsaConfig) -> Result<()> {
    let found = search_one(
        ldap,
        &config.kds_root_keys_dn(),
        Scope::OneLevel,
        "(objectClass=msKds-ProvRootKey)",
        vec!["cn"],
    )?;
    require_kds_root_key(found)
}

fn require_kds_root_key(found: Option<SearchEntry>) -> Result<()> {
    match found {
        Some(_) => {
            info!("KDS root key present");
            Ok(())
        }
        None => Err(AuditError::ValidationError(
            "no KDS root key found; create one (Add-KdsRootKey) and wait for replication before provisioning a gMSA"
                .to_string(),
        )),
    }
}

fn ensure_group(ldap: &mut LdapConn, config: &DsaConfig) -> Result<()> {
    let group_dn = config.group_dn();
    let existing = search_one(ldap, &group_dn, Scope::Base, "(objectClass=group)", vec!["cn"]);
    if let Ok(Some(_)) = existing {
        info!(group = %group_dn, "password-retrieval group already exists");
        return Ok(());
    }

    let attrs: Vec<(&str, HashSet<&str>)> = vec![
        ("objectClass", HashSet::from(["top", "group"])),
        ("sAMAccountName", HashSet::from([config.group_name.as_str()])),
        // Global security group
        ("groupType", HashSet::from(["-2147483646"])),
        (
            "description",
            HashSet::from(["Principals allowed to retrieve the DSA gMSA managed password"]),
        ),
    ];
    match ldap.add(&group_dn, attrs)?.success() {
        Ok(_) => {
            info!(group = %group_dn, "password-retrieval group created");
            Ok(())
        }
        Err(ldap3::LdapError::LdapResult { result })
            if result.rc == RC_ENTRY_ALREADY_EXISTS =>
        {
            info!(group = %group_dn, "password-retrieval group already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn add_hosts_to_group(ldap: &mut LdapConn, config: &DsaConfig) -> Result<()> {
    let group_dn = config.group_dn();
    for host in &config.allowed_hosts {
        let sam = format!("{}$", host.trim_end_matches('$'));
        let filter = format!(
            "(&(objectClass=computer)(sAMAccountName={}))",
            escape_ldap_filter(&sam)
        );
        let computer = search_one(
            ldap,
            &config.base_dn,
            Scope::Subtree,
            &filter,
            vec!["distinguishedName"],
        )?;
        let Some(entry) = computer else {
            warn!(host = %host, "computer account not found, skipping group membership");
            continue;
        };

        let member_dn = entry.dn.clone();
        match ldap
            .modify(
                &group_dn,
                vec![Mod::Add("member", HashSet::from([member_dn.as_str()]))],
            )?
            .success()
        {
            Ok(_) => info!(host = %host, "added to password-retrieval group"),
            Err(ldap3::LdapError::LdapResult { result })
                if result.rc == RC_ATTRIBUTE_OR_VALUE_EXISTS =>
            {
                info!(host = %host, "already a member of the password-retrieval group");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn fetch_group_sid(ldap: &mut LdapConn, config: &DsaConfig) -> Result<Vec<u8>> {
    let entry = search_one(
        ldap,
        &config.group_dn(),
        Scope::Base,
        "(objectClass=group)",
        vec!["objectSid"],
    )?
    .ok_or_else(|| {
        AuditError::ValidationError(format!(
            "password-retrieval group {} not found after creation",
            config.group_dn()
        ))
    })?;

    // objectSid is binary and normally lands in bin_attrs; short values can
    // decode as UTF-8 and end up in attrs instead
    if let Some(values) = entry.bin_attrs.get("objectSid") {
        if let Some(sid) = values.first() {
            return Ok(sid.clone());
        }
    }
    if let Some(values) = entry.attrs.get("objectSid") {
        if let Some(sid) = values.first() {
            return Ok(sid.clone().into_bytes());
        }
    }
    Err(AuditError::ValidationError(format!(
        "group {} has no objectSid",
        config.group_dn()
    )))
}

fn create_gmsa_account(ldap: &mut LdapConn, config: &DsaConfig) -> Result<()> {
    let account_dn = config.account_dn();
    let sam = config.sam_account_name();

    let attrs: Vec<(&str, HashSet<&str>)> = vec![
        ("objectClass", HashSet::from([GMSA_OBJECT_CLASS])),
        ("sAMAccountName", HashSet::from([sam.as_str()])),
        ("dNSHostName", HashSet::from([config.dns_host_name.as_str()])),
        ("msDS-ManagedPasswordInterval", HashSet::from(["30"])),
        // AES128 + AES256 only
        ("msDS-SupportedEncryptionTypes", HashSet::from(["24"])),
        // WORKSTATION_TRUST_ACCOUNT
        ("userAccountControl", HashSet::from(["4096"])),
    ];
    match ldap.add(&account_dn, attrs)?.success() {
        Ok(_) => {
            info!(account = %account_dn, "gMSA account created");
            Ok(())
        }
        Err(ldap3::LdapError::LdapResult { result })
            if result.rc == RC_ENTRY_ALREADY_EXISTS =>
        {
            warn!(account = %account_dn, "gMSA already exists, updating membership descriptor only");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn set_password_retrieval_group(
    ldap: &mut LdapConn,
    config: &DsaConfig,
    group_sid: &[u8],
) -> Result<()> {
    let sd = build_password_retrieval_sd(group_sid)?;
    ldap.modify(
        &config.account_dn(),
        vec![Mod::Replace(
            MEMBERSHIP_ATTR.as_bytes().to_vec(),
            HashSet::from([sd]),
        )],
    )?
    .success()?;
    info!(account = %config.account_dn(), "password-retrieval descriptor set");
    Ok(())
}

/// Validate an existing gMSA against the DSA requirements.
/// Returns the full check list; the account missing entirely is an error.
pub fn validate_dsa(config: &DsaConfig) -> Result<Vec<GmsaCheck>> {
    let mut ldap = bind(config)?;

    let filter = format!(
        "(sAMAccountName={})",
        escape_ldap_filter(&config.sam_account_name())
    );
    let entry = search_one(
        &mut ldap,
        &config.base_dn,
        Scope::Subtree,
        &filter,
        vec![
            "objectClass",
            "userAccountControl",
            "msDS-SupportedEncryptionTypes",
            "dNSHostName",
            MEMBERSHIP_ATTR,
        ],
    )?
    .ok_or_else(|| {
        AuditError::ValidationError(format!(
            "gMSA {} not found under {}",
            config.sam_account_name(),
            config.base_dn
        ))
    })?;

    let mut checks = vec![
        check_object_class(&entry.attrs),
        check_enabled(&entry.attrs),
        check_encryption_types(&entry.attrs),
        check_dns_host_name(&entry.attrs),
        check_password_retrieval_sd(&entry.attrs, &entry.bin_attrs),
    ];

    // Group must exist and actually contain retrieval principals
    let group = search_one(
        &mut ldap,
        &config.group_dn(),
        Scope::Base,
        "(objectClass=group)",
        vec!["member"],
    )?;
    let member_count = group
        .as_ref()
        .and_then(|g| g.attrs.get("member"))
        .map(|m| m.len())
        .unwrap_or(0);
    checks.push(check_group_membership(member_count, &config.group_name));

    let _ = ldap.unbind();

    for check in &checks {
        if check.passed {
            info!(check = %check.name, detail = %check.detail, "check passed");
        } else {
            warn!(check = %check.name, detail = %check.detail, "check FAILED");
        }
    }
    Ok(checks)
}

fn check_object_class(attrs: &HashMap<String, Vec<String>>) -> GmsaCheck {
    let is_gmsa = attrs
        .get("objectClass")
        .map(|classes| classes.iter().any(|c| c == GMSA_OBJECT_CLASS))
        .unwrap_or(false);
    GmsaCheck::new(
        "object class",
        is_gmsa,
        if is_gmsa {
            format!("account is a {}", GMSA_OBJECT_CLASS)
        } else {
            format!("account is not a {}", GMSA_OBJECT_CLASS)
        },
    )
}

fn check_enabled(attrs: &HashMap<String, Vec<String>>) -> GmsaCheck {
    match parse_first_u32(attrs, "userAccountControl") {
        Some(uac) => {
            let enabled = uac & UAC_ACCOUNTDISABLE == 0;
            GmsaCheck::new(
                "account enabled",
                enabled,
                format!("userAccountControl=0x{:x}", uac),
            )
        }
        None => GmsaCheck::new(
            "account enabled",
            false,
            "userAccountControl attribute missing or unreadable".to_string(),
        ),
    }
}

fn check_encryption_types(attrs: &HashMap<String, Vec<String>>) -> GmsaCheck {
    match parse_first_u32(attrs, "msDS-SupportedEncryptionTypes") {
        Some(enc) => {
            let aes_only = enc & KERB_AES_MASK != 0 && enc & KERB_LEGACY_MASK == 0;
            GmsaCheck::new(
                "AES-only Kerberos encryption",
                aes_only,
                format!("msDS-SupportedEncryptionTypes=0x{:x}", enc),
            )
        }
        None => GmsaCheck::new(
            "AES-only Kerberos encryption",
            false,
            "msDS-SupportedEncryptionTypes attribute missing".to_string(),
        ),
    }
}

fn check_dns_host_name(attrs: &HashMap<String, Vec<String>>) -> GmsaCheck {
    match attrs.get("dNSHostName").and_then(|v| v.first()) {
        Some(name) if !name.is_empty() => {
            GmsaCheck::new("DNS host name", true, format!("dNSHostName={}", name))
        }
        _ => GmsaCheck::new(
            "DNS host name",
            false,
            "dNSHostName attribute missing".to_string(),
        ),
    }
}

fn check_password_retrieval_sd(
    attrs: &HashMap<String, Vec<String>>,
    bin_attrs: &HashMap<String, Vec<Vec<u8>>>,
) -> GmsaCheck {
    let bytes: Option<Vec<u8>> = bin_attrs
        .get(MEMBERSHIP_ATTR)
        .and_then(|v| v.first().cloned())
        .or_else(|| {
            attrs
                .get(MEMBERSHIP_ATTR)
                .and_then(|v| v.first())
                .map(|s| s.clone().into_bytes())
        });
    match bytes {
        Some(sd) => match dacl_trustees(&sd) {
            Ok(trustees) if !trustees.is_empty() => GmsaCheck::new(
                "password-retrieval principals",
                true,
                format!("descriptor grants: {}", trustees.join(", ")),
            ),
            Ok(_) => GmsaCheck::new(
                "password-retrieval principals",
                false,
                "membership descriptor has an empty DACL".to_string(),
            ),
            Err(e) => GmsaCheck::new(
                "password-retrieval principals",
                false,
                format!("membership descriptor unparsable: {}", e),
            ),
        },
        None => GmsaCheck::new(
            "password-retrieval principals",
            false,
            format!("{} attribute missing", MEMBERSHIP_ATTR),
        ),
    }
}

fn check_group_membership(member_count: usize, group_name: &str) -> GmsaCheck {
    GmsaCheck::new(
        "retrieval group membership",
        member_count > 0,
        format!("group '{}' has {} member(s)", group_name, member_count),
    )
}

fn parse_first_u32(attrs: &HashMap<String, Vec<String>>, name: &str) -> Option<u32> {
    attrs
        .get(name)
        .and_then(|v| v.first())
        .and_then(|v| v.parse::<u32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap_support::encode_sid;

    fn attrs(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_dn_construction() {
        let config = DsaConfig {
            ldap_url: "ldap://dc01".to_string(),
            bind_dn: "CN=admin,DC=corp,DC=local".to_string(),
            bind_password: "pw".to_string(),
            base_dn: "DC=corp,DC=local".to_string(),
            account_name: "mdiSvc01".to_string(),
            dns_host_name: "mdiSvc01.corp.local".to_string(),
            group_name: "mdiSvcGroup".to_string(),
            allowed_hosts: vec!["SENSOR01".to_string()],
        };
        assert_eq!(config.sam_account_name(), "mdiSvc01$");
        assert_eq!(
            config.account_dn(),
            "CN=mdiSvc01,CN=Managed Service Accounts,DC=corp,DC=local"
        );
        assert_eq!(config.group_dn(), "CN=mdiSvcGroup,CN=Users,DC=corp,DC=local");
        assert!(config.kds_root_keys_dn().starts_with("CN=Master Root Keys,"));
    }

    #[test]
    fn test_check_object_class() {
        let good = attrs(&[(
            "objectClass",
            &["top", "person", "computer", GMSA_OBJECT_CLASS],
        )]);
        assert!(check_object_class(&good).passed);

        let bad = attrs(&[("objectClass", &["top", "person", "user"])]);
        assert!(!check_object_class(&bad).passed);

        assert!(!check_object_class(&HashMap::new()).passed);
    }

    #[test]
    fn test_check_enabled() {
        // 0x1000 = WORKSTATION_TRUST_ACCOUNT, enabled
        let enabled = attrs(&[("userAccountControl", &["4096"])]);
        assert!(check_enabled(&enabled).passed);

        // 4098 = 4096 | ACCOUNTDISABLE
        let disabled = attrs(&[("userAccountControl", &["4098"])]);
        assert!(!check_enabled(&disabled).passed);

        assert!(!check_enabled(&HashMap::new()).passed);
    }

    #[test]
    fn test_malformed_uac_fails_instead_of_truncating() {
        // 2^32 + 2 would truncate to ACCOUNTDISABLE if parsed as i64 and cast
        let overflow = attrs(&[("userAccountControl", &["4294967298"])]);
        let check = check_enabled(&overflow);
        assert!(!check.passed);
        assert!(check.detail.contains("missing or unreadable"));

        let garbage = attrs(&[("userAccountControl", &["notanumber"])]);
        assert!(!check_enabled(&garbage).passed);
    }

    #[test]
    fn test_kds_root_key_requirement() {
        let entry = SearchEntry {
            dn: "CN=Group Key 1,CN=Master Root Keys,CN=Group Key Distribution Service,CN=Services,CN=Configuration,DC=corp,DC=local".to_string(),
            attrs: HashMap::new(),
            bin_attrs: HashMap::new(),
        };
        assert!(require_kds_root_key(Some(entry)).is_ok());

        let err = require_kds_root_key(None).unwrap_err();
        assert!(matches!(err, AuditError::ValidationError(_)));
        assert!(err.to_string().contains("Add-KdsRootKey"));
    }

    #[test]
    fn test_check_encryption_types() {
        let aes_only = attrs(&[("msDS-SupportedEncryptionTypes", &["24"])]);
        assert!(check_encryption_types(&aes_only).passed);

        // RC4 (0x4) alongside AES
        let mixed = attrs(&[("msDS-SupportedEncryptionTypes", &["28"])]);
        assert!(!check_encryption_types(&mixed).passed);

        let rc4_only = attrs(&[("msDS-SupportedEncryptionTypes", &["4"])]);
        assert!(!check_encryption_types(&rc4_only).passed);

        assert!(!check_encryption_types(&HashMap::new()).passed);
    }

    #[test]
    fn test_check_dns_host_name() {
        let good = attrs(&[("dNSHostName", &["mdiSvc01.corp.local"])]);
        assert!(check_dns_host_name(&good).passed);
        assert!(!check_dns_host_name(&HashMap::new()).passed);
    }

    #[test]
    fn test_check_password_retrieval_sd() {
        let sid = encode_sid("S-1-5-21-1-2-3-1104").unwrap();
        let sd = build_password_retrieval_sd(&sid).unwrap();
        let mut bin_attrs: HashMap<String, Vec<Vec<u8>>> = HashMap::new();
        bin_attrs.insert(MEMBERSHIP_ATTR.to_string(), vec![sd]);

        let check = check_password_retrieval_sd(&HashMap::new(), &bin_attrs);
        assert!(check.passed);
        assert!(check.detail.contains("S-1-5-21-1-2-3-1104"));

        let missing = check_password_retrieval_sd(&HashMap::new(), &HashMap::new());
        assert!(!missing.passed);
    }

    #[test]
    fn test_check_group_membership() {
        assert!(check_group_membership(2, "mdiSvcGroup").passed);
        assert!(!check_group_membership(0, "mdiSvcGroup").passed);
    }
}
