//! LDAP helpers: filter escaping and MS-DTYP binary structures
//!
//! The gMSA password-retrieval group is stored on the account as a binary
//! security descriptor (`msDS-GroupMSAMembership`). This module builds that
//! descriptor when provisioning and decodes it when validating.

use crate::errors::{AuditError, Result};

/// Escape a value for safe use inside an LDAP search filter (RFC 4515)
pub fn escape_ldap_filter(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            _ => out.push(c),
        }
    }
    out
}

/// SE_DACL_PRESENT | SE_SELF_RELATIVE
const SD_CONTROL: u16 = 0x8004;
/// ACCESS_ALLOWED_ACE granting full control, the mask AD uses for
/// password-retrieval principals
const PASSWORD_RETRIEVAL_MASK: u32 = 0x000F_01FF;
/// LocalSystem, used as owner and primary group of the built descriptor
const SYSTEM_SID: &str = "S-1-5-18";

/// Convert a binary SID (MS-DTYP 2.4.2) to its S-1-... string form
pub fn sid_to_string(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 8 {
        return Err(AuditError::ParseError(
            "SID too short (minimum 8 bytes)".to_string(),
        ));
    }
    let revision = bytes[0];
    let sub_auth_count = bytes[1] as usize;
    if bytes.len() < 8 + sub_auth_count * 4 {
        return Err(AuditError::ParseError(format!(
            "SID data insufficient for {} sub-authorities",
            sub_auth_count
        )));
    }

    // 48-bit identifier authority, big-endian
    let id_auth = u64::from_be_bytes([
        0, 0, bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);

    let mut sid = format!("S-{}-{}", revision, id_auth);
    for i in 0..sub_auth_count {
        let offset = 8 + i * 4;
        let sub_auth = u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        sid.push_str(&format!("-{}", sub_auth));
    }
    Ok(sid)
}

/// Encode an S-1-... SID string into its binary form
pub fn encode_sid(sid: &str) -> Result<Vec<u8>> {
    let parts: Vec<&str> = sid.split('-').collect();
    if parts.len() < 3 || parts[0] != "S" {
        return Err(AuditError::ParseError(format!("malformed SID: {}", sid)));
    }
    let revision: u8 = parts[1]
        .parse()
        .map_err(|_| AuditError::ParseError(format!("malformed SID revision: {}", sid)))?;
    let id_auth: u64 = parts[2]
        .parse()
        .map_err(|_| AuditError::ParseError(format!("malformed SID authority: {}", sid)))?;
    // Identifier authority is a 48-bit field
    if id_auth >= 1 << 48 {
        return Err(AuditError::ParseError(format!(
            "SID authority out of range: {}",
            sid
        )));
    }
    let sub_auths: Vec<u32> = parts[3..]
        .iter()
        .map(|p| {
            p.parse()
                .map_err(|_| AuditError::ParseError(format!("malformed SID sub-authority: {}", sid)))
        })
        .collect::<Result<_>>()?;
    if sub_auths.len() > 15 {
        return Err(AuditError::ParseError(format!(
            "SID has too many sub-authorities: {}",
            sid
        )));
    }

    let mut out = Vec::with_capacity(8 + sub_auths.len() * 4);
    out.push(revision);
    out.push(sub_auths.len() as u8);
    out.extend_from_slice(&id_auth.to_be_bytes()[2..8]);
    for sub in sub_auths {
        out.extend_from_slice(&sub.to_le_bytes());
    }
    Ok(out)
}

/// Build the self-relative security descriptor stored in
/// `msDS-GroupMSAMembership`: one ACCESS_ALLOWED ACE granting the trustee
/// (the password-retrieval group) full control.
///
/// Layout (MS-DTYP 2.4.6): 20-byte header, then DACL, then owner and group
/// SIDs, all offsets relative to the descriptor start.
pub fn build_password_retrieval_sd(trustee_sid: &[u8]) -> Result<Vec<u8>> {
    if sid_to_string(trustee_sid).is_err() {
        return Err(AuditError::ValidationError(
            "trustee SID is not a valid binary SID".to_string(),
        ));
    }
    let system_sid = encode_sid(SYSTEM_SID)?;

    let ace_size = 8 + trustee_sid.len();
    let acl_size = 8 + ace_size;
    let dacl_offset = 20u32;
    let owner_offset = dacl_offset + acl_size as u32;
    let group_offset = owner_offset + system_sid.len() as u32;

    let mut sd = Vec::with_capacity(group_offset as usize + system_sid.len());

    // Header
    sd.push(1); // revision
    sd.push(0); // sbz1
    sd.extend_from_slice(&SD_CONTROL.to_le_bytes());
    sd.extend_from_slice(&owner_offset.to_le_bytes());
    sd.extend_from_slice(&group_offset.to_le_bytes());
    sd.extend_from_slice(&0u32.to_le_bytes()); // no SACL
    sd.extend_from_slice(&dacl_offset.to_le_bytes());

    // DACL header (MS-DTYP 2.4.5)
    sd.push(2); // ACL_REVISION
    sd.push(0); // sbz1
    sd.extend_from_slice(&(acl_size as u16).to_le_bytes());
    sd.extend_from_slice(&1u16.to_le_bytes()); // one ACE
    sd.extend_from_slice(&0u16.to_le_bytes()); // sbz2

    // ACCESS_ALLOWED_ACE
    sd.push(0x00); // type
    sd.push(0x00); // flags
    sd.extend_from_slice(&(ace_size as u16).to_le_bytes());
    sd.extend_from_slice(&PASSWORD_RETRIEVAL_MASK.to_le_bytes());
    sd.extend_from_slice(trustee_sid);

    // Owner and group
    sd.extend_from_slice(&system_sid);
    sd.extend_from_slice(&system_sid);

    Ok(sd)
}

/// Extract the trustee SIDs from the DACL of a security descriptor.
/// Object ACEs and malformed entries are skipped.
pub fn dacl_trustees(bytes: &[u8]) -> Result<Vec<String>> {
    if bytes.len() < 20 {
        return Err(AuditError::ParseError(
            "security descriptor too short (minimum 20 bytes)".to_string(),
        ));
    }
    let dacl_offset =
        u32::from_le_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]) as usize;
    if dacl_offset == 0 || dacl_offset + 8 > bytes.len() {
        return Ok(Vec::new());
    }

    let acl = &bytes[dacl_offset..];
    let ace_count = u16::from_le_bytes([acl[4], acl[5]]) as usize;
    let mut trustees = Vec::with_capacity(ace_count);
    let mut offset = 8;

    for _ in 0..ace_count {
        if offset + 8 > acl.len() {
            break;
        }
        let ace_type = acl[offset];
        let ace_size = u16::from_le_bytes([acl[offset + 2], acl[offset + 3]]) as usize;
        if ace_size < 12 || offset + ace_size > acl.len() {
            break;
        }
        // Standard ACEs only: type(1) flags(1) size(2) mask(4) sid(...)
        if ace_type <= 0x04 {
            if let Ok(sid) = sid_to_string(&acl[offset + 8..offset + ace_size]) {
                trustees.push(sid);
            }
        }
        offset += ace_size;
    }
    Ok(trustees)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_ldap_filter() {
        assert_eq!(escape_ldap_filter("mdiSvc01"), "mdiSvc01");
        assert_eq!(escape_ldap_filter("admin*"), "admin\\2a");
        assert_eq!(
            escape_ldap_filter("*)(objectClass=*"),
            "\\2a\\29\\28objectClass=\\2a"
        );
        assert_eq!(escape_ldap_filter("a\\b"), "a\\5cb");
    }

    #[test]
    fn test_sid_round_trip() {
        for sid in [
            "S-1-5-18",
            "S-1-5-21-3623811015-3361044348-30300820-1013",
            "S-1-1-0",
        ] {
            let bytes = encode_sid(sid).unwrap();
            assert_eq!(sid_to_string(&bytes).unwrap(), sid);
        }
    }

    #[test]
    fn test_encode_sid_rejects_garbage() {
        assert!(encode_sid("").is_err());
        assert!(encode_sid("X-1-5-18").is_err());
        assert!(encode_sid("S-1").is_err());
        assert!(encode_sid("S-1-5-notanumber").is_err());
    }

    #[test]
    fn test_encode_sid_authority_bounds() {
        // Largest 48-bit authority still round-trips
        let max = "S-1-281474976710655-5";
        assert_eq!(sid_to_string(&encode_sid(max).unwrap()).unwrap(), max);

        // 2^48 would be truncated by the 6-byte encoding
        assert!(encode_sid("S-1-281474976710656-5").is_err());
    }

    #[test]
    fn test_sid_to_string_rejects_short_input() {
        assert!(sid_to_string(&[1, 2, 3]).is_err());
        // Claims 4 sub-authorities but carries none
        assert!(sid_to_string(&[1, 4, 0, 0, 0, 0, 0, 5]).is_err());
    }

    #[test]
    fn test_built_descriptor_grants_trustee() {
        let group_sid = "S-1-5-21-1111111111-2222222222-3333333333-4444";
        let trustee = encode_sid(group_sid).unwrap();
        let sd = build_password_retrieval_sd(&trustee).unwrap();

        assert_eq!(sd[0], 1); // revision
        assert_eq!(u16::from_le_bytes([sd[2], sd[3]]), SD_CONTROL);

        let trustees = dacl_trustees(&sd).unwrap();
        assert_eq!(trustees, vec![group_sid.to_string()]);
    }

    #[test]
    fn test_built_descriptor_owner_is_system() {
        let trustee = encode_sid("S-1-5-21-1-2-3-500").unwrap();
        let sd = build_password_retrieval_sd(&trustee).unwrap();
        let owner_offset = u32::from_le_bytes([sd[4], sd[5], sd[6], sd[7]]) as usize;
        assert_eq!(sid_to_string(&sd[owner_offset..]).unwrap(), SYSTEM_SID);
    }

    #[test]
    fn test_dacl_trustees_on_empty_dacl() {
        // Header-only descriptor with a zero DACL offset
        let mut sd = vec![1u8, 0];
        sd.extend_from_slice(&SD_CONTROL.to_le_bytes());
        sd.extend_from_slice(&[0u8; 16]);
        assert!(dacl_trustees(&sd).unwrap().is_empty());
    }

    #[test]
    fn test_build_rejects_invalid_trustee() {
        assert!(build_password_retrieval_sd(&[0, 1]).is_err());
    }
}
