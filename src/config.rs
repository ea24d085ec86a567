//! Credential and certificate material loaded from the filesystem.
//!
//! Option-sets reference a password file and an optional CA bundle by
//! path; the loops re-read them at dispatch time so rotations take
//! effect without a restart.

use std::fs;

use crate::amt::Optionset;
use crate::error::{ConfigError, Result};

/// Username assumed when an option-set or job leaves it blank
pub const DEFAULT_USERNAME: &str = "admin";

/// Read an AMT password from a file, trimming surrounding whitespace
/// (editors love trailing newlines).
pub fn read_password_file(path: &str) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::PasswordFile {
        path: path.to_string(),
        source,
    })?;
    Ok(raw.trim().to_string())
}

/// Read a PEM CA bundle; parse validation happens when the HTTP client
/// is built.
pub fn read_ca_file(path: &str) -> Result<Vec<u8>> {
    let pem = fs::read(path).map_err(|source| ConfigError::CaCertFile {
        path: path.to_string(),
        source,
    })?;
    Ok(pem)
}

/// Resolve the file-backed fields of an option-set before dispatch.
///
/// The CA bundle is only loaded when it can actually be used: TLS on,
/// verification not skipped, and a path configured.
pub fn resolve_credentials(set: &mut Optionset) -> Result<()> {
    if set.username.is_empty() {
        set.username = DEFAULT_USERNAME.to_string();
    }
    if !set.passfile.is_empty() {
        set.password = read_password_file(&set.passfile)?;
    }
    if set.use_tls && !set.skip_cert_check && !set.cacert_file.is_empty() {
        set.ca_pem = Some(read_ca_file(&set.cacert_file)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn temp_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_password_file_is_trimmed() {
        let file = temp_file("s3cret\n");
        let password = read_password_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(password, "s3cret");
    }

    #[test]
    fn test_missing_password_file_names_path() {
        let err = read_password_file("/nonexistent/amtpass").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/amtpass"));
    }

    #[test]
    fn test_resolve_defaults_username() {
        let mut set = Optionset::default();
        resolve_credentials(&mut set).unwrap();
        assert_eq!(set.username, "admin");
    }

    #[test]
    fn test_resolve_keeps_explicit_username() {
        let mut set = Optionset {
            username: "operator".to_string(),
            ..Optionset::default()
        };
        resolve_credentials(&mut set).unwrap();
        assert_eq!(set.username, "operator");
    }

    #[test]
    fn test_resolve_loads_password_from_file() {
        let file = temp_file("hunter2\n");
        let mut set = Optionset {
            passfile: file.path().to_str().unwrap().to_string(),
            ..Optionset::default()
        };
        resolve_credentials(&mut set).unwrap();
        assert_eq!(set.password, "hunter2");
    }

    #[test]
    fn test_ca_only_loaded_when_tls_verification_active() {
        let ca = temp_file("-----BEGIN CERTIFICATE-----\n");
        let path = ca.path().to_str().unwrap().to_string();

        // plain HTTP: path ignored
        let mut set = Optionset {
            cacert_file: path.clone(),
            ..Optionset::default()
        };
        resolve_credentials(&mut set).unwrap();
        assert!(set.ca_pem.is_none());

        // TLS but verification skipped: still ignored
        let mut set = Optionset {
            use_tls: true,
            skip_cert_check: true,
            cacert_file: path.clone(),
            ..Optionset::default()
        };
        resolve_credentials(&mut set).unwrap();
        assert!(set.ca_pem.is_none());

        // TLS with verification: loaded
        let mut set = Optionset {
            use_tls: true,
            cacert_file: path,
            ..Optionset::default()
        };
        resolve_credentials(&mut set).unwrap();
        assert!(set.ca_pem.is_some());
    }
}
