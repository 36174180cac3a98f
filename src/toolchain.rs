//! OpenSSL Toolchain Module
//!
//! Key generation, signing and PKCS#12 packaging are delegated to the
//! `openssl` command-line tool. This module builds the argument lists for each
//! step and runs them with the CA work directory as current directory.
//!
//! Passwords never appear on the command line: `req` reads the key password
//! from the `.pass` file and `pkcs12` receives it through the child's
//! environment.

use crate::authority::ArtifactPaths;
use crate::error::{CaError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

pub const CONFIG_FILE: &str = "openssl.cnf";
pub const CA_CERT_FILE: &str = "db/ca.crt";
pub const CA_KEY_FILE: &str = "db/ca.key";

pub const KEY_PASS_ENV: &str = "WEB_CA_KEY_PASS";
pub const P12_PASS_ENV: &str = "WEB_CA_P12_PASS";

/// The external `openssl` binary
#[derive(Debug, Clone)]
pub struct OpenSsl {
    binary: PathBuf,
}

impl OpenSsl {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run one invocation in `cwd`, returning its combined stdout and stderr.
    ///
    /// A non-zero exit status is reported as [`CaError::Toolchain`] carrying the
    /// same output.
    pub async fn run(&self, cwd: &Path, args: &[String], envs: &[(&str, &str)]) -> Result<String> {
        let command = self.describe(args);
        tracing::debug!(%command, cwd = %cwd.display(), "running openssl");

        let output = Command::new(&self.binary)
            .current_dir(cwd)
            .args(args)
            .envs(envs.iter().copied())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CaError::Spawn {
                command: command.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            Err(CaError::Toolchain {
                command,
                status: output.status,
                output: combined,
            })
        }
    }

    /// `openssl version`, to check the tool is usable
    pub async fn version(&self, cwd: &Path) -> Result<String> {
        let output = self.run(cwd, &["version".to_string()], &[]).await?;
        Ok(output.trim().to_string())
    }

    // Binary and subcommand only; arguments may carry subject data.
    fn describe(&self, args: &[String]) -> String {
        match args.first() {
            Some(subcommand) => format!("{} {}", self.binary.display(), subcommand),
            None => self.binary.display().to_string(),
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Key and CSR generation; the key is encrypted with the password in `paths.pass`
pub fn req_args(paths: &ArtifactPaths, subject: &str, key_bits: u32, extensions: &str) -> Vec<String> {
    vec![
        "req".into(),
        "-config".into(),
        CONFIG_FILE.into(),
        "-new".into(),
        "-newkey".into(),
        format!("rsa:{key_bits}"),
        "-extensions".into(),
        extensions.into(),
        "-subj".into(),
        subject.into(),
        "-passout".into(),
        format!("file:{}", path_arg(&paths.pass)),
        "-keyout".into(),
        path_arg(&paths.key),
        "-out".into(),
        path_arg(&paths.csr),
    ]
}

/// Signing of the CSR by the local CA
pub fn ca_args(paths: &ArtifactPaths, days_valid: u32) -> Vec<String> {
    vec![
        "ca".into(),
        "-config".into(),
        CONFIG_FILE.into(),
        "-batch".into(),
        "-days".into(),
        days_valid.to_string(),
        "-out".into(),
        path_arg(&paths.crt),
        "-infiles".into(),
        path_arg(&paths.csr),
    ]
}

/// PKCS#12 export of key, certificate and CA certificate.
///
/// Expects [`KEY_PASS_ENV`] and [`P12_PASS_ENV`] in the child environment.
pub fn pkcs12_args(paths: &ArtifactPaths) -> Vec<String> {
    vec![
        "pkcs12".into(),
        "-export".into(),
        "-inkey".into(),
        path_arg(&paths.key),
        "-CAfile".into(),
        CA_CERT_FILE.into(),
        "-certfile".into(),
        CA_CERT_FILE.into(),
        "-in".into(),
        path_arg(&paths.crt),
        "-out".into(),
        path_arg(&paths.p12),
        "-passin".into(),
        format!("env:{KEY_PASS_ENV}"),
        "-passout".into(),
        format!("env:{P12_PASS_ENV}"),
    ]
}

/// Self-signed CA certificate with an unencrypted key, so `ca -batch` can sign unattended
pub fn self_signed_ca_args(subject: &str, key_bits: u32, validity_days: u32) -> Vec<String> {
    vec![
        "req".into(),
        "-config".into(),
        CONFIG_FILE.into(),
        "-x509".into(),
        "-new".into(),
        "-newkey".into(),
        format!("rsa:{key_bits}"),
        "-nodes".into(),
        "-extensions".into(),
        "v3_ca".into(),
        "-days".into(),
        validity_days.to_string(),
        "-subj".into(),
        subject.into(),
        "-keyout".into(),
        CA_KEY_FILE.into(),
        "-out".into(),
        CA_CERT_FILE.into(),
    ]
}
