//! Certificate Authority Module
//!
//! Owns the CA work directory and turns validated requests into issued
//! certificates by driving the [`toolchain`](crate::toolchain) step by step.
//!
//! # Work Directory Layout
//! ```text
//! <work_dir>/
//!   openssl.cnf
//!   db/ca.crt  db/ca.key  db/index.txt  db/serial
//!   keys/<cn>.key  keys/<cn>.csr  keys/<cn>.crt  keys/<cn>.p12  keys/<cn>.pass
//! ```
//!
//! Every artifact is named after the certificate's common name, so a common
//! name can be issued only once. Issuance is serialized because `openssl ca`
//! keeps its serial and index in plain files.

use crate::archive::build_zip;
use crate::configs::{CaBootstrap, CaConfig};
use crate::error::{CaError, Result};
use crate::request::{build_subject, is_valid_common_name, CertificateRequest};
use crate::toolchain::{self, OpenSsl, KEY_PASS_ENV, P12_PASS_ENV};
use openssl::x509::{X509NameRef, X509};
use secrecy::ExposeSecret;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub const KEYS_DIR: &str = "keys";
pub const DB_DIR: &str = "db";
pub const INDEX_FILE: &str = "db/index.txt";
pub const SERIAL_FILE: &str = "db/serial";
pub const INITIAL_SERIAL: &str = "01";

const OPENSSL_CNF_TEMPLATE: &str = include_str!("openssl.cnf");

/// Artifact paths for one common name, relative to the work directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub key: PathBuf,
    pub csr: PathBuf,
    pub crt: PathBuf,
    pub p12: PathBuf,
    pub pass: PathBuf,
}

impl ArtifactPaths {
    pub fn new(cn: &str) -> Self {
        let file = |ext: &str| Path::new(KEYS_DIR).join(format!("{cn}.{ext}"));
        Self {
            key: file("key"),
            csr: file("csr"),
            crt: file("crt"),
            p12: file("p12"),
            pass: file("pass"),
        }
    }

    /// Files whose presence marks the common name as taken
    fn reserved(&self) -> [&Path; 4] {
        [&self.pass, &self.crt, &self.csr, &self.key]
    }

    fn all(&self) -> [&Path; 5] {
        [&self.pass, &self.key, &self.csr, &self.crt, &self.p12]
    }
}

/// Human readable fields of an issued certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: String,
    pub not_after: String,
}

impl CertificateSummary {
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let cert = X509::from_pem(pem)?;
        Ok(Self {
            subject: format_name(cert.subject_name()),
            issuer: format_name(cert.issuer_name()),
            serial: cert.serial_number().to_bn()?.to_hex_str()?.to_string(),
            not_before: cert.not_before().to_string(),
            not_after: cert.not_after().to_string(),
        })
    }
}

fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry
                .object()
                .nid()
                .short_name()
                .map(str::to_string)
                .unwrap_or_else(|_| entry.object().to_string());
            let value = entry
                .data()
                .to_string()
                .unwrap_or_else(|_| "InvalidUTF8".to_string());
            format!("{key}={value}")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// A certificate as shown on the result page
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub common_name: String,
    /// The `.crt` file verbatim, text dump included
    pub content: String,
    pub password: String,
    pub summary: CertificateSummary,
}

pub struct CertificateAuthority {
    work_dir: PathBuf,
    openssl: OpenSsl,
    key_bits: u32,
    req_extensions: String,
    issue_lock: Arc<Mutex<()>>,
}

impl CertificateAuthority {
    pub fn new(work_dir: impl Into<PathBuf>, openssl: OpenSsl) -> Self {
        Self {
            work_dir: work_dir.into(),
            openssl,
            key_bits: 2048,
            req_extensions: "server".to_string(),
            issue_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &CaConfig) -> Self {
        Self {
            key_bits: config.key_bits,
            req_extensions: config.req_extensions.clone(),
            ..Self::new(&config.work_dir, OpenSsl::new(&config.openssl_binary))
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn openssl(&self) -> &OpenSsl {
        &self.openssl
    }

    fn checked_paths(cn: &str) -> Result<ArtifactPaths> {
        if is_valid_common_name(cn) {
            Ok(ArtifactPaths::new(cn))
        } else {
            Err(CaError::InvalidCommonName(cn.to_string()))
        }
    }

    async fn is_file(&self, relative: &Path) -> bool {
        is_file(&self.work_dir, relative).await
    }

    /// Whether any of the password, certificate, CSR or key files exists for `cn`
    pub async fn certificate_exists(&self, cn: &str) -> Result<bool> {
        let paths = Self::checked_paths(cn)?;
        Ok(any_reserved(&self.work_dir, &paths).await)
    }

    /// Issue a certificate: key + CSR, CA signature, PKCS#12 bundle.
    ///
    /// Returns the common name. If any step fails, the files created by this
    /// attempt are removed so the common name can be used again.
    ///
    /// The work runs on its own task. Dropping the returned future does not
    /// interrupt `openssl` halfway; the attempt completes or cleans up anyway.
    pub async fn create(&self, request: &CertificateRequest) -> Result<String> {
        let paths = Self::checked_paths(&request.common_name)?;
        let issuance = Issuance {
            work_dir: self.work_dir.clone(),
            openssl: self.openssl.clone(),
            key_bits: self.key_bits,
            req_extensions: self.req_extensions.clone(),
            paths,
            request: request.clone(),
        };

        let lock = Arc::clone(&self.issue_lock);
        tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            issuance.run().await
        })
        .await?
    }

    async fn read_artifact(&self, cn: &str, relative: &Path) -> Result<Vec<u8>> {
        let path = self.work_dir.join(relative);
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CaError::NotFound(cn.to_string()),
            _ => CaError::io("Failed to read artifact", path, e),
        })
    }

    /// Certificate text and password for `cn`
    pub async fn load(&self, cn: &str) -> Result<IssuedCertificate> {
        let paths = Self::checked_paths(cn)?;

        let content = self.read_artifact(cn, &paths.crt).await?;
        let password = self.read_artifact(cn, &paths.pass).await?;
        // `openssl` reads the first line verbatim, surrounding whitespace included
        let password = String::from_utf8_lossy(&password)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(IssuedCertificate {
            common_name: cn.to_string(),
            summary: CertificateSummary::from_pem(&content)?,
            content: String::from_utf8_lossy(&content).into_owned(),
            password,
        })
    }

    /// ZIP archive holding the `.crt`, `.key` and `.p12` files of `cn`
    pub async fn load_as_zip(&self, cn: &str) -> Result<Vec<u8>> {
        let paths = Self::checked_paths(cn)?;

        let mut entries = Vec::with_capacity(3);
        for relative in [&paths.crt, &paths.key, &paths.p12] {
            let contents = self.read_artifact(cn, relative).await?;
            let name = relative
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            entries.push((name, contents));
        }

        build_zip(&entries)
    }

    /// Files the CA needs before it can sign, that are not there yet
    pub fn missing_files(&self) -> Vec<PathBuf> {
        [
            toolchain::CONFIG_FILE,
            toolchain::CA_CERT_FILE,
            toolchain::CA_KEY_FILE,
            INDEX_FILE,
            SERIAL_FILE,
        ]
        .into_iter()
        .map(|relative| self.work_dir.join(relative))
        .filter(|path| !path.is_file())
        .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.missing_files().is_empty()
    }

    /// Create a self-signed CA certificate and key unless both exist.
    ///
    /// Returns whether a new CA was generated.
    pub async fn bootstrap_ca(&self, bootstrap: &CaBootstrap) -> Result<bool> {
        let cert = Path::new(toolchain::CA_CERT_FILE);
        let key = Path::new(toolchain::CA_KEY_FILE);
        if self.is_file(cert).await && self.is_file(key).await {
            tracing::info!(work_dir = %self.work_dir.display(), "CA certificate already present");
            return Ok(false);
        }

        let subject = build_subject(&[
            ("C", non_empty(&bootstrap.country)),
            ("O", non_empty(&bootstrap.organization)),
            ("CN", Some(bootstrap.common_name.as_str())),
        ]);
        self.openssl
            .run(
                &self.work_dir,
                &toolchain::self_signed_ca_args(&subject, bootstrap.key_bits, bootstrap.validity_days),
                &[],
            )
            .await?;

        tracing::info!(%subject, validity_days = bootstrap.validity_days, "CA certificate generated");
        Ok(true)
    }
}

async fn is_file(work_dir: &Path, relative: &Path) -> bool {
    tokio::fs::metadata(work_dir.join(relative))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn any_reserved(work_dir: &Path, paths: &ArtifactPaths) -> bool {
    for path in paths.reserved() {
        if is_file(work_dir, path).await {
            return true;
        }
    }
    false
}

/// A single issuance attempt, owning everything it touches
struct Issuance {
    work_dir: PathBuf,
    openssl: OpenSsl,
    key_bits: u32,
    req_extensions: String,
    paths: ArtifactPaths,
    request: CertificateRequest,
}

impl Issuance {
    /// Must be called with the issue lock held
    async fn run(self) -> Result<String> {
        let cn = self.request.common_name.as_str();

        if any_reserved(&self.work_dir, &self.paths).await {
            return Err(CaError::AlreadyExists(cn.to_string()));
        }
        self.reserve().await?;

        match self.issue().await {
            Ok(()) => {
                tracing::info!(cn, days_valid = self.request.days_valid, "certificate issued");
                Ok(cn.to_string())
            }
            Err(e) => {
                if let CaError::Toolchain {
                    command, output, ..
                } = &e
                {
                    tracing::error!(cn, %command, %output, "openssl failed");
                }
                self.discard().await;
                Err(e)
            }
        }
    }

    /// Claim the common name by creating its password file exclusively
    async fn reserve(&self) -> Result<()> {
        let path = self.work_dir.join(&self.paths.pass);
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = match options.open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CaError::AlreadyExists(self.request.common_name.clone()));
            }
            Err(e) => return Err(CaError::io("Failed to create password file", path, e)),
        };

        let password = self.request.password.expose_secret();
        let written = async {
            file.write_all(password.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            self.discard().await;
            return Err(CaError::io("Failed to write password file", path, e));
        }
        Ok(())
    }

    async fn issue(&self) -> Result<()> {
        let paths = &self.paths;
        let subject = self.request.subject();
        let password = self.request.password.expose_secret();

        self.openssl
            .run(
                &self.work_dir,
                &toolchain::req_args(paths, &subject, self.key_bits, &self.req_extensions),
                &[],
            )
            .await?;

        self.openssl
            .run(&self.work_dir, &toolchain::ca_args(paths, self.request.days_valid), &[])
            .await?;

        self.openssl
            .run(
                &self.work_dir,
                &toolchain::pkcs12_args(paths),
                &[(KEY_PASS_ENV, password), (P12_PASS_ENV, password)],
            )
            .await?;

        Ok(())
    }

    async fn discard(&self) {
        for relative in self.paths.all() {
            let path = self.work_dir.join(relative);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "removed partial artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove partial artifact")
                }
            }
        }
    }
}
fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

/// Prepare a work directory: `keys/`, `db/`, `openssl.cnf`, serial and index.
///
/// Existing files are left untouched.
pub fn setup(work_dir: &Path) -> Result<()> {
    for dir in [KEYS_DIR, DB_DIR] {
        let path = work_dir.join(dir);
        fs::create_dir_all(&path).map_err(|e| CaError::io("Failed to create directory", path, e))?;
    }

    write_if_missing(&work_dir.join(toolchain::CONFIG_FILE), OPENSSL_CNF_TEMPLATE)?;
    write_if_missing(&work_dir.join(SERIAL_FILE), &format!("{INITIAL_SERIAL}\n"))?;
    write_if_missing(&work_dir.join(INDEX_FILE), "")?;

    Ok(())
}

fn write_if_missing(path: &Path, contents: &str) -> Result<()> {
    let result = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .and_then(|mut file| io::Write::write_all(&mut file, contents.as_bytes()));
    match result {
        Ok(()) => {
            tracing::info!(path = %path.display(), "created");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CaError::io("Failed to write file", path, e)),
    }
}
