//! Web CA - Web front-end for a local OpenSSL certificate authority
//!
//! A user fills in subject fields and a validity period; the server drives the
//! `openssl` command-line tool to create a password-protected private key, a
//! CSR, a certificate signed by the local CA and a PKCS#12 bundle. The result
//! can be viewed in the browser or downloaded as a ZIP archive.
//!
//! # Quick Start
//!
//! ```bash
//! # Prepare the work directory and a self-signed CA
//! web-ca setup --bootstrap-ca
//!
//! # Serve the form on http://127.0.0.1:5000
//! web-ca serve
//! ```
//!
//! # Module Overview
//!
//! - [`configs`]: TOML configuration with defaults for every field
//! - [`request`]: Form input, validation and `-subj` strings
//! - [`toolchain`]: Argument lists for, and execution of, `openssl` invocations
//! - [`authority`]: The CA work directory: issuance, loading, archives, setup
//! - [`archive`]: In-memory ZIP files
//! - [`templates`]: Maud HTML pages
//! - [`webserver`]: Axum routes and the server loop
//!
//! # Using the Library
//!
//! ```no_run
//! use web_ca::authority::{self, CertificateAuthority};
//! use web_ca::request::CreationForm;
//! use web_ca::toolchain::OpenSsl;
//! # async fn example() -> anyhow::Result<()> {
//!
//! authority::setup("ca".as_ref())?;
//! let ca = CertificateAuthority::new("ca", OpenSsl::new("openssl"));
//!
//! let form = CreationForm {
//!     common_name: "build-agent-01".to_string(),
//!     days_valid: "90".to_string(),
//!     password: "changeit".to_string(),
//!     ..CreationForm::default()
//! };
//! let request = form.validate().map_err(|e| anyhow::anyhow!("{e:?}"))?;
//! let cn = ca.create(&request).await?;
//! let archive = ca.load_as_zip(&cn).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod authority;
pub mod configs;
pub mod error;
pub mod password;
pub mod request;
pub mod templates;
pub mod toolchain;
pub mod webserver;
