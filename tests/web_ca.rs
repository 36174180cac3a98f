use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use web_ca::authority::{self, CertificateAuthority};
use web_ca::configs::{CaBootstrap, FormDefaults};
use web_ca::request::CreationForm;
use web_ca::toolchain::OpenSsl;
use web_ca::webserver::{router, AppState};

const FOO_BAR_FORM: &str = "common_name=foo_bar&email=foo%40bar.com&organization=Foo+Bar+AG\
    &organizational_unit=R%26D&locality=Berlin&country=DE&days_valid=31&password=foosecret123";

fn openssl_available() -> bool {
    std::process::Command::new("openssl")
        .arg("version")
        .output()
        .is_ok_and(|o| o.status.success())
}

fn app(dir: &TempDir) -> Router {
    authority::setup(dir.path()).unwrap();
    let ca = CertificateAuthority::new(dir.path(), OpenSsl::new("openssl"));
    router(AppState::new(Arc::new(ca), FormDefaults::default(), 8))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

async fn post_form(app: &Router, body: &str) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app
        .clone()
        .oneshot(
            Request::post("/certificate")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, String::from_utf8_lossy(&body).into_owned())
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[tokio::test]
async fn test_index_redirects_to_form() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, headers, _) = get(&app, "/").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/certificate");
}

#[tokio::test]
async fn test_show_create_certificate_form() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, _, body) = get(&app, "/certificate").await;
    let body = text(&body);
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"id="page-create-certificate""#));
    assert!(body.contains(r#"value="Max_Mustermann_2015""#));
}

#[tokio::test]
async fn test_invalid_submission_rerenders_form() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, _, body) =
        post_form(&app, "common_name=foo%2Fbar&days_valid=0&password=x").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"id="page-create-certificate""#));
    assert!(body.contains("Letters, numbers and one of the following characters are allowed"));
    assert!(body.contains("Number must be at least 1."));
    assert!(fs::read_dir(dir.path().join("keys")).unwrap().next().is_none());
}

#[tokio::test]
async fn test_duplicate_common_name_rerenders_form() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    fs::write(dir.path().join("keys/foo_bar.key"), "existing").unwrap();

    let (status, _, body) = post_form(&app, FOO_BAR_FORM).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("A certificate with this CN already exists"));
    assert_eq!(
        fs::read_to_string(dir.path().join("keys/foo_bar.key")).unwrap(),
        "existing"
    );
}

#[tokio::test]
async fn test_unknown_certificate_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, _, body) = get(&app, "/certificate/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(text(&body).contains(r#"id="page-error""#));

    let (status, _, _) = get(&app, "/certificate/nobody/download").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    fs::write(dir.path().join("db/ca.crt"), "not for download").unwrap();

    let (status, _, _) = get(&app, "/certificate/..%2Fdb%2Fca/download").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_view_and_download_certificate() {
    if !openssl_available() {
        eprintln!("openssl not installed, skipping");
        return;
    }

    let dir = TempDir::new().unwrap();
    let app = app(&dir);
    let ca = CertificateAuthority::new(dir.path(), OpenSsl::new("openssl"));
    let bootstrap = CaBootstrap {
        key_bits: 2048,
        ..CaBootstrap::default()
    };
    assert!(ca.bootstrap_ca(&bootstrap).await.unwrap());
    assert!(ca.is_ready());

    let (status, headers, _) = post_form(&app, FOO_BAR_FORM).await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(headers[header::LOCATION], "/certificate/foo_bar");
    for ext in ["key", "csr", "crt", "p12", "pass"] {
        assert!(dir.path().join(format!("keys/foo_bar.{ext}")).is_file(), "{ext}");
    }

    let (status, _, body) = get(&app, "/certificate/foo_bar").await;
    let body = text(&body);
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#"id="page-certificate""#));
    assert!(body.contains("foosecret123"));
    assert!(body.contains("CN=foo_bar"));
    assert!(body.contains("OU=R&amp;D"));
    assert!(body.contains("-----BEGIN CERTIFICATE-----"));

    let (status, headers, body) = get(&app, "/certificate/foo_bar/download").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"foo_bar.zip\""
    );
    let archive = zip::ZipArchive::new(Cursor::new(body)).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, ["foo_bar.crt", "foo_bar.key", "foo_bar.p12"]);

    // same common name again
    let (status, _, body) = post_form(&app, FOO_BAR_FORM).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("A certificate with this CN already exists"));
}

#[tokio::test]
async fn test_failed_signing_releases_common_name() {
    if !openssl_available() {
        eprintln!("openssl not installed, skipping");
        return;
    }

    // no CA certificate: `openssl ca` fails after the key was generated
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, _, body) = post_form(&app, FOO_BAR_FORM).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains(r#"id="page-error""#));
    for ext in ["key", "csr", "crt", "p12", "pass"] {
        assert!(!dir.path().join(format!("keys/foo_bar.{ext}")).exists(), "{ext}");
    }
}

#[tokio::test]
async fn test_displayed_password_opens_bundle_and_key() {
    if !openssl_available() {
        eprintln!("openssl not installed, skipping");
        return;
    }

    let dir = TempDir::new().unwrap();
    authority::setup(dir.path()).unwrap();
    let ca = CertificateAuthority::new(dir.path(), OpenSsl::new("openssl"));
    let bootstrap = CaBootstrap {
        key_bits: 2048,
        ..CaBootstrap::default()
    };
    ca.bootstrap_ca(&bootstrap).await.unwrap();

    let request = CreationForm {
        common_name: "spaced".to_string(),
        days_valid: "30".to_string(),
        password: " pass word ".to_string(),
        ..CreationForm::default()
    }
    .validate()
    .unwrap();
    ca.create(&request).await.unwrap();

    let shown = ca.load("spaced").await.unwrap().password;
    assert_eq!(shown, " pass word ");

    let der = fs::read(dir.path().join("keys/spaced.p12")).unwrap();
    let parsed = openssl::pkcs12::Pkcs12::from_der(&der)
        .unwrap()
        .parse2(&shown)
        .unwrap();
    assert!(parsed.pkey.is_some());

    let pem = fs::read(dir.path().join("keys/spaced.key")).unwrap();
    openssl::pkey::PKey::private_key_from_pem_passphrase(&pem, shown.as_bytes()).unwrap();
}
