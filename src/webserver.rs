use crate::authority::CertificateAuthority;
use crate::configs::{AppConfig, FormDefaults};
use crate::error::CaError;
use crate::password::random_password;
use crate::request::{CreationForm, FieldErrors, FIELD_COMMON_NAME, MSG_DUPLICATE};
use crate::templates::{render_certificate_page, render_create_page, render_error};
use anyhow::{bail, Context, Result};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    authority: Arc<CertificateAuthority>,
    form_defaults: Arc<FormDefaults>,
    password_length: usize,
}

impl AppState {
    pub fn new(
        authority: Arc<CertificateAuthority>,
        form_defaults: FormDefaults,
        password_length: usize,
    ) -> Self {
        Self {
            authority,
            form_defaults: Arc::new(form_defaults),
            password_length,
        }
    }
}

/// Error page response for a failed request
pub struct AppError(CaError);

impl From<CaError> for AppError {
    fn from(err: CaError) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CaError::NotFound(_) | CaError::InvalidCommonName(_) => {
                (StatusCode::NOT_FOUND, self.0.to_string())
            }
            CaError::AlreadyExists(_) => (StatusCode::CONFLICT, self.0.to_string()),
            _ => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "The certificate authority could not complete the request.".to_string(),
                )
            }
        };
        (status, render_error(&message)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/certificate", get(show_form).post(create_certificate))
        .route("/certificate/:cn", get(display_certificate))
        .route("/certificate/:cn/download", get(download_certificate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index() -> Redirect {
    Redirect::to("/certificate")
}

async fn show_form(State(state): State<AppState>) -> Response {
    let form = CreationForm::with_defaults(
        &state.form_defaults,
        random_password(state.password_length),
    );
    render_create_page(&form, &FieldErrors::new()).into_response()
}

async fn create_certificate(
    State(state): State<AppState>,
    Form(form): Form<CreationForm>,
) -> Result<Response, AppError> {
    let request = match form.validate() {
        Ok(request) => request,
        Err(errors) => {
            tracing::warn!(cn = %form.common_name, rejected = errors.len(), "invalid certificate request");
            return Ok(render_create_page(&form, &errors).into_response());
        }
    };

    match state.authority.create(&request).await {
        Ok(cn) => Ok(Redirect::to(&format!("/certificate/{cn}")).into_response()),
        Err(CaError::AlreadyExists(cn)) => {
            tracing::warn!(%cn, "common name already in use");
            let mut errors = FieldErrors::new();
            errors.add(FIELD_COMMON_NAME, MSG_DUPLICATE);
            Ok(render_create_page(&form, &errors).into_response())
        }
        Err(e) => Err(e.into()),
    }
}

async fn display_certificate(
    State(state): State<AppState>,
    Path(cn): Path<String>,
) -> Result<Response, AppError> {
    let cert = state.authority.load(&cn).await?;
    Ok((
        [(header::CACHE_CONTROL, "no-store")],
        render_certificate_page(&cert),
    )
        .into_response())
}

async fn download_certificate(
    State(state): State<AppState>,
    Path(cn): Path<String>,
) -> Result<Response, AppError> {
    let archive = state.authority.load_as_zip(&cn).await?;
    tracing::info!(%cn, bytes = archive.len(), "archive downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{cn}.zip\""),
            ),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
        archive,
    )
        .into_response())
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr> {
    tokio::net::lookup_host((host, port))
        .await
        .with_context(|| format!("Failed to resolve {host}:{port}"))?
        .next()
        .with_context(|| format!("No address found for {host}:{port}"))
}

/// Serve the web interface until Ctrl-C
pub async fn serve(config: AppConfig) -> Result<()> {
    let authority = CertificateAuthority::from_config(&config.ca);

    let missing = authority.missing_files();
    if !missing.is_empty() {
        for path in &missing {
            tracing::error!(path = %path.display(), "missing CA file");
        }
        bail!(
            "CA work directory {} is not initialized, run `web-ca setup --bootstrap-ca` first",
            authority.work_dir().display()
        );
    }

    let version = authority
        .openssl()
        .version(authority.work_dir())
        .await
        .context("The openssl binary is not usable")?;
    tracing::info!(%version, work_dir = %authority.work_dir().display(), "certificate authority ready");

    let state = AppState::new(
        Arc::new(authority),
        config.form_defaults.clone(),
        config.ca.password_length,
    );
    let app = router(state);
    let addr = resolve_addr(&config.server.host, config.server.port).await?;

    let handle = Handle::new();
    tokio::spawn({
        let handle = handle.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            }
        }
    });

    match config.server.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls = RustlsConfig::from_pem_file(cert_path, key_path)
                .await
                .context("Failed to load TLS certificate and key")?;
            tracing::info!("listening on https://{addr}");
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTPS server failed")?;
        }
        None => {
            tracing::info!("listening on http://{addr}");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("HTTP server failed")?;
        }
    }

    Ok(())
}
