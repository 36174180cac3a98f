//! Maud HTML Templates for the Web CA
//!
//! This module contains all HTML rendering functions using the Maud templating engine.

use crate::authority::IssuedCertificate;
use crate::request::{
    CreationForm, FieldErrors, FIELD_COMMON_NAME, FIELD_COUNTRY, FIELD_DAYS_VALID, FIELD_EMAIL,
    FIELD_LOCALITY, FIELD_ORGANIZATION, FIELD_ORGANIZATIONAL_UNIT, FIELD_PASSWORD, FIELD_STATE,
};
use maud::{html, Markup, PreEscaped, DOCTYPE};

// ============================================================================
// Layout and Common Components
// ============================================================================

pub fn render_layout(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                meta name="viewport" content="width=device-width, initial-scale=1";
                title { (title) " - Web CA" }
                style {
                    (PreEscaped(r#"
                        body { font-family: system-ui; max-width: 800px; margin: 50px auto; padding: 20px; background: #f1f3f5; color: #212529; }
                        .container { background: #ffffff; padding: 30px; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.1); border: 1px solid #dee2e6; }
                        h1 { color: #000000; font-weight: 600; margin-bottom: 20px; }
                        h2 { color: #000000; font-weight: 600; margin-top: 30px; margin-bottom: 15px; }
                        label { display: block; margin: 15px 0 5px; font-weight: 600; color: #000000; }
                        input {
                            width: 100%;
                            padding: 10px;
                            margin: 5px 0;
                            box-sizing: border-box;
                            border: 2px solid #495057;
                            border-radius: 4px;
                            font-size: 14px;
                        }
                        input.invalid { border-color: #842029; }
                        .field-error { color: #842029; margin: 2px 0; font-size: 13px; }
                        button {
                            background: #0056b3;
                            color: #ffffff;
                            padding: 12px 24px;
                            border: none;
                            border-radius: 4px;
                            cursor: pointer;
                            margin: 10px 5px 0 0;
                            font-weight: 600;
                            font-size: 15px;
                        }
                        button:hover { background: #003d82; }
                        .error {
                            background: #f8d7da;
                            color: #842029;
                            padding: 15px;
                            border-radius: 4px;
                            margin: 20px 0;
                            border: 2px solid #842029;
                        }
                        .info {
                            background: #cfe2ff;
                            color: #084298;
                            padding: 15px;
                            border-radius: 4px;
                            margin: 20px 0;
                            border: 2px solid #084298;
                        }
                        .config {
                            background: #f8f9fa;
                            padding: 15px;
                            border-radius: 4px;
                            margin: 10px 0;
                            font-family: monospace;
                            border: 2px solid #495057;
                            font-size: 13px;
                            white-space: pre-wrap;
                            word-break: break-all;
                        }
                        dt { font-weight: 600; margin-top: 8px; }
                        dd { margin-left: 0; font-family: monospace; }
                        nav a { margin-right: 15px; color: #0056b3; text-decoration: none; font-weight: 600; }
                    "#))
                }
            }
            body {
                div class="container" {
                    nav { a href="/certificate" { "New certificate" } }
                    (content)
                }
            }
        }
    }
}

fn text_field(
    name: &str,
    label: &str,
    input_type: &str,
    value: &str,
    required: bool,
    errors: &FieldErrors,
) -> Markup {
    let invalid = errors.contains(name);
    html! {
        label for=(name) {
            (label)
            @if required { "*" }
        }
        input type=(input_type) id=(name) name=(name) value=(value) required[required]
            class=[invalid.then_some("invalid")];
        @for message in errors.get(name) {
            p class="field-error" { (message) }
        }
    }
}

// ============================================================================
// Certificate Pages
// ============================================================================

pub fn render_create_page(form: &CreationForm, errors: &FieldErrors) -> Markup {
    render_layout(
        "Create certificate",
        html! {
            div id="page-create-certificate" {
                h1 { "Create certificate" }

                @if !errors.is_empty() {
                    div class="error" {
                        p { "Please correct the highlighted fields." }
                    }
                }

                form method="POST" action="/certificate" {
                    (text_field(FIELD_COMMON_NAME, "Common Name", "text", &form.common_name, true, errors))
                    (text_field(FIELD_EMAIL, "Email", "email", &form.email, false, errors))
                    (text_field(FIELD_ORGANIZATION, "Organization", "text", &form.organization, false, errors))
                    (text_field(FIELD_ORGANIZATIONAL_UNIT, "Organizational Unit", "text", &form.organizational_unit, false, errors))
                    (text_field(FIELD_LOCALITY, "Locality", "text", &form.locality, false, errors))
                    (text_field(FIELD_STATE, "State", "text", &form.state, false, errors))
                    (text_field(FIELD_COUNTRY, "Country", "text", &form.country, false, errors))
                    (text_field(FIELD_DAYS_VALID, "Valid for x days", "number", &form.days_valid, true, errors))
                    (text_field(FIELD_PASSWORD, "Password", "text", &form.password, true, errors))

                    button type="submit" name="create_certificate" { "Create certificate" }
                }
            }
        },
    )
}

pub fn render_certificate_page(cert: &IssuedCertificate) -> Markup {
    let download = format!("/certificate/{}/download", cert.common_name);
    render_layout(
        &cert.common_name,
        html! {
            div id="page-certificate" {
                h1 { "Certificate " (cert.common_name) }

                dl {
                    dt { "Subject" } dd { (cert.summary.subject) }
                    dt { "Issuer" } dd { (cert.summary.issuer) }
                    dt { "Serial" } dd { (cert.summary.serial) }
                    dt { "Valid from" } dd { (cert.summary.not_before) }
                    dt { "Valid until" } dd { (cert.summary.not_after) }
                }

                div class="info" {
                    p { "Password for the private key and the PKCS#12 bundle:" }
                    p class="config" id="password" { (cert.password) }
                }

                p {
                    a href=(download) {
                        button type="button" { "Download (.crt, .key, .p12)" }
                    }
                }

                h2 { "Certificate" }
                pre class="config" { (cert.content) }
            }
        },
    )
}

// ============================================================================
// Utility Templates
// ============================================================================

pub fn render_error(message: &str) -> Markup {
    render_layout(
        "Error",
        html! {
            div class="error" id="page-error" {
                h2 { "Error" }
                p { (message) }
            }
            p { a href="/certificate" { "Go Back" } }
        },
    )
}
