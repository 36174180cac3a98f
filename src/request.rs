//! Certificate request form: raw input, validation and the subject string
//! handed to `openssl req -subj`.

use crate::configs::FormDefaults;
use secrecy::SecretString;
use serde::Deserialize;

pub const FIELD_COMMON_NAME: &str = "common_name";
pub const FIELD_EMAIL: &str = "email";
pub const FIELD_ORGANIZATION: &str = "organization";
pub const FIELD_ORGANIZATIONAL_UNIT: &str = "organizational_unit";
pub const FIELD_LOCALITY: &str = "locality";
pub const FIELD_STATE: &str = "state";
pub const FIELD_COUNTRY: &str = "country";
pub const FIELD_DAYS_VALID: &str = "days_valid";
pub const FIELD_PASSWORD: &str = "password";

pub const MSG_REQUIRED: &str = "This field is required.";
pub const MSG_COMMON_NAME_CHARS: &str =
    "Letters, numbers and one of the following characters are allowed: _-.";
pub const MSG_TEXT_CHARS: &str =
    "Letters, numbers, whitespaces and one of the following characters are allowed: _-.&";
pub const MSG_EMAIL: &str = "Invalid email address.";
pub const MSG_COUNTRY: &str = "Country must be a two-letter code such as DE.";
pub const MSG_DAYS_VALID: &str = "Number must be at least 1.";
pub const MSG_NOT_A_NUMBER: &str = "Not a valid integer value.";
pub const MSG_DUPLICATE: &str =
    "A certificate with this CN already exists. Please choose a different one";

/// Form fields exactly as submitted by the browser
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreationForm {
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub organizational_unit: String,
    #[serde(default)]
    pub locality: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub days_valid: String,
    #[serde(default)]
    pub password: String,
}

/// Validated request for a new certificate
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub common_name: String,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub days_valid: u32,
    pub password: SecretString,
}

/// Validation messages keyed by form field, in the order they were raised
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldErrors(Vec<(&'static str, String)>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push((field, message.into()));
    }

    pub fn get<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl CreationForm {
    /// Blank form prefilled from configuration and a freshly generated password
    pub fn with_defaults(defaults: &FormDefaults, password: String) -> Self {
        Self {
            common_name: defaults.common_name.clone(),
            email: defaults.email.clone(),
            organization: defaults.organization.clone(),
            organizational_unit: defaults.organizational_unit.clone(),
            locality: defaults.locality.clone(),
            state: defaults.state.clone(),
            country: defaults.country.clone(),
            days_valid: defaults.days_valid.to_string(),
            password,
        }
    }

    /// Check every field, collecting all messages rather than stopping at the first.
    ///
    /// The duplicate check needs the file system and is done by the caller.
    pub fn validate(&self) -> Result<CertificateRequest, FieldErrors> {
        let mut errors = FieldErrors::new();

        let common_name = self.common_name.trim();
        if common_name.is_empty() {
            errors.add(FIELD_COMMON_NAME, MSG_REQUIRED);
        } else if !is_valid_common_name(common_name) {
            errors.add(FIELD_COMMON_NAME, MSG_COMMON_NAME_CHARS);
        }

        let email = optional(&self.email);
        if let Some(email) = email {
            if !is_valid_email(email) {
                errors.add(FIELD_EMAIL, MSG_EMAIL);
            }
        }

        let text_fields = [
            (FIELD_ORGANIZATION, optional(&self.organization)),
            (FIELD_ORGANIZATIONAL_UNIT, optional(&self.organizational_unit)),
            (FIELD_LOCALITY, optional(&self.locality)),
            (FIELD_STATE, optional(&self.state)),
            (FIELD_COUNTRY, optional(&self.country)),
        ];
        for (field, value) in text_fields {
            if value.is_some_and(|v| !is_valid_text(v)) {
                errors.add(field, MSG_TEXT_CHARS);
            }
        }
        // openssl rejects a countryName of any other length
        if text_fields[4].1.is_some_and(|c| !is_valid_country(c))
            && !errors.contains(FIELD_COUNTRY)
        {
            errors.add(FIELD_COUNTRY, MSG_COUNTRY);
        }

        let days_valid = match self.days_valid.trim() {
            "" => {
                errors.add(FIELD_DAYS_VALID, MSG_REQUIRED);
                None
            }
            raw => match raw.parse::<i64>() {
                Ok(days) if days < 1 => {
                    errors.add(FIELD_DAYS_VALID, MSG_DAYS_VALID);
                    None
                }
                Ok(days) => match u32::try_from(days) {
                    Ok(days) => Some(days),
                    Err(_) => {
                        errors.add(FIELD_DAYS_VALID, MSG_NOT_A_NUMBER);
                        None
                    }
                },
                Err(_) => {
                    errors.add(FIELD_DAYS_VALID, MSG_NOT_A_NUMBER);
                    None
                }
            },
        };

        if self.password.is_empty() {
            errors.add(FIELD_PASSWORD, MSG_REQUIRED);
        } else if self.password.contains(|c: char| c == '\r' || c == '\n') {
            // the password file holds a single line
            errors.add(FIELD_PASSWORD, "Password must be a single line.");
        }

        match days_valid {
            Some(days_valid) if errors.is_empty() => Ok(CertificateRequest {
                common_name: common_name.to_string(),
                email: email.map(str::to_string),
                organization: text_fields[0].1.map(str::to_string),
                organizational_unit: text_fields[1].1.map(str::to_string),
                locality: text_fields[2].1.map(str::to_string),
                state: text_fields[3].1.map(str::to_string),
                country: text_fields[4].1.map(str::to_string),
                days_valid,
                password: SecretString::from(self.password.clone()),
            }),
            _ => Err(errors),
        }
    }
}

impl CertificateRequest {
    /// Subject in `openssl req -subj` syntax: `/C=../ST=../L=../O=../OU=../CN=../emailAddress=..`
    ///
    /// Empty components are left out; CN is always present.
    pub fn subject(&self) -> String {
        let components = [
            ("C", self.country.as_deref()),
            ("ST", self.state.as_deref()),
            ("L", self.locality.as_deref()),
            ("O", self.organization.as_deref()),
            ("OU", self.organizational_unit.as_deref()),
            ("CN", Some(self.common_name.as_str())),
            ("emailAddress", self.email.as_deref()),
        ];
        build_subject(&components)
    }
}

/// Join `(attribute, value)` pairs into a `-subj` string, skipping absent values
pub fn build_subject(components: &[(&str, Option<&str>)]) -> String {
    let mut subject = String::new();
    for (attribute, value) in components {
        if let Some(value) = value {
            subject.push('/');
            subject.push_str(attribute);
            subject.push('=');
            subject.push_str(&escape_subject_value(value));
        }
    }
    subject
}

fn escape_subject_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '/' | '+' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn optional(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Whether `cn` may be used as a common name and therefore as a file stem under `keys/`
pub fn is_valid_common_name(cn: &str) -> bool {
    !cn.is_empty()
        && cn != "."
        && cn != ".."
        && cn
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_valid_text(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '&' | ' '))
}

fn is_valid_country(country: &str) -> bool {
    country.len() == 2 && country.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let local_ok = !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'));
    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    local_ok && domain_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn filled_form() -> CreationForm {
        CreationForm {
            common_name: "foo_bar".to_string(),
            email: "foo@bar.com".to_string(),
            organization: "Foo Bar AG".to_string(),
            organizational_unit: "R&D".to_string(),
            locality: "Berlin".to_string(),
            state: String::new(),
            country: "DE".to_string(),
            days_valid: "31".to_string(),
            password: "foosecret123".to_string(),
        }
    }

    #[test]
    fn test_valid_form_produces_request() {
        let request = filled_form().validate().unwrap();
        assert_eq!(request.common_name, "foo_bar");
        assert_eq!(request.email.as_deref(), Some("foo@bar.com"));
        assert_eq!(request.state, None);
        assert_eq!(request.days_valid, 31);
        assert_eq!(request.password.expose_secret(), "foosecret123");
    }

    #[test]
    fn test_subject_order_and_omitted_state() {
        let request = filled_form().validate().unwrap();
        assert_eq!(
            request.subject(),
            "/C=DE/L=Berlin/O=Foo Bar AG/OU=R&D/CN=foo_bar/emailAddress=foo@bar.com"
        );
    }

    #[test]
    fn test_subject_with_only_common_name() {
        let form = CreationForm {
            common_name: "solo".to_string(),
            days_valid: "1".to_string(),
            password: "x".to_string(),
            ..CreationForm::default()
        };
        assert_eq!(form.validate().unwrap().subject(), "/CN=solo");
    }

    #[test]
    fn test_subject_escapes_separators() {
        let subject = build_subject(&[("CN", Some("a/b")), ("emailAddress", Some("x+y@z.io"))]);
        assert_eq!(subject, "/CN=a\\/b/emailAddress=x\\+y@z.io");
    }

    #[test]
    fn test_common_name_rules() {
        assert!(is_valid_common_name("Max_Mustermann_2015"));
        assert!(is_valid_common_name("host.example-1"));
        assert!(!is_valid_common_name(""));
        assert!(!is_valid_common_name("."));
        assert!(!is_valid_common_name(".."));
        assert!(!is_valid_common_name("../db/ca"));
        assert!(!is_valid_common_name("with space"));
        assert!(!is_valid_common_name("umlaut_ä"));
    }

    #[test]
    fn test_required_fields() {
        let errors = CreationForm::default().validate().unwrap_err();
        assert!(errors.contains(FIELD_COMMON_NAME));
        assert!(errors.contains(FIELD_DAYS_VALID));
        assert!(errors.contains(FIELD_PASSWORD));
        assert!(!errors.contains(FIELD_EMAIL));
        assert!(!errors.contains(FIELD_ORGANIZATION));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_invalid_characters_are_reported_per_field() {
        let form = CreationForm {
            common_name: "foo/bar".to_string(),
            organization: "Foo, Inc.".to_string(),
            locality: "Zürich".to_string(),
            ..filled_form()
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get(FIELD_COMMON_NAME).collect::<Vec<_>>(),
            vec![MSG_COMMON_NAME_CHARS]
        );
        assert_eq!(
            errors.get(FIELD_ORGANIZATION).collect::<Vec<_>>(),
            vec![MSG_TEXT_CHARS]
        );
        assert!(errors.contains(FIELD_LOCALITY));
        assert!(!errors.contains(FIELD_COUNTRY));
    }

    #[test]
    fn test_days_valid_rules() {
        for (raw, message) in [
            ("0", MSG_DAYS_VALID),
            ("-5", MSG_DAYS_VALID),
            ("abc", MSG_NOT_A_NUMBER),
            ("99999999999", MSG_NOT_A_NUMBER),
            ("", MSG_REQUIRED),
        ] {
            let form = CreationForm {
                days_valid: raw.to_string(),
                ..filled_form()
            };
            let errors = form.validate().unwrap_err();
            assert_eq!(
                errors.get(FIELD_DAYS_VALID).collect::<Vec<_>>(),
                vec![message],
                "days_valid = {raw:?}"
            );
        }
    }

    #[test]
    fn test_country_must_be_two_letters() {
        for country in ["Germany", "D", "D1"] {
            let form = CreationForm {
                country: country.to_string(),
                ..filled_form()
            };
            let errors = form.validate().unwrap_err();
            assert_eq!(
                errors.get(FIELD_COUNTRY).collect::<Vec<_>>(),
                vec![MSG_COUNTRY],
                "country = {country:?}"
            );
        }

        let form = CreationForm {
            country: "D/E".to_string(),
            ..filled_form()
        };
        assert_eq!(
            form.validate().unwrap_err().get(FIELD_COUNTRY).collect::<Vec<_>>(),
            vec![MSG_TEXT_CHARS]
        );

        let form = CreationForm {
            country: " nl ".to_string(),
            ..filled_form()
        };
        assert_eq!(form.validate().unwrap().country.as_deref(), Some("nl"));
    }

    #[test]
    fn test_password_keeps_surrounding_whitespace() {
        let form = CreationForm {
            password: " pass word ".to_string(),
            ..filled_form()
        };
        assert_eq!(form.validate().unwrap().password.expose_secret(), " pass word ");
    }

    #[test]
    fn test_email_rules() {
        assert!(is_valid_email("max@mustermann.de"));
        assert!(is_valid_email("first.last+tag@sub.example.org"));
        assert!(!is_valid_email("max"));
        assert!(!is_valid_email("@mustermann.de"));
        assert!(!is_valid_email("max@localhost"));
        assert!(!is_valid_email("max@mustermann..de"));
        assert!(!is_valid_email("max/evil@mustermann.de"));
    }

    #[test]
    fn test_multiline_password_rejected() {
        let form = CreationForm {
            password: "one\ntwo".to_string(),
            ..filled_form()
        };
        assert!(form.validate().unwrap_err().contains(FIELD_PASSWORD));
    }

    #[test]
    fn test_with_defaults() {
        let form = CreationForm::with_defaults(&FormDefaults::default(), "pw".to_string());
        assert_eq!(form.common_name, "Max_Mustermann_2015");
        assert_eq!(form.organizational_unit, "R&D");
        assert_eq!(form.days_valid, "365");
        assert_eq!(form.password, "pw");
        assert!(form.validate().is_ok());
    }
}
