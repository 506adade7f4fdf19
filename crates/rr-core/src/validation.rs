//! # Input validation
//!
//! Raw user input for registration, submissions and profile edits, and the
//! checks that turn it into domain values.

use serde::Deserialize;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{NewPost, ProfileId, ProfileUpdate};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 12;
pub const PASSWORD_MIN_LEN: usize = 4;
pub const TITLE_MAX_LEN: usize = 250;
pub const TEXT_MAX_LEN: usize = 5000;
pub const NAME_MAX_LEN: usize = 35;
pub const ABOUT_MAX_LEN: usize = 500;
pub const TWITTER_MAX_LEN: usize = 15;
pub const GITHUB_MAX_LEN: usize = 39;

/// Sign-up or login credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Validated registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn validate_registration(self) -> Result<Registration> {
        let username = required("username", self.username)?;
        let password = required_secret(self.password)?;

        let len = username.chars().count();
        if len < USERNAME_MIN_LEN {
            return Err(AppError::validation(format!(
                "Ensure this value has at least {USERNAME_MIN_LEN} characters (it has {len})."
            )));
        }
        if len > USERNAME_MAX_LEN {
            return Err(AppError::validation(format!(
                "Ensure this value has at most {USERNAME_MAX_LEN} characters (it has {len})."
            )));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::validation(
                "This value may contain only letters, numbers and _ characters.",
            ));
        }
        let len = password.chars().count();
        if len < PASSWORD_MIN_LEN {
            return Err(AppError::validation(format!(
                "Ensure this value has at least {PASSWORD_MIN_LEN} characters (it has {len})."
            )));
        }
        Ok(Registration { username, password })
    }

    /// Login only needs both fields present.
    pub fn into_login(self) -> Result<(String, String)> {
        Ok((required("username", self.username)?, required_secret(self.password)?))
    }
}

/// A new link or text post.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionForm {
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
}

impl SubmissionForm {
    pub fn validate(self, author_id: ProfileId) -> Result<NewPost> {
        let title = required("title", self.title)?;
        max_len("title", &title, TITLE_MAX_LEN)?;
        let url = blank_to_none(self.url).map(|u| http_url("url", u)).transpose()?;
        let text = blank_to_none(self.text);
        if let Some(text) = &text {
            max_len("text", text, TEXT_MAX_LEN)?;
        }
        Ok(NewPost {
            author_id,
            title,
            url,
            text,
        })
    }
}

/// Editable profile fields. Blank values clear the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub about_text: Option<String>,
    pub homepage: Option<String>,
    pub twitter: Option<String>,
    pub github: Option<String>,
}

impl ProfileForm {
    /// Checks every field; `about_html` is left for the caller to render.
    pub fn validate(self) -> Result<ProfileUpdate> {
        let first_name = bounded("first_name", self.first_name, NAME_MAX_LEN)?;
        let last_name = bounded("last_name", self.last_name, NAME_MAX_LEN)?;
        let about_text = bounded("about_text", self.about_text, ABOUT_MAX_LEN)?;
        let twitter = bounded("twitter", self.twitter, TWITTER_MAX_LEN)?;
        let github = bounded("github", self.github, GITHUB_MAX_LEN)?;
        let email = blank_to_none(self.email).map(email_address).transpose()?;
        let homepage = blank_to_none(self.homepage)
            .map(|u| http_url("homepage", u))
            .transpose()?;

        Ok(ProfileUpdate {
            first_name,
            last_name,
            email,
            about_text,
            about_html: None,
            homepage,
            twitter,
            github,
        })
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    blank_to_none(value).ok_or_else(|| AppError::validation(format!("{field}: This field is required.")))
}

/// Passwords are taken verbatim, surrounding whitespace included.
fn required_secret(value: Option<String>) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation("password: This field is required."))
}

fn max_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(AppError::validation(format!(
            "{field}: Ensure this value has at most {max} characters (it has {len})."
        )));
    }
    Ok(())
}

fn bounded(field: &str, value: Option<String>, max: usize) -> Result<Option<String>> {
    let value = blank_to_none(value);
    if let Some(v) = &value {
        max_len(field, v, max)?;
    }
    Ok(value)
}

fn http_url(field: &str, raw: String) -> Result<String> {
    match Url::parse(&raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(raw),
        _ => Err(AppError::validation(format!("{field}: Enter a valid URL."))),
    }
}

fn email_address(raw: String) -> Result<String> {
    let valid = match raw.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !raw.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(raw)
    } else {
        Err(AppError::validation("email: Enter a valid email address."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(username: &str, password: &str) -> Credentials {
        Credentials {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    fn message(err: AppError) -> String {
        match err {
            AppError::ValidationError(msg) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn registration_rules() {
        assert!(creds("username", "password").validate_registration().is_ok());
        assert_eq!(
            message(creds("_", "password").validate_registration().unwrap_err()),
            "Ensure this value has at least 3 characters (it has 1)."
        );
        assert_eq!(
            message(creds("1234567890123", "password").validate_registration().unwrap_err()),
            "Ensure this value has at most 12 characters (it has 13)."
        );
        assert_eq!(
            message(creds("matt-ex", "password").validate_registration().unwrap_err()),
            "This value may contain only letters, numbers and _ characters."
        );
        assert_eq!(
            message(creds("username", "_").validate_registration().unwrap_err()),
            "Ensure this value has at least 4 characters (it has 1)."
        );
        assert!(Credentials::default().validate_registration().is_err());
    }

    #[test]
    fn submission_minimum_and_limits() {
        let ok = SubmissionForm {
            title: Some("Just a title".into()),
            url: Some("  ".into()),
            text: None,
        }
        .validate(ProfileId(1))
        .unwrap();
        assert_eq!(ok.url, None);

        let too_long = SubmissionForm {
            title: Some("a".repeat(300)),
            ..Default::default()
        };
        assert!(message(too_long.validate(ProfileId(1)).unwrap_err()).contains("at most 250"));

        let bad_url = SubmissionForm {
            title: Some("t".into()),
            url: Some("notaurl".into()),
            ..Default::default()
        };
        assert_eq!(message(bad_url.validate(ProfileId(1)).unwrap_err()), "url: Enter a valid URL.");

        let long_text = SubmissionForm {
            title: Some("t".into()),
            text: Some("a".repeat(5001)),
            ..Default::default()
        };
        assert!(message(long_text.validate(ProfileId(1)).unwrap_err()).contains("(it has 5001)"));

        assert!(SubmissionForm::default().validate(ProfileId(1)).is_err());
    }

    #[test]
    fn profile_form_checks_fields() {
        let update = ProfileForm {
            first_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            homepage: Some("https://ada.dev".into()),
            github: Some("".into()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(update.first_name.as_deref(), Some("Ada"));
        assert_eq!(update.github, None);

        for form in [
            ProfileForm { email: Some("nope".into()), ..Default::default() },
            ProfileForm { homepage: Some("ftp://x.org".into()), ..Default::default() },
            ProfileForm { twitter: Some("a".repeat(16)), ..Default::default() },
            ProfileForm { about_text: Some("a".repeat(501)), ..Default::default() },
        ] {
            assert!(form.validate().is_err());
        }
    }
}
