//! Local user records and the values shared with the tracking server.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use super::{EmailAddress, Error, SubjectId};

/// Validation failures for user-facing record fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordFieldError {
    #[error("server url must be an absolute http(s) url")]
    InvalidServerUrl,
    #[error("country code must be two ASCII letters")]
    InvalidCountryCode,
    #[error("identifier must be positive")]
    NonPositiveId,
}

impl From<RecordFieldError> for Error {
    fn from(value: RecordFieldError) -> Self {
        Error::invalid_request(value.to_string())
    }
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a stored identifier, rejecting zero and negative values.
            pub fn new(value: i64) -> Result<Self, RecordFieldError> {
                if value > 0 {
                    Ok(Self(value))
                } else {
                    Err(RecordFieldError::NonPositiveId)
                }
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

pub(crate) use record_id;

record_id!(
    /// Primary key of a local user row.
    LocalUserId
);
record_id!(
    /// User identifier on a tracking server.
    RemoteUserId
);

/// Base URL of one regional tracking server.
///
/// Stored without a trailing slash so string comparison is a valid
/// equality check between records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerUrl(String);

impl ServerUrl {
    pub fn parse(raw: &str) -> Result<Self, RecordFieldError> {
        let parsed = Url::parse(raw.trim()).map_err(|_| RecordFieldError::InvalidServerUrl)?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(RecordFieldError::InvalidServerUrl);
        }
        let normalised = parsed.as_str().trim_end_matches('/').to_owned();
        Ok(Self(normalised))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for ServerUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// ISO 3166-1 alpha-2 country code, upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn parse(raw: &str) -> Result<Self, RecordFieldError> {
        let trimmed = raw.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(RecordFieldError::InvalidCountryCode)
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for CountryCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One persisted local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: LocalUserId,
    pub email: EmailAddress,
    pub subject: SubjectId,
    pub remote_user_id: RemoteUserId,
    pub server_url: ServerUrl,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub session_token: Option<String>,
    pub push_token: Option<String>,
    pub country_code: Option<CountryCode>,
}

impl UserRecord {
    /// Profile fields safe to return to the end user.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            server_url: self.server_url.clone(),
            name: self.name.clone(),
            phone: self.phone.clone(),
            session_token: self.session_token.clone(),
        }
    }
}

/// Insert payload for a new local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUserRecord {
    pub email: EmailAddress,
    pub subject: SubjectId,
    pub remote_user_id: RemoteUserId,
    pub server_url: ServerUrl,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub country_code: Option<CountryCode>,
}

/// Mutable profile fields of a local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileChanges {
    pub email: EmailAddress,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Normalised view of a user returned by provisioning calls.
///
/// Internal identifiers are deliberately absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub server_url: ServerUrl,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub session_token: Option<String>,
}

/// Password used for the user's tracking-server account.
///
/// It is a pure function of the email (URL-safe base64 without padding) so
/// any instance can reconstruct it; it is never stored.
pub fn derive_remote_secret(email: &EmailAddress) -> Zeroizing<String> {
    Zeroizing::new(URL_SAFE_NO_PAD.encode(email.as_str().as_bytes()))
}

/// Trim optional free text, mapping blanks to `None`.
pub(crate) fn normalise_optional(value: Option<String>) -> Option<String> {
    value.and_then(|text| {
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_owned())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("rider@example.com", "cmlkZXJAZXhhbXBsZS5jb20")]
    #[case("a+b@x.io", "YStiQHguaW8")]
    #[case("??>@x.io", "Pz8-QHguaW8")]
    fn secret_is_url_safe_unpadded_base64(#[case] email: &str, #[case] expected: &str) {
        let email = EmailAddress::new(email).expect("valid email");
        assert_eq!(derive_remote_secret(&email).as_str(), expected);
    }

    #[rstest]
    #[case("https://track.example.com/", "https://track.example.com")]
    #[case("http://10.0.0.5:8082", "http://10.0.0.5:8082")]
    #[case(" https://eu.example.com/tracking/ ", "https://eu.example.com/tracking")]
    fn server_url_is_normalised(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(ServerUrl::parse(raw).expect("valid url").as_str(), expected);
    }

    #[rstest]
    #[case("ftp://example.com")]
    #[case("not a url")]
    #[case("")]
    fn server_url_rejects_non_http(#[case] raw: &str) {
        assert_eq!(ServerUrl::parse(raw), Err(RecordFieldError::InvalidServerUrl));
    }

    #[rstest]
    #[case("de", Some("DE"))]
    #[case(" Ke ", Some("KE"))]
    #[case("DEU", None)]
    #[case("1A", None)]
    fn country_code_parsing(#[case] raw: &str, #[case] expected: Option<&str>) {
        let parsed = CountryCode::parse(raw).ok();
        assert_eq!(parsed.as_ref().map(CountryCode::as_str), expected);
    }

    #[rstest]
    #[case(0)]
    #[case(-4)]
    fn ids_must_be_positive(#[case] raw: i64) {
        assert_eq!(LocalUserId::new(raw), Err(RecordFieldError::NonPositiveId));
    }

    #[rstest]
    fn blank_optional_text_becomes_none() {
        assert_eq!(normalise_optional(Some("  ".to_owned())), None);
        assert_eq!(normalise_optional(Some(" Ann ".to_owned())), Some("Ann".to_owned()));
    }
}
