//! Field parsing for inbound HTTP payloads.
//!
//! Every failure is an `invalid_request` carrying `{ field, value, code }`
//! details so clients can point at the offending input.

use std::fmt::Display;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde_json::json;

use crate::domain::{CountryCode, Error, Iccid, Imei, ServerUrl};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingField,
    InvalidFormat,
    InvalidDate,
    UnknownTimezone,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidFormat => "invalid_format",
            ErrorCode::InvalidDate => "invalid_date",
            ErrorCode::UnknownTimezone => "unknown_timezone",
        }
    }
}

/// Newtype wrapper for HTTP field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(self) -> &'static str {
        self.0
    }
}

pub(crate) const IMEI: FieldName = FieldName::new("imei");
pub(crate) const ICCID: FieldName = FieldName::new("iccid");
pub(crate) const SERVER_URL: FieldName = FieldName::new("server_url");
pub(crate) const COUNTRY_CODE: FieldName = FieldName::new("country_code");

fn invalid(field: FieldName, code: ErrorCode, message: String, value: &str) -> Error {
    Error::invalid_request(message).with_details(json!({
        "field": field.as_str(),
        "value": value,
        "code": code.as_str(),
    }))
}

pub(crate) fn missing_field_error(field: FieldName) -> Error {
    let field = field.as_str();
    Error::invalid_request(format!("missing required field: {field}")).with_details(json!({
        "field": field,
        "code": ErrorCode::MissingField.as_str(),
    }))
}

/// Run a domain parser and attach field context to its failure.
pub(crate) fn parse_field<T, E, F>(value: &str, field: FieldName, parse: F) -> Result<T, Error>
where
    F: FnOnce(&str) -> Result<T, E>,
    E: Display,
{
    parse(value).map_err(|err| {
        invalid(
            field,
            ErrorCode::InvalidFormat,
            format!("{}: {err}", field.as_str()),
            value,
        )
    })
}

/// Wrap a numeric identifier, reporting the field when it is rejected.
pub(crate) fn parse_positive_id<T, E, F>(value: i64, field: FieldName, wrap: F) -> Result<T, Error>
where
    F: FnOnce(i64) -> Result<T, E>,
    E: Display,
{
    wrap(value).map_err(|err| {
        invalid(
            field,
            ErrorCode::InvalidFormat,
            format!("{}: {err}", field.as_str()),
            &value.to_string(),
        )
    })
}

pub(crate) fn parse_imei(value: &str) -> Result<Imei, Error> {
    parse_field(value, IMEI, Imei::parse)
}

pub(crate) fn parse_iccid(value: &str) -> Result<Iccid, Error> {
    parse_field(value, ICCID, Iccid::parse)
}

pub(crate) fn parse_server_url(value: &str) -> Result<ServerUrl, Error> {
    parse_field(value, SERVER_URL, ServerUrl::parse)
}

pub(crate) fn parse_optional_server_url(value: Option<&str>) -> Result<Option<ServerUrl>, Error> {
    value
        .filter(|raw| !raw.trim().is_empty())
        .map(parse_server_url)
        .transpose()
}

pub(crate) fn parse_country_code(value: &str) -> Result<CountryCode, Error> {
    parse_field(value, COUNTRY_CODE, CountryCode::parse)
}

/// Parse a calendar date in `YYYY-MM-DD` form.
pub(crate) fn parse_date(value: &str, field: FieldName) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        invalid(
            field,
            ErrorCode::InvalidDate,
            format!("{} must be a YYYY-MM-DD date", field.as_str()),
            value,
        )
    })
}

/// Parse an IANA timezone name such as `Africa/Nairobi`.
pub(crate) fn parse_timezone(value: &str, field: FieldName) -> Result<Tz, Error> {
    value.trim().parse::<Tz>().map_err(|_| {
        invalid(
            field,
            ErrorCode::UnknownTimezone,
            format!("{} must be an IANA timezone name", field.as_str()),
            value,
        )
    })
}
