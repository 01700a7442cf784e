use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use thiserror::Error;

use rollout_core::collaborators::StoreError;

pub mod ban;
pub mod directory;
pub mod document;

pub use ban::SqlBanStore;
pub use directory::{SqlAccountDirectory, SqlProjectDirectory};
pub use document::SqlDocumentStore;

/// Storage format for local wall-clock instants. Lexical order matches time order.
const LOCAL_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(database))
                if database.is_unique_violation() =>
            {
                StoreError::Duplicate(database.message().to_owned())
            }
            RepositoryError::Database(sqlx::Error::Database(database))
                if database.is_foreign_key_violation() =>
            {
                StoreError::Missing(database.message().to_owned())
            }
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Decode(message),
        }
    }
}

pub(crate) fn format_local(value: NaiveDateTime) -> String {
    value.format(LOCAL_DATETIME_FORMAT).to_string()
}

pub(crate) fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_time(value: NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

pub(crate) fn parse_local(column: &str, value: String) -> Result<NaiveDateTime, RepositoryError> {
    NaiveDateTime::parse_from_str(&value, LOCAL_DATETIME_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!(
            "invalid local datetime in `{column}`: `{value}` ({error})"
        ))
    })
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_time(column: &str, value: String) -> Result<NaiveTime, RepositoryError> {
    NaiveTime::parse_from_str(&value, TIME_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid time in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

pub(crate) fn parse_enum<T>(
    column: &str,
    value: String,
    parse: impl FnOnce(&str) -> Option<T>,
) -> Result<T, RepositoryError> {
    parse(&value)
        .ok_or_else(|| RepositoryError::Decode(format!("unsupported `{column}` value: `{value}`")))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;
    use rollout_core::collaborators::StoreError;

    use super::{format_local, parse_local, parse_u32, RepositoryError};

    #[test]
    fn local_datetimes_sort_lexically() {
        let early = NaiveDateTime::parse_from_str("2024-06-01 09:00", "%Y-%m-%d %H:%M")
            .expect("valid timestamp");
        let late = NaiveDateTime::parse_from_str("2024-06-01 22:00", "%Y-%m-%d %H:%M")
            .expect("valid timestamp");

        assert!(format_local(early) < format_local(late));
        assert_eq!(format_local(late), "2024-06-01T22:00:00");
        assert_eq!(parse_local("starts_at", format_local(late)).expect("parse"), late);
    }

    #[test]
    fn decode_failures_surface_as_store_decode_errors() {
        let error = parse_u32("version", -1).expect_err("negative version");
        assert!(matches!(error, RepositoryError::Decode(_)));
        match StoreError::from(error) {
            StoreError::Decode(message) => assert!(message.contains("version")),
            other => panic!("unexpected store error: {other:?}"),
        }
    }
}
