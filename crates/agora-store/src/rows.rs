//! Column codecs shared by the per-table modules.
//!
//! Ids are stored as hyphenated UUID text and timestamps as RFC-3339 UTC
//! with a fixed microsecond precision, so `ORDER BY created_at` sorts
//! chronologically.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;
use uuid::Uuid;

use agora_shared::AuthorSummary;

/// Current time at storage precision, so a row built in memory compares
/// equal to the same row read back.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn get_id<T: From<Uuid>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map(T::from).map_err(|e| conversion(idx, e))
}

pub(crate) fn get_opt_id<T: From<Uuid>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| Uuid::parse_str(&s).map(T::from))
        .transpose()
        .map_err(|e| conversion(idx, e))
}

pub(crate) fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(&s).map_err(|e| conversion(idx, e))
}

pub(crate) fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|s| parse_ts(&s))
        .transpose()
        .map_err(|e| conversion(idx, e))
}

pub(crate) fn get_tag<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion(idx, e))
}

/// Read an `(id, username, avatar_url)` triple produced by a `LEFT JOIN
/// profiles`. A missing profile yields `None`.
pub(crate) fn get_author(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<AuthorSummary>> {
    let username: Option<String> = row.get(idx + 1)?;
    match username {
        Some(username) => Ok(Some(AuthorSummary {
            id: get_id(row, idx)?,
            username,
            avatar_url: row.get(idx + 2)?,
        })),
        None => Ok(None),
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// `?, ?, ?` placeholder list for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `UPDATE table SET col = ?, ... WHERE id = ?` over the given columns.
/// Returns the number of rows touched; an empty column list touches none.
pub(crate) fn patch_row(
    conn: &rusqlite::Connection,
    table: &str,
    id: &str,
    columns: Vec<(&'static str, Value)>,
) -> rusqlite::Result<usize> {
    if columns.is_empty() {
        return Ok(0);
    }
    let assignments = columns
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{column} = ?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let mut values: Vec<Value> = columns.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Text(id.to_string()));

    conn.execute(
        &format!("UPDATE {table} SET {assignments} WHERE id = ?{}", values.len()),
        rusqlite::params_from_iter(values),
    )
}

/// Collect the `Some` fields of a patch as text columns.
pub(crate) fn text_columns(fields: &[(&'static str, Option<&String>)]) -> Vec<(&'static str, Value)> {
    fields
        .iter()
        .filter_map(|(column, value)| value.map(|v| (*column, Value::Text(v.clone()))))
        .collect()
}
