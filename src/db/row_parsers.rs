use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::rbac::{Permission, RoleRef};
use crate::models::user::DbUser;

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();

    // RFC3339 (e.g. 2025-11-19T12:34:56Z)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // SQLite default timestamp: "YYYY-MM-DD HH:MM:SS" with optional fraction
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    // strftime('%Y-%m-%dT%H:%M:%f') without a zone suffix
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive));
    }

    if let Ok(naive_date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let ndt = naive_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| AppError::internal("invalid datetime: date out of range"))?;
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    Err(AppError::internal(format!("invalid datetime: {}", s)))
}

fn parse_opt_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    match s.as_deref().map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(Some(parse_datetime(trimmed)?)),
        _ => Ok(None),
    }
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, AppError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| AppError::internal(format!("missing {}: {}", name, e)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(s.trim()).map_err(|e| AppError::internal(format!("invalid uuid: {}", e)))
}

pub fn db_user_from_row(row: &SqliteRow) -> Result<DbUser, AppError> {
    let id_s: String = column(row, "id")?;
    let created_at_s: String = column(row, "created_at")?;
    let updated_at_s: String = column(row, "updated_at")?;

    Ok(DbUser {
        id: parse_uuid(&id_s)?,
        name: column(row, "name")?,
        email: column(row, "email")?,
        password_hash: column(row, "password_hash")?,
        created_at: parse_datetime(&created_at_s)?,
        updated_at: parse_datetime(&updated_at_s)?,
        deleted_at: parse_opt_datetime(column(row, "deleted_at")?)?,
    })
}

pub fn role_ref_from_row(row: &SqliteRow) -> Result<RoleRef, AppError> {
    Ok(RoleRef {
        name: column(row, "name")?,
        display_name: column(row, "display_name")?,
    })
}

pub fn permission_from_row(row: &SqliteRow) -> Result<Permission, AppError> {
    Ok(Permission {
        name: column(row, "name")?,
        description: column(row, "description")?,
    })
}
