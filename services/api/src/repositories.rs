//! Repositories for database operations

use sqlx::postgres::PgRow;
use sqlx::Row;

pub mod course;
pub mod enrollment;
pub mod user;

pub use course::CourseRepository;
pub use enrollment::{EnrollmentRepository, WriteOutcome};
pub use user::UserRepository;

/// Read a text column into one of the string-backed domain enums.
fn parse_column<T>(row: &PgRow, column: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| anyhow::anyhow!(e))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
