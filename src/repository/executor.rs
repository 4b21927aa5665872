//! Runs rendered statements on a scope's connection.

use crate::error::Result;
use crate::query_builder::Rendered;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};

pub(crate) async fn fetch_all<T>(conn: &mut SqliteConnection, rendered: &Rendered) -> Result<Vec<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    tracing::trace!(sql = %rendered.sql, args = rendered.args.len(), "fetch_all");
    let rows = sqlx::query_as_with::<_, T, _>(&rendered.sql, rendered.arguments()?)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

pub(crate) async fn fetch_rows(
    conn: &mut SqliteConnection,
    rendered: &Rendered,
) -> Result<Vec<SqliteRow>> {
    tracing::trace!(sql = %rendered.sql, args = rendered.args.len(), "fetch_rows");
    let rows = sqlx::query_with(&rendered.sql, rendered.arguments()?)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows)
}

pub(crate) async fn fetch_i64(conn: &mut SqliteConnection, rendered: &Rendered) -> Result<i64> {
    tracing::trace!(sql = %rendered.sql, args = rendered.args.len(), "fetch_scalar");
    let value: i64 = sqlx::query_scalar_with(&rendered.sql, rendered.arguments()?)
        .fetch_one(&mut *conn)
        .await?;
    Ok(value)
}

pub(crate) async fn execute(conn: &mut SqliteConnection, rendered: &Rendered) -> Result<u64> {
    tracing::trace!(sql = %rendered.sql, args = rendered.args.len(), "execute");
    let result = sqlx::query_with(&rendered.sql, rendered.arguments()?)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
