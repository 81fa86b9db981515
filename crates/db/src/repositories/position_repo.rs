//! SQL implementation of the [`PositionStore`] seam.
//!
//! Renumbering is a single `UPDATE ... SET position = position + ?` over
//! the scope, run on the caller's connection so it shares its transaction.

use async_trait::async_trait;
use layouts_core::position::{PositionScope, PositionStore, ScopeValue, Shift};
use layouts_core::types::Position;
use sqlx::SqliteConnection;

use crate::DbError;

/// Position store bound to one connection (usually `&mut *tx`).
pub struct SqlitePositions<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SqlitePositions<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }
}

fn scope_predicate(scope: &PositionScope) -> String {
    if scope.filters.is_empty() {
        return "1 = 1".to_string();
    }
    scope
        .filters
        .iter()
        .map(|(column, _)| format!("{column} = ?"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[async_trait]
impl PositionStore for SqlitePositions<'_> {
    type Error = DbError;

    async fn next_position(&mut self, scope: &PositionScope) -> Result<Position, DbError> {
        let sql = format!(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM {} WHERE {}",
            scope.table,
            scope_predicate(scope)
        );
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for (_, value) in &scope.filters {
            query = match value {
                ScopeValue::Int(v) => query.bind(*v),
                ScopeValue::Text(v) => query.bind(v.as_str()),
            };
        }
        Ok(query.fetch_one(&mut *self.conn).await?)
    }

    async fn shift_positions(
        &mut self,
        scope: &PositionScope,
        shift: &Shift,
    ) -> Result<(), DbError> {
        let upper = if shift.to.is_some() {
            " AND position <= ?"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE {} SET position = position + ? WHERE {} AND position >= ?{upper}",
            scope.table,
            scope_predicate(scope)
        );

        let mut query = sqlx::query(&sql).bind(shift.delta);
        for (_, value) in &scope.filters {
            query = match value {
                ScopeValue::Int(v) => query.bind(*v),
                ScopeValue::Text(v) => query.bind(v.as_str()),
            };
        }
        query = query.bind(shift.from);
        if let Some(to) = shift.to {
            query = query.bind(to);
        }

        let result = query.execute(&mut *self.conn).await?;
        tracing::debug!(
            table = scope.table,
            from = shift.from,
            to = ?shift.to,
            delta = shift.delta,
            rows = result.rows_affected(),
            "Positions shifted"
        );
        Ok(())
    }
}
