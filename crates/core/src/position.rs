//! Dense, zero-based ordering of siblings inside an equality-filtered scope.
//!
//! The arithmetic lives in the `plan_*` functions; a [`PositionStore`]
//! applies the resulting [`Shift`] to every *other* row of the scope. The
//! caller inserts, moves or deletes the row itself, always after the
//! renumbering has run in the same transaction.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::Position;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// A value in a scope equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeValue {
    Int(i64),
    Text(String),
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        ScopeValue::Int(value)
    }
}

impl From<i16> for ScopeValue {
    fn from(value: i16) -> Self {
        ScopeValue::Int(value.into())
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        ScopeValue::Text(value.to_string())
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        ScopeValue::Text(value)
    }
}

/// The set of rows sharing one position sequence, e.g.
/// `collection_id = 4 AND item_type = 0 AND status = 0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionScope {
    pub table: &'static str,
    pub filters: Vec<(&'static str, ScopeValue)>,
}

impl PositionScope {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    /// Add an equality filter.
    pub fn filter(mut self, column: &'static str, value: impl Into<ScopeValue>) -> Self {
        self.filters.push((column, value.into()));
        self
    }
}

// ---------------------------------------------------------------------------
// Shift
// ---------------------------------------------------------------------------

/// Add `delta` to every position in `from..=to` (`to = None` is unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub from: Position,
    pub to: Option<Position>,
    pub delta: i64,
}

impl Shift {
    pub fn covers(&self, position: Position) -> bool {
        position >= self.from && self.to.map_or(true, |to| position <= to)
    }

    /// The position after applying this shift.
    pub fn apply(&self, position: Position) -> Position {
        if self.covers(position) {
            position + self.delta
        } else {
            position
        }
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

fn ensure_not_negative(position: Position) -> Result<(), CoreError> {
    if position < 0 {
        return Err(CoreError::bad_state(
            "position",
            "Position cannot be negative.",
        ));
    }
    Ok(())
}

/// Plan the insertion of a row.
///
/// `next_position` is `max(position) + 1` of the scope (0 when empty).
/// Returns the position the new row must be stored at and the shift that
/// makes room for it.
pub fn plan_create(
    next_position: Position,
    desired: Option<Position>,
    end_range: Option<Position>,
    allow_out_of_range: bool,
) -> Result<(Position, Option<Shift>), CoreError> {
    let Some(position) = desired else {
        return Ok((next_position, None));
    };

    ensure_not_negative(position)?;
    if !allow_out_of_range && position > next_position {
        return Err(CoreError::bad_state("position", "Position is out of range."));
    }

    let shift = Shift {
        from: position,
        to: end_range,
        delta: 1,
    };
    Ok((position, Some(shift)))
}

/// Plan moving the row at `original` to `new`.
///
/// `next_position` still counts the moved row. Returns `None` when the row
/// does not move.
pub fn plan_move(
    next_position: Position,
    original: Position,
    new: Position,
    allow_out_of_range: bool,
) -> Result<Option<Shift>, CoreError> {
    ensure_not_negative(new)?;
    if !allow_out_of_range && new >= next_position {
        return Err(CoreError::bad_state("position", "Position is out of range."));
    }

    let shift = match new.cmp(&original) {
        std::cmp::Ordering::Greater => Some(Shift {
            from: original + 1,
            to: Some(new),
            delta: -1,
        }),
        std::cmp::Ordering::Less => Some(Shift {
            from: new,
            to: Some(original - 1),
            delta: 1,
        }),
        std::cmp::Ordering::Equal => None,
    };
    Ok(shift)
}

/// Plan closing the gap left by a removed row.
pub fn plan_remove(removed: Position) -> Shift {
    Shift {
        from: removed + 1,
        to: None,
        delta: -1,
    }
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Backend that can read the extent of a scope and renumber it in bulk.
///
/// Implementations run inside the caller's transaction and never commit.
#[async_trait]
pub trait PositionStore: Send {
    type Error: From<CoreError> + Send;

    /// `max(position) + 1` over the scope, or 0 when it is empty.
    async fn next_position(&mut self, scope: &PositionScope) -> Result<Position, Self::Error>;

    /// Apply `shift` to every row of the scope it covers.
    async fn shift_positions(
        &mut self,
        scope: &PositionScope,
        shift: &Shift,
    ) -> Result<(), Self::Error>;
}

/// Make room for a new row and return the position to store it at.
pub async fn create_position<S>(
    store: &mut S,
    scope: &PositionScope,
    desired: Option<Position>,
    end_range: Option<Position>,
    allow_out_of_range: bool,
) -> Result<Position, S::Error>
where
    S: PositionStore + ?Sized,
{
    let next = store.next_position(scope).await?;
    let (position, shift) = plan_create(next, desired, end_range, allow_out_of_range)?;
    if let Some(shift) = shift {
        store.shift_positions(scope, &shift).await?;
    }
    tracing::debug!(table = scope.table, position, "Position created");
    Ok(position)
}

/// Renumber siblings so the row at `original` can be stored at `new`.
pub async fn move_to_position<S>(
    store: &mut S,
    scope: &PositionScope,
    original: Position,
    new: Position,
    allow_out_of_range: bool,
) -> Result<Position, S::Error>
where
    S: PositionStore + ?Sized,
{
    let next = store.next_position(scope).await?;
    if let Some(shift) = plan_move(next, original, new, allow_out_of_range)? {
        store.shift_positions(scope, &shift).await?;
    }
    Ok(new)
}

/// Close the gap left by a row removed from `removed`.
pub async fn remove_position<S>(
    store: &mut S,
    scope: &PositionScope,
    removed: Position,
) -> Result<(), S::Error>
where
    S: PositionStore + ?Sized,
{
    store.shift_positions(scope, &plan_remove(removed)).await
}
