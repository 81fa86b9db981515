/// Logical identifiers shared by every status copy of an entity.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Zero-based position inside a sibling list.
pub type Position = i64;
