//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async functions that
//! accept `&mut SqliteConnection` as the first argument.

pub mod block_repo;
pub mod collection_repo;
pub mod layout_repo;
pub mod position_repo;
pub mod rule_repo;
pub mod versioned;
pub mod zone_repo;

pub use block_repo::BlockRepo;
pub use collection_repo::CollectionRepo;
pub use layout_repo::LayoutRepo;
pub use position_repo::SqlitePositions;
pub use rule_repo::RuleRepo;
pub use versioned::{VersionedTree, BLOCK_CONTENT_TREE, LAYOUT_TREE, RULE_TREE};
pub use zone_repo::ZoneRepo;
