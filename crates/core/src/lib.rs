//! Domain core of the layouts engine.
//!
//! Everything in this crate is storage-agnostic: status and position
//! rules, lifecycle transition planning, the block/layout/query type
//! registries, and the layout resolver. Persistence lives in
//! `layouts-db`, transactional orchestration in `layouts-engine`.

pub mod block_definition;
pub mod cms;
pub mod error;
pub mod layout_type;
pub mod lifecycle;
pub mod locale;
pub mod position;
pub mod query_type;
pub mod resolver;
pub mod status;
pub mod types;
pub mod validation;
