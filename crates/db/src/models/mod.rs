//! Row models and DTOs.
//!
//! Each submodule contains:
//! - `FromRow` + `Serialize` structs matching database rows
//! - `Deserialize` + `Validate` create DTOs
//! - `Deserialize` + `Validate` update DTOs (`Option` fields) for patches

pub mod block;
pub mod collection;
pub mod layout;
pub mod rule;
