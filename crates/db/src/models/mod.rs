//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - Insert DTOs consumed by the repositories and the [`Store`](crate::store::Store)
//! - Query parameter structs where the API filters lists

pub mod audit;
pub mod extension_request;
pub mod session;
pub mod status;
pub mod task;
pub mod worker;
