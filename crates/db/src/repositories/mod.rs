//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Methods suffixed `_in` take a
//! connection so callers can compose them inside one transaction.

pub mod audit_repo;
pub mod extension_request_repo;
pub mod session_repo;
pub mod task_repo;
pub mod worker_repo;

pub use audit_repo::AuditRepo;
pub use extension_request_repo::ExtensionRequestRepo;
pub use session_repo::SessionRepo;
pub use task_repo::TaskRepo;
pub use worker_repo::WorkerRepo;
