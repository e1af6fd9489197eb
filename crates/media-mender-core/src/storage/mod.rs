pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::AuditRecord;
pub use sqlite::Database;
