pub mod duplicates;

pub use duplicates::{find_duplicates, resolve_duplicates, DedupeReport, DuplicateGroup};
