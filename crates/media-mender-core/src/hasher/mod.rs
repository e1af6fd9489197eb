pub mod checksum;
pub mod xxhash;

pub use checksum::{checksum, files_equal};
pub use xxhash::partial_hash;
