pub mod blob;
pub mod release;

// Re-export all public types for convenient `use crate::types::*` imports.
pub use self::blob::*;
pub use self::release::*;
