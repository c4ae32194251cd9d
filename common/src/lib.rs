// Pharos common library - main library exports

pub mod crypto;
pub mod entities;
pub mod hash;
pub mod messages;
pub mod pow;
pub mod queries;
pub mod types;

// Flattened re-exports
pub use self::hash::Hash;
pub use self::types::*;
