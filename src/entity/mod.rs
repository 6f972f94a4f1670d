pub mod linking;
pub mod types;
pub mod typing;

pub use types::*;

// Module-level constants
pub const TARGET_ENTITY: &str = "entity";
