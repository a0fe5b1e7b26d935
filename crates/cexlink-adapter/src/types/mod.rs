/*
[INPUT]:  Normalized exchange-agnostic domain definitions
[OUTPUT]: Typed Rust structs/enums shared by every exchange strategy
[POS]:    Data layer - normalized contract between strategies and consumers
[UPDATE]: When the normalized contract gains new fields or message kinds
*/

pub mod enums;
pub mod message;
pub mod models;
pub mod symbol;

pub use enums::*;
pub use message::*;
pub use models::*;
pub use symbol::Symbol;
