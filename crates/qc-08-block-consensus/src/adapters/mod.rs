//! Adapters layer (Hexagonal Architecture)

mod broadcaster;

pub use broadcaster::*;
