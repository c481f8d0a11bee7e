pub mod domain;
pub mod publisher;

pub use domain::*;
pub use publisher::*;
