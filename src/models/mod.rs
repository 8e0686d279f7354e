// src/models/mod.rs
pub mod driver;
pub mod fleet;
pub mod mission;
pub mod vehicle;

pub use driver::*;
pub use fleet::*;
pub use mission::*;
pub use vehicle::*;
