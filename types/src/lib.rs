pub use crate::error::Error;

pub mod babe;
pub mod consts;
pub mod digest;
pub mod header;
pub mod primitives;

mod error;
