#![doc = include_str!("RUSTDOC.md")]

pub mod cafe;
pub mod platform;
pub mod store;
pub mod sync;
pub mod util;
pub mod views;
