#![warn(clippy::unwrap_used)]

pub mod client;
pub mod local;

pub use client::RedisArmStore;
pub use local::InMemoryArmStore;
