//! HTTP surface of a storage node.

pub mod server;

pub use server::{handle, serve, ApiState};
