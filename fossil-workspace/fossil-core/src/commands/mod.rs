// src/commands/mod.rs
pub mod init;
mod api;

pub use api::FossilStore;

pub use init::{ensure_initialized, InitReport};
