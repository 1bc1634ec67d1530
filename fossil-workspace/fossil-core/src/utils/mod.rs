// src/utils/mod.rs

pub mod fsio;
pub mod lock;
pub mod logbook;
pub mod path;
