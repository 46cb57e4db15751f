// src/realtime/mod.rs

pub mod event;
pub mod registry;
pub mod socket;
