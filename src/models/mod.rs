// src/models/mod.rs

pub mod admin;
pub mod answer;
pub mod participant;
pub mod question;
pub mod session;
