// src/exam/mod.rs

pub mod coordinator;
pub mod ledger;
pub mod lifecycle;
