// src/models/mod.rs

pub mod attempt;
pub mod evaluation;
pub mod response;
pub mod result;
pub mod user;
