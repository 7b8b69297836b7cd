//! API request handlers

pub mod health;
pub mod logs;
pub mod relays;
