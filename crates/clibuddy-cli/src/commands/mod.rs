//! Built-in command bodies.

pub mod auth;
pub mod info;
pub mod plugins;
pub mod user;
