//! Entities, value objects and the ports the application layer depends on.

pub mod coin;
pub mod ports;
pub mod product;
pub mod session;
pub mod user;
