//! Application services orchestrating domain logic and persistence.

pub mod accounts;
pub mod auth;
pub mod error;
pub mod products;
pub mod repos;
pub mod session;
