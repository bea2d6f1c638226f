//! Application services: page reads, writes and deletion, plus account access.

pub mod auth;
pub mod error;
pub mod pages;
pub mod repos;
pub mod users;
