//! Core WanderApp client library (session, dispatch, navigation, cache).

pub mod client;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod error;
pub mod router;
pub mod session;
