pub mod auth;
pub mod libraries;
pub mod notifications;
pub mod payments;
pub mod students;
