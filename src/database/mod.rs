pub mod accounts;
pub mod connection;
pub mod reset_tokens;
