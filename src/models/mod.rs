pub mod book;
pub mod library;
pub mod notification;
pub mod otp;
pub mod password_reset;
pub mod payment;
pub mod role;
pub mod student;
pub mod user;
