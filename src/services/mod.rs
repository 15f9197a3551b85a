pub mod mailer;
pub mod otp_service;
pub mod otp_store;
pub mod password;
pub mod reset_service;
pub mod sms_service;
