pub(crate) mod access;
pub(crate) mod auth;
pub(crate) mod books;
pub(crate) mod libraries;
pub(crate) mod notifications;
pub(crate) mod password_reset;
pub(crate) mod payments;
pub(crate) mod students;
