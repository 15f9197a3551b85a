pub mod auth_dtos;
pub mod response;
