use serde::Deserialize;
use validator::Validate;

// Students are `User` documents with `role: student` and a `library_id`.

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStudent {
    #[validate(length(equal = 24, message = "Invalid library id"))]
    pub library_id: String,
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10-15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub seat_number: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStudent {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10-15 characters"))]
    pub phone: Option<String>,
    pub seat_number: Option<String>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    pub library_id: Option<String>,
    pub search: Option<String>,
    pub active: Option<bool>,
    pub page: Option<u64>,
    pub limit: Option<i64>,
}
