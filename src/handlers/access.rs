//! Ownership and membership checks shared by the resource handlers.

use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document, Regex},
    Collection,
};

use crate::errors::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::library::{Library, LIBRARIES_COLLECTION};
use crate::models::role::Role;
use crate::models::user::{User, USERS_COLLECTION};
use crate::state::AppState;

pub async fn find_user(state: &AppState, id: &ObjectId) -> Result<User> {
    let users: Collection<User> = state.db.collection(USERS_COLLECTION);
    users
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User"))
}

pub async fn find_library(state: &AppState, id: &ObjectId) -> Result<Library> {
    let libraries: Collection<Library> = state.db.collection(LIBRARIES_COLLECTION);
    libraries
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Library"))
}

/// Admins may modify any library, owners only their own.
pub fn can_manage(auth: &AuthUser, library: &Library) -> Result<()> {
    auth.require_manager()?;
    if auth.is_admin() || library.owner_id == auth.id {
        Ok(())
    } else {
        Err(AppError::forbidden("You do not manage this library"))
    }
}

pub fn ensure_active(user: &User) -> Result<()> {
    if user.active {
        Ok(())
    } else {
        Err(AppError::forbidden("This account has been deactivated"))
    }
}

/// An active student may read only the library they are enrolled in.
pub fn can_read(student: &User, library_id: &ObjectId) -> Result<()> {
    ensure_active(student)?;
    if student.library_id.as_ref() != Some(library_id) {
        return Err(AppError::forbidden("You are not a member of this library"));
    }
    Ok(())
}

/// Direct notifications go only to students of the sending library.
pub fn check_recipient(recipient: &User, library_id: &ObjectId) -> Result<()> {
    if recipient.role != Role::Student || recipient.library_id.as_ref() != Some(library_id) {
        return Err(AppError::invalid_data(
            "Recipient must be a student of this library",
        ));
    }
    Ok(())
}

pub fn ensure_no_students(students: u64) -> Result<()> {
    if students > 0 {
        return Err(AppError::conflict(format!(
            "Remove the {} student(s) of this library before deleting it",
            students
        )));
    }
    Ok(())
}

/// Library the caller may modify.
pub async fn library_for_manager(
    state: &AppState,
    auth: &AuthUser,
    library_id: &ObjectId,
) -> Result<Library> {
    auth.require_manager()?;
    let library = find_library(state, library_id).await?;
    can_manage(auth, &library)?;
    Ok(library)
}

/// Library the caller may read: managers as above, students only their own.
pub async fn library_for_member(
    state: &AppState,
    auth: &AuthUser,
    library_id: &ObjectId,
) -> Result<Library> {
    if auth.role.is_manager() {
        return library_for_manager(state, auth, library_id).await;
    }
    let student = find_user(state, &auth.id).await?;
    can_read(&student, library_id)?;
    find_library(state, library_id).await
}

/// The calling student's account, refused once deactivated.
pub async fn active_student(state: &AppState, auth: &AuthUser) -> Result<User> {
    let student = find_user(state, &auth.id).await?;
    ensure_active(&student)?;
    Ok(student)
}

/// Library ids an owner manages, or `None` for admins (no restriction).
pub async fn managed_library_ids(state: &AppState, auth: &AuthUser) -> Result<Option<Vec<ObjectId>>> {
    auth.require_manager()?;
    if auth.is_admin() {
        return Ok(None);
    }
    let libraries: Collection<Library> = state.db.collection(LIBRARIES_COLLECTION);
    let owned: Vec<Library> = libraries
        .find(doc! { "owner_id": auth.id })
        .await?
        .try_collect()
        .await?;
    Ok(Some(owned.into_iter().filter_map(|l| l.id).collect()))
}

/// Student account the caller may manage.
pub async fn student_for_manager(
    state: &AppState,
    auth: &AuthUser,
    student_id: &ObjectId,
) -> Result<User> {
    auth.require_manager()?;
    let student = find_user(state, student_id).await?;
    if student.role != Role::Student {
        return Err(AppError::not_found("Student"));
    }
    let library_id = student
        .library_id
        .ok_or_else(|| AppError::not_found("Student"))?;
    library_for_manager(state, auth, &library_id).await?;
    Ok(student)
}

/// The student's library, for student callers.
pub async fn student_library_id(state: &AppState, auth: &AuthUser) -> Result<ObjectId> {
    active_student(state, auth)
        .await?
        .library_id
        .ok_or_else(|| AppError::forbidden("Your account is not attached to a library"))
}

/// Restricts `filter` to the libraries the manager can see.
pub fn scope_to_libraries(filter: &mut Document, library_ids: Option<Vec<ObjectId>>) {
    if let Some(ids) = library_ids {
        filter.insert("library_id", doc! { "$in": ids });
    }
}

/// Case-insensitive substring match across `fields`.
pub fn search_filter(term: &str, fields: &[&str]) -> Option<Document> {
    let term = term.trim();
    if term.is_empty() {
        return None;
    }
    let pattern = escape_regex(term);
    let clauses: Vec<Document> = fields
        .iter()
        .map(|field| {
            let mut clause = Document::new();
            clause.insert(
                *field,
                Regex {
                    pattern: pattern.clone(),
                    options: "i".to_string(),
                },
            );
            clause
        })
        .collect();
    Some(doc! { "$or": clauses })
}

fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            id: ObjectId::new(),
            role,
        }
    }

    fn library_owned_by(owner_id: ObjectId) -> Library {
        Library {
            id: Some(ObjectId::new()),
            owner_id,
            name: "Quiet Corner".to_string(),
            address: String::new(),
            phone: None,
            email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn student_of(library_id: Option<ObjectId>) -> User {
        let mut user = User::new(
            "Ravi".to_string(),
            "ravi@example.com".to_string(),
            "hash".to_string(),
            Role::Student,
        );
        user.library_id = library_id;
        user
    }

    fn is_forbidden(result: Result<()>) -> bool {
        matches!(result, Err(AppError::Forbidden(_)))
    }

    #[test]
    fn test_owner_manages_only_own_library() {
        let owner = caller(Role::Owner);
        assert!(can_manage(&owner, &library_owned_by(owner.id)).is_ok());
        assert!(is_forbidden(can_manage(&owner, &library_owned_by(ObjectId::new()))));
    }

    #[rstest]
    #[case(Role::Admin, true)]
    #[case(Role::Owner, false)]
    #[case(Role::Student, false)]
    fn test_foreign_library_management(#[case] role: Role, #[case] allowed: bool) {
        let library = library_owned_by(ObjectId::new());
        let result = can_manage(&caller(role), &library);
        assert_eq!(result.is_ok(), allowed);
        if !allowed {
            assert!(is_forbidden(result));
        }
    }

    #[test]
    fn test_student_reads_only_own_library() {
        let library_id = ObjectId::new();
        let student = student_of(Some(library_id));
        assert!(can_read(&student, &library_id).is_ok());
        assert!(is_forbidden(can_read(&student, &ObjectId::new())));
        assert!(is_forbidden(can_read(&student_of(None), &library_id)));
    }

    #[test]
    fn test_deactivated_student_is_refused() {
        let library_id = ObjectId::new();
        let mut student = student_of(Some(library_id));
        student.active = false;

        assert!(is_forbidden(ensure_active(&student)));
        assert!(is_forbidden(can_read(&student, &library_id)));
    }

    #[rstest]
    #[case(Role::Student, true, true)]
    #[case(Role::Student, false, false)]
    #[case(Role::Owner, true, false)]
    #[case(Role::Admin, true, false)]
    fn test_notification_recipient(
        #[case] role: Role,
        #[case] same_library: bool,
        #[case] allowed: bool,
    ) {
        let library_id = ObjectId::new();
        let mut recipient = student_of(Some(if same_library { library_id } else { ObjectId::new() }));
        recipient.role = role;

        let result = check_recipient(&recipient, &library_id);
        assert_eq!(result.is_ok(), allowed);
        if !allowed {
            assert!(matches!(result, Err(AppError::ValidationError(_))));
        }
    }

    #[rstest]
    #[case(0, true)]
    #[case(1, false)]
    #[case(40, false)]
    fn test_library_with_students_cannot_be_deleted(#[case] students: u64, #[case] allowed: bool) {
        let result = ensure_no_students(students);
        assert_eq!(result.is_ok(), allowed);
        if !allowed {
            assert!(matches!(result, Err(AppError::Conflict(_))));
        }
    }

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("c++ (2nd ed.)"), r"c\+\+ \(2nd ed\.\)");
        assert_eq!(escape_regex("plain"), "plain");
    }

    #[test]
    fn test_search_filter_builds_or_clause() {
        let filter = search_filter(" tolkien ", &["title", "author"]).unwrap();
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), 2);
        assert!(search_filter("   ", &["title"]).is_none());
    }

    #[test]
    fn test_scope_to_libraries() {
        let mut filter = doc! {};
        scope_to_libraries(&mut filter, None);
        assert!(filter.is_empty());

        let id = ObjectId::new();
        scope_to_libraries(&mut filter, Some(vec![id]));
        assert_eq!(filter, doc! { "library_id": { "$in": [id] } });
    }
}
