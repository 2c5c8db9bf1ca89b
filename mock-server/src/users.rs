//! User administration and self-service.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{authenticate, authenticate_superuser, failure, message, Db, Failure, Paging, User, Users};

const EMAIL_TAKEN: &str = "The user with this email already exists in the system";

#[derive(Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
    #[serde(default = "active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    pub full_name: Option<String>,
}

fn active() -> bool {
    true
}

#[derive(Deserialize)]
pub struct RegisterUser {
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateUserMe {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePassword {
    pub current_password: String,
    pub new_password: String,
}

fn new_user(email: String, password: String, full_name: Option<String>) -> User {
    User {
        email,
        is_active: true,
        is_superuser: false,
        full_name,
        id: Uuid::new_v4(),
        password,
    }
}

/// Fails with 409 when `email` belongs to a user other than `id`.
fn ensure_email_free(users: &std::collections::HashMap<Uuid, User>, email: &str, id: Uuid) -> Result<(), Failure> {
    if users.values().any(|user| user.email == email && user.id != id) {
        return Err(failure(StatusCode::CONFLICT, "User with this email already exists"));
    }
    Ok(())
}

pub(crate) async fn list_users(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(paging): Query<Paging>,
) -> Result<Json<Users>, Failure> {
    let store = db.read().await;
    authenticate_superuser(&store, &headers)?;
    let mut all: Vec<&User> = store.users.values().collect();
    all.sort_by(|a, b| a.email.cmp(&b.email));
    let data = all
        .iter()
        .skip(paging.skip)
        .take(paging.limit)
        .map(|user| (*user).clone())
        .collect();
    Ok(Json(Users { data, count: all.len() }))
}

pub(crate) async fn create_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateUser>,
) -> Result<Json<User>, Failure> {
    let mut store = db.write().await;
    authenticate_superuser(&store, &headers)?;
    if store.user_by_email(&input.email).is_some() {
        return Err(failure(StatusCode::BAD_REQUEST, EMAIL_TAKEN));
    }
    let mut user = new_user(input.email, input.password, input.full_name);
    user.is_active = input.is_active;
    user.is_superuser = input.is_superuser;
    Ok(Json(store.insert_user(user)))
}

pub(crate) async fn register_user(
    State(db): State<Db>,
    Json(input): Json<RegisterUser>,
) -> Result<Json<User>, Failure> {
    let mut store = db.write().await;
    if store.user_by_email(&input.email).is_some() {
        return Err(failure(StatusCode::BAD_REQUEST, EMAIL_TAKEN));
    }
    let user = new_user(input.email, input.password, input.full_name);
    Ok(Json(store.insert_user(user)))
}

pub(crate) async fn read_user_me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, Failure> {
    let store = db.read().await;
    authenticate(&store, &headers).map(Json)
}

pub(crate) async fn update_user_me(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdateUserMe>,
) -> Result<Json<User>, Failure> {
    let mut store = db.write().await;
    let me = authenticate(&store, &headers)?;
    if let Some(email) = &input.email {
        ensure_email_free(&store.users, email, me.id)?;
    }
    let Some(user) = store.users.get_mut(&me.id) else {
        return Err(failure(StatusCode::NOT_FOUND, "User not found"));
    };
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(full_name) = input.full_name {
        user.full_name = Some(full_name);
    }
    Ok(Json(user.clone()))
}

pub(crate) async fn update_password_me(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<UpdatePassword>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let me = authenticate(&store, &headers)?;
    if me.password != input.current_password {
        return Err(failure(StatusCode::BAD_REQUEST, "Incorrect password"));
    }
    if input.current_password == input.new_password {
        return Err(failure(
            StatusCode::BAD_REQUEST,
            "New password cannot be the same as the current one",
        ));
    }
    if let Some(user) = store.users.get_mut(&me.id) {
        user.password = input.new_password;
    }
    Ok(message("Password updated successfully"))
}

pub(crate) async fn delete_user_me(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let me = authenticate(&store, &headers)?;
    if me.is_superuser {
        return Err(failure(
            StatusCode::FORBIDDEN,
            "Super users are not allowed to delete themselves",
        ));
    }
    store.remove_user(me.id);
    Ok(message("User deleted successfully"))
}

pub(crate) async fn read_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, Failure> {
    let store = db.read().await;
    let me = authenticate(&store, &headers)?;
    if me.id == id {
        return Ok(Json(me));
    }
    if !me.is_superuser {
        return Err(failure(StatusCode::FORBIDDEN, "The user doesn't have enough privileges"));
    }
    store
        .users
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "User not found"))
}

pub(crate) async fn update_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>, Failure> {
    let mut store = db.write().await;
    authenticate_superuser(&store, &headers)?;
    if let Some(email) = &input.email {
        ensure_email_free(&store.users, email, id)?;
    }
    let Some(user) = store.users.get_mut(&id) else {
        return Err(failure(
            StatusCode::NOT_FOUND,
            "The user with this id does not exist in the system",
        ));
    };
    if let Some(email) = input.email {
        user.email = email;
    }
    if let Some(password) = input.password {
        user.password = password;
    }
    if let Some(is_active) = input.is_active {
        user.is_active = is_active;
    }
    if let Some(is_superuser) = input.is_superuser {
        user.is_superuser = is_superuser;
    }
    if let Some(full_name) = input.full_name {
        user.full_name = Some(full_name);
    }
    Ok(Json(user.clone()))
}

pub(crate) async fn delete_user(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let me = authenticate_superuser(&store, &headers)?;
    if me.id == id {
        return Err(failure(
            StatusCode::FORBIDDEN,
            "Super users are not allowed to delete themselves",
        ));
    }
    if !store.users.contains_key(&id) {
        return Err(failure(StatusCode::NOT_FOUND, "User not found"));
    }
    store.remove_user(id);
    Ok(message("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn email_may_be_kept_but_not_taken() {
        let owner = new_user("a@example.com".to_string(), "secret123".to_string(), None);
        let other = new_user("b@example.com".to_string(), "secret123".to_string(), None);
        let users: HashMap<Uuid, User> = [(owner.id, owner.clone()), (other.id, other.clone())].into();

        assert!(ensure_email_free(&users, "a@example.com", owner.id).is_ok());
        assert!(ensure_email_free(&users, "c@example.com", owner.id).is_ok());
        let (status, _) = ensure_email_free(&users, "b@example.com", owner.id).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn create_user_defaults_to_active_regular_user() {
        let input: CreateUser =
            serde_json::from_str(r#"{"email":"c@example.com","password":"secret123"}"#).unwrap();
        assert!(input.is_active);
        assert!(!input.is_superuser);
        assert!(input.full_name.is_none());
    }
}
