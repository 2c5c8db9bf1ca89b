//! In-memory stand-in for the admin backend.
//!
//! Serves the login, password-recovery, user, item and project endpoints the
//! client talks to. One superuser is seeded on startup; see [`ADMIN_EMAIL`]
//! and [`ADMIN_PASSWORD`].

use std::{collections::HashMap, sync::Arc};

use axum::{
    http::{header, HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

mod login;
mod records;
mod users;

pub use records::{Collection, Record, Records};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "changethis";

/// Address the password-reset link in recovery emails points at.
pub const FRONTEND_HOST: &str = "http://localhost:5173";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
    pub full_name: Option<String>,
    pub id: Uuid,
    #[serde(skip)]
    password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Users {
    pub data: Vec<User>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
}

pub type Item = Record;
pub type Items = Records;
pub type Project = Record;
pub type Projects = Records;

#[derive(Deserialize)]
pub struct Paging {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Default)]
pub struct Store {
    users: HashMap<Uuid, User>,
    tokens: HashMap<String, Uuid>,
    /// Password-reset token to email.
    reset_tokens: HashMap<String, String>,
    items: Vec<Record>,
    projects: Vec<Record>,
}

impl Store {
    fn user_by_email(&self, email: &str) -> Option<&User> {
        self.users.values().find(|user| user.email == email)
    }

    fn insert_user(&mut self, user: User) -> User {
        self.users.insert(user.id, user.clone());
        user
    }

    /// Drop a user together with their sessions and owned records.
    fn remove_user(&mut self, id: Uuid) {
        self.users.remove(&id);
        self.tokens.retain(|_, owner| *owner != id);
        self.items.retain(|item| item.owner_id != id);
        self.projects.retain(|project| project.owner_id != id);
    }
}

pub type Db = Arc<RwLock<Store>>;

type Failure = (StatusCode, Json<Value>);

fn failure(status: StatusCode, detail: &str) -> Failure {
    (status, Json(json!({ "detail": detail })))
}

fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

pub fn app() -> Router {
    let mut store = Store::default();
    store.insert_user(User {
        email: ADMIN_EMAIL.to_string(),
        is_active: true,
        is_superuser: true,
        full_name: None,
        id: Uuid::new_v4(),
        password: ADMIN_PASSWORD.to_string(),
    });

    let db: Db = Arc::new(RwLock::new(store));
    let router = Router::new()
        .route("/api/v1/login/access-token", post(login::login))
        .route("/api/v1/login/test-token", post(login::test_token))
        .route("/api/v1/password-recovery/{email}", post(login::recover_password))
        .route(
            "/api/v1/password-recovery-html-content/{email}",
            post(login::recover_password_html_content),
        )
        .route("/api/v1/reset-password/", post(login::reset_password))
        .route("/api/v1/users/", get(users::list_users).post(users::create_user))
        .route("/api/v1/users/signup", post(users::register_user))
        .route(
            "/api/v1/users/me",
            get(users::read_user_me)
                .patch(users::update_user_me)
                .delete(users::delete_user_me),
        )
        .route("/api/v1/users/me/password", patch(users::update_password_me))
        .route(
            "/api/v1/users/{id}",
            get(users::read_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        );
    let router = records::routes(router, "/api/v1/items", Collection::Items);
    let router = records::routes(router, "/api/v1/projects", Collection::Projects);
    router.with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Resolve the bearer token in `headers` to an active user.
fn authenticate(store: &Store, headers: &HeaderMap) -> Result<User, Failure> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| failure(StatusCode::UNAUTHORIZED, "Not authenticated"))?;
    let id = store
        .tokens
        .get(token)
        .ok_or_else(|| failure(StatusCode::FORBIDDEN, "Could not validate credentials"))?;
    let user = store
        .users
        .get(id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, "User not found"))?;
    if !user.is_active {
        return Err(failure(StatusCode::BAD_REQUEST, "Inactive user"));
    }
    Ok(user.clone())
}

/// Like [`authenticate`], additionally requiring a superuser.
fn authenticate_superuser(store: &Store, headers: &HeaderMap) -> Result<User, Failure> {
    let user = authenticate(store, headers)?;
    if !user.is_superuser {
        return Err(failure(StatusCode::FORBIDDEN, "The user doesn't have enough privileges"));
    }
    Ok(user)
}
