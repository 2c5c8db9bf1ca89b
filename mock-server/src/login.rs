//! Login, token check and password recovery.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Html,
    Form, Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{authenticate, authenticate_superuser, failure, message, Db, Failure, Store, Token, User, FRONTEND_HOST};

const UNKNOWN_EMAIL: &str = "The user with this email does not exist in the system.";

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub grant_type: Option<String>,
}

#[derive(Deserialize)]
pub struct NewPassword {
    pub token: String,
    pub new_password: String,
}

pub(crate) async fn login(State(db): State<Db>, Form(form): Form<LoginForm>) -> Result<Json<Token>, Failure> {
    let mut store = db.write().await;
    let user = store
        .user_by_email(&form.username)
        .filter(|user| user.password == form.password)
        .cloned();
    let Some(user) = user else {
        tracing::debug!(username = %form.username, "rejected login");
        return Err(failure(StatusCode::BAD_REQUEST, "Incorrect email or password"));
    };
    if !user.is_active {
        return Err(failure(StatusCode::BAD_REQUEST, "Inactive user"));
    }
    if form.grant_type.as_deref().is_some_and(|grant| grant != "password") {
        return Err(failure(StatusCode::UNPROCESSABLE_ENTITY, "Unsupported grant type"));
    }

    let access_token = Uuid::new_v4().simple().to_string();
    store.tokens.insert(access_token.clone(), user.id);
    Ok(Json(Token {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

pub(crate) async fn test_token(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, Failure> {
    let store = db.read().await;
    authenticate(&store, &headers).map(Json)
}

/// Issue a reset token for `email` and return the link a recovery email
/// would carry.
fn issue_reset_link(store: &mut Store, email: &str) -> Result<String, Failure> {
    if store.user_by_email(email).is_none() {
        return Err(failure(StatusCode::NOT_FOUND, UNKNOWN_EMAIL));
    }
    let token = Uuid::new_v4().simple().to_string();
    store.reset_tokens.insert(token.clone(), email.to_string());
    Ok(format!("{FRONTEND_HOST}/reset-password?token={token}"))
}

pub(crate) async fn recover_password(
    State(db): State<Db>,
    Path(email): Path<String>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let link = issue_reset_link(&mut store, &email)?;
    tracing::info!(%email, %link, "password recovery email");
    Ok(message("Password recovery email sent"))
}

pub(crate) async fn recover_password_html_content(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(email): Path<String>,
) -> Result<Html<String>, Failure> {
    let mut store = db.write().await;
    authenticate_superuser(&store, &headers)?;
    let link = issue_reset_link(&mut store, &email)?;
    Ok(Html(format!(
        "<p>Password recovery for {email}</p><p><a href=\"{link}\">Reset password</a></p>"
    )))
}

pub(crate) async fn reset_password(
    State(db): State<Db>,
    Json(body): Json<NewPassword>,
) -> Result<Json<Value>, Failure> {
    let mut store = db.write().await;
    let email = store
        .reset_tokens
        .remove(&body.token)
        .ok_or_else(|| failure(StatusCode::BAD_REQUEST, "Invalid token"))?;
    let id = store
        .user_by_email(&email)
        .map(|user| user.id)
        .ok_or_else(|| failure(StatusCode::NOT_FOUND, UNKNOWN_EMAIL))?;
    let Some(user) = store.users.get_mut(&id) else {
        return Err(failure(StatusCode::NOT_FOUND, UNKNOWN_EMAIL));
    };
    if !user.is_active {
        return Err(failure(StatusCode::BAD_REQUEST, "Inactive user"));
    }
    user.password = body.new_password;
    Ok(message("Password updated successfully"))
}
