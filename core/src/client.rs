//! Typed service methods for the admin backend.
//!
//! # Design
//! `ApiClient` owns a `ClientConfig` and a shared transport. Every method
//! only describes its call as `RequestOptions` and hands it to
//! [`request`](crate::request::request); URL building, auth, classification
//! and cancellation all live in the pipeline.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::cancelable::Cancelable;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{HttpMethod, Transport};
use crate::options::RequestOptions;
use crate::request::request;
use crate::types::{
    BodyLoginAccessToken, ItemCreate, ItemPublic, ItemUpdate, ItemsPublic, Message, NewPassword, ProjectCreate,
    ProjectPublic, ProjectUpdate, ProjectsPublic, Token, UpdatePassword, UserCreate, UserPublic, UserRegister,
    UserUpdate, UserUpdateMe, UsersPublic,
};

const VALIDATION_ERROR: &str = "Validation Error";

/// Client for the admin backend's login, user and item endpoints.
#[derive(Debug)]
pub struct ApiClient<C> {
    config: ClientConfig,
    transport: Arc<C>,
}

impl<C> Clone for ApiClient<C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<C: Transport + 'static> ApiClient<C> {
    pub fn new(config: ClientConfig, transport: C) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Mutable access, e.g. to store a token after login or register
    /// interceptors. Calls already issued keep the config they started with.
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    /// Issue an arbitrary call through the pipeline.
    pub fn send<T>(&self, options: RequestOptions) -> Cancelable<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        request(&self.config, options, Arc::clone(&self.transport))
    }

    /// `POST /api/v1/login/access-token`: OAuth2 password login.
    pub fn login_access_token(&self, form: &BodyLoginAccessToken) -> Cancelable<Token> {
        let fields = match serde_json::to_value(form) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => serde_json::Map::new(),
            Err(err) => return failed(err.into()),
        };
        let mut options = RequestOptions::new(HttpMethod::Post, "/api/v1/login/access-token")
            .media_type("application/x-www-form-urlencoded")
            .error(422, VALIDATION_ERROR);
        for (name, value) in fields {
            options = options.form_field(name, value);
        }
        self.send(options)
    }

    /// `POST /api/v1/login/test-token`: the user owning the current token.
    pub fn test_token(&self) -> Cancelable<UserPublic> {
        self.send(RequestOptions::new(HttpMethod::Post, "/api/v1/login/test-token"))
    }

    /// `GET /api/v1/users/me`
    pub fn read_user_me(&self) -> Cancelable<UserPublic> {
        self.send(RequestOptions::new(HttpMethod::Get, "/api/v1/users/me"))
    }

    /// `GET /api/v1/items/`
    pub fn read_items(&self, skip: Option<u64>, limit: Option<u64>) -> Cancelable<ItemsPublic> {
        self.send(paged("/api/v1/items/", skip, limit))
    }

    /// `POST /api/v1/items/`
    pub fn create_item(&self, item: &ItemCreate) -> Cancelable<ItemPublic> {
        self.send_json(HttpMethod::Post, "/api/v1/items/", item, |options| options)
    }

    /// `GET /api/v1/items/{id}`
    pub fn read_item(&self, id: Uuid) -> Cancelable<ItemPublic> {
        self.send(by_id(HttpMethod::Get, "/api/v1/items/{id}", id))
    }

    /// `PUT /api/v1/items/{id}`
    pub fn update_item(&self, id: Uuid, item: &ItemUpdate) -> Cancelable<ItemPublic> {
        self.send_json(HttpMethod::Put, "/api/v1/items/{id}", item, |options| {
            options.path_param("id", id)
        })
    }

    /// `DELETE /api/v1/items/{id}`
    pub fn delete_item(&self, id: Uuid) -> Cancelable<Message> {
        self.send(by_id(HttpMethod::Delete, "/api/v1/items/{id}", id))
    }

    /// `GET /api/v1/projects/`
    pub fn read_projects(&self, skip: Option<u64>, limit: Option<u64>) -> Cancelable<ProjectsPublic> {
        self.send(paged("/api/v1/projects/", skip, limit))
    }

    /// `POST /api/v1/projects/`
    pub fn create_project(&self, project: &ProjectCreate) -> Cancelable<ProjectPublic> {
        self.send_json(HttpMethod::Post, "/api/v1/projects/", project, |options| options)
    }

    /// `GET /api/v1/projects/{id}`
    pub fn read_project(&self, id: Uuid) -> Cancelable<ProjectPublic> {
        self.send(by_id(HttpMethod::Get, "/api/v1/projects/{id}", id))
    }

    /// `PUT /api/v1/projects/{id}`
    pub fn update_project(&self, id: Uuid, project: &ProjectUpdate) -> Cancelable<ProjectPublic> {
        self.send_json(HttpMethod::Put, "/api/v1/projects/{id}", project, |options| {
            options.path_param("id", id)
        })
    }

    /// `DELETE /api/v1/projects/{id}`
    pub fn delete_project(&self, id: Uuid) -> Cancelable<Message> {
        self.send(by_id(HttpMethod::Delete, "/api/v1/projects/{id}", id))
    }

    /// `POST /api/v1/password-recovery/{email}`: mail a reset link.
    pub fn recover_password(&self, email: &str) -> Cancelable<Message> {
        self.send(
            RequestOptions::new(HttpMethod::Post, "/api/v1/password-recovery/{email}")
                .path_param("email", email)
                .error(422, VALIDATION_ERROR),
        )
    }

    /// `POST /api/v1/password-recovery-html-content/{email}`: the recovery
    /// email's HTML, for superusers.
    pub fn recover_password_html_content(&self, email: &str) -> Cancelable<String> {
        self.send(
            RequestOptions::new(HttpMethod::Post, "/api/v1/password-recovery-html-content/{email}")
                .path_param("email", email)
                .error(422, VALIDATION_ERROR),
        )
    }

    /// `POST /api/v1/reset-password/`
    pub fn reset_password(&self, body: &NewPassword) -> Cancelable<Message> {
        self.send_json(HttpMethod::Post, "/api/v1/reset-password/", body, |options| options)
    }

    /// `GET /api/v1/users/`, superusers only.
    pub fn read_users(&self, skip: Option<u64>, limit: Option<u64>) -> Cancelable<UsersPublic> {
        self.send(paged("/api/v1/users/", skip, limit))
    }

    /// `POST /api/v1/users/`, superusers only.
    pub fn create_user(&self, user: &UserCreate) -> Cancelable<UserPublic> {
        self.send_json(HttpMethod::Post, "/api/v1/users/", user, |options| options)
    }

    /// `GET /api/v1/users/{id}`
    pub fn read_user_by_id(&self, id: Uuid) -> Cancelable<UserPublic> {
        self.send(by_id(HttpMethod::Get, "/api/v1/users/{id}", id))
    }

    /// `PATCH /api/v1/users/{id}`, superusers only.
    pub fn update_user(&self, id: Uuid, user: &UserUpdate) -> Cancelable<UserPublic> {
        self.send_json(HttpMethod::Patch, "/api/v1/users/{id}", user, |options| {
            options.path_param("id", id)
        })
    }

    /// `DELETE /api/v1/users/{id}`, superusers only.
    pub fn delete_user(&self, id: Uuid) -> Cancelable<Message> {
        self.send(by_id(HttpMethod::Delete, "/api/v1/users/{id}", id))
    }

    /// `POST /api/v1/users/signup`
    pub fn register_user(&self, user: &UserRegister) -> Cancelable<UserPublic> {
        self.send_json(HttpMethod::Post, "/api/v1/users/signup", user, |options| options)
    }

    /// `PATCH /api/v1/users/me`
    pub fn update_user_me(&self, user: &UserUpdateMe) -> Cancelable<UserPublic> {
        self.send_json(HttpMethod::Patch, "/api/v1/users/me", user, |options| options)
    }

    /// `PATCH /api/v1/users/me/password`
    pub fn update_password_me(&self, body: &UpdatePassword) -> Cancelable<Message> {
        self.send_json(HttpMethod::Patch, "/api/v1/users/me/password", body, |options| options)
    }

    /// `DELETE /api/v1/users/me`
    pub fn delete_user_me(&self) -> Cancelable<Message> {
        self.send(RequestOptions::new(HttpMethod::Delete, "/api/v1/users/me"))
    }

    /// Send `body` as JSON; `configure` adds the remaining parameters.
    fn send_json<T, B>(
        &self,
        method: HttpMethod,
        url: &str,
        body: &B,
        configure: impl FnOnce(RequestOptions) -> RequestOptions,
    ) -> Cancelable<T>
    where
        T: DeserializeOwned + Send + 'static,
        B: Serialize,
    {
        match json_options(method, url, body) {
            Ok(options) => self.send(configure(options)),
            Err(err) => failed(err),
        }
    }
}

fn paged(url: &str, skip: Option<u64>, limit: Option<u64>) -> RequestOptions {
    RequestOptions::new(HttpMethod::Get, url)
        .query_param("skip", skip)
        .query_param("limit", limit)
        .error(422, VALIDATION_ERROR)
}

fn by_id(method: HttpMethod, url: &str, id: Uuid) -> RequestOptions {
    RequestOptions::new(method, url)
        .path_param("id", id)
        .error(422, VALIDATION_ERROR)
}

fn json_options<B: Serialize>(method: HttpMethod, url: &str, body: &B) -> Result<RequestOptions, Error> {
    Ok(RequestOptions::new(method, url)
        .body(serde_json::to_value(body)?)
        .media_type("application/json")
        .error(422, VALIDATION_ERROR))
}

/// An operation that rejects with `err` as soon as it is polled.
fn failed<T: Send + 'static>(err: Error) -> Cancelable<T> {
    Cancelable::new(move |on_cancel| async move { on_cancel.reject(err) })
}
