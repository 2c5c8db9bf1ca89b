//! Login, user, password-recovery, item and project flows against the live
//! mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every `ApiClient`
//! endpoint over real HTTP through `UreqTransport`. Validates URL building,
//! form and JSON encoding, auth headers and error classification end-to-end.

use std::net::SocketAddr;

use api_core::types::{
    BodyLoginAccessToken, ItemCreate, ItemUpdate, NewPassword, ProjectCreate, ProjectUpdate, UpdatePassword,
    UserCreate, UserRegister, UserUpdate, UserUpdateMe,
};
use api_core::{ApiClient, ClientConfig, UreqTransport};

fn start_server() -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });
    addr
}

fn client(addr: SocketAddr) -> ApiClient<UreqTransport> {
    ApiClient::new(ClientConfig::new(format!("http://{addr}")), UreqTransport::default())
}

/// A client for `addr` already carrying a token for `email`.
async fn logged_in(addr: SocketAddr, email: &str, password: &str) -> ApiClient<UreqTransport> {
    let mut client = client(addr);
    let token = client
        .login_access_token(&BodyLoginAccessToken::new(email, password))
        .await
        .unwrap();
    client.config_mut().token = Some(token.access_token.into());
    client
}

#[tokio::test]
async fn login_and_item_lifecycle() {
    let mut client = client(start_server());

    // Step 1: log in and keep the token.
    let token = client
        .login_access_token(&BodyLoginAccessToken::new(
            mock_server::ADMIN_EMAIL,
            mock_server::ADMIN_PASSWORD,
        ))
        .await
        .unwrap();
    assert_eq!(token.token_type, "bearer");
    client.config_mut().token = Some(token.access_token.into());

    // Step 2: the token identifies the admin.
    let me = client.read_user_me().await.unwrap();
    assert_eq!(me.email, mock_server::ADMIN_EMAIL);
    assert_eq!(client.test_token().await.unwrap().id, me.id);

    // Step 3: list is empty.
    let page = client.read_items(None, None).await.unwrap();
    assert_eq!(page.count, 0);

    // Step 4: create.
    let created = client
        .create_item(&ItemCreate {
            title: "Integration test".to_string(),
            description: None,
        })
        .await
        .unwrap();
    assert_eq!(created.title, "Integration test");
    assert_eq!(created.owner_id, me.id);
    let id = created.id;

    // Step 5: read back.
    assert_eq!(client.read_item(id).await.unwrap(), created);

    // Step 6: partial update.
    let updated = client
        .update_item(
            id,
            &ItemUpdate {
                description: Some("now described".to_string()),
                ..ItemUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Integration test");
    assert_eq!(updated.description.as_deref(), Some("now described"));

    // Step 7: paging.
    let page = client.read_items(Some(0), Some(1)).await.unwrap();
    assert_eq!(page.count, 1);
    assert_eq!(page.data[0].id, id);

    // Step 8: delete.
    let message = client.delete_item(id).await.unwrap();
    assert_eq!(message.message, "Item deleted successfully");

    // Step 9: read after delete is a classified 404.
    let err = client.read_item(id).await.unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.status, 404);
    assert_eq!(api.message, "Not Found");
    assert_eq!(api.body.as_ref().unwrap()["detail"], "Item not found");
    assert_eq!(api.url, format!("{}/api/v1/items/{id}", client.config().base));
}

#[tokio::test]
async fn anonymous_calls_are_unauthorized() {
    let client = client(start_server());
    let err = client.read_user_me().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.to_string(), "Unauthorized");
}

#[tokio::test]
async fn wrong_password_is_a_bad_request() {
    let client = client(start_server());
    let err = client
        .login_access_token(&BodyLoginAccessToken::new(mock_server::ADMIN_EMAIL, "nope"))
        .await
        .unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.message, "Bad Request");
    assert_eq!(api.body.as_ref().unwrap()["detail"], "Incorrect email or password");
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr).read_user_me().await.unwrap_err();
    assert!(matches!(err, api_core::Error::Transport(_)));
    assert_eq!(err.status(), None);
}

#[tokio::test]
async fn user_administration() {
    let addr = start_server();
    let admin = logged_in(addr, mock_server::ADMIN_EMAIL, mock_server::ADMIN_PASSWORD).await;

    // Step 1: create a regular user.
    let created = admin
        .create_user(&UserCreate::new("worker@example.com", "secret123"))
        .await
        .unwrap();
    assert!(created.is_active);
    assert!(!created.is_superuser);

    // Step 2: the email is taken now.
    let err = admin
        .create_user(&UserCreate::new("worker@example.com", "other1234"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));

    // Step 3: list and read back.
    let users = admin.read_users(None, None).await.unwrap();
    assert_eq!(users.count, 2);
    assert_eq!(admin.read_user_by_id(created.id).await.unwrap(), created);

    // Step 4: rename, then log in with a password set by the admin.
    let updated = admin
        .update_user(
            created.id,
            &UserUpdate {
                full_name: Some("Worker Bee".to_string()),
                password: Some("changed123".to_string()),
                ..UserUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.full_name.as_deref(), Some("Worker Bee"));
    let worker = logged_in(addr, "worker@example.com", "changed123").await;

    // Step 5: a regular user cannot administer users.
    let err = worker.read_users(None, None).await.unwrap_err();
    assert_eq!(err.status(), Some(403));

    // Step 6: delete, after which the id is unknown.
    let message = admin.delete_user(created.id).await.unwrap();
    assert_eq!(message.message, "User deleted successfully");
    let err = admin.read_user_by_id(created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[tokio::test]
async fn signup_and_self_service() {
    let addr = start_server();

    // Step 1: sign up anonymously and log in.
    let registered = client(addr)
        .register_user(&UserRegister {
            email: "new@example.com".to_string(),
            password: "first-pass".to_string(),
            full_name: None,
        })
        .await
        .unwrap();
    let me = logged_in(addr, "new@example.com", "first-pass").await;
    assert_eq!(me.read_user_me().await.unwrap(), registered);

    // Step 2: update the profile.
    let updated = me
        .update_user_me(&UserUpdateMe {
            full_name: Some("New Person".to_string()),
            ..UserUpdateMe::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.full_name.as_deref(), Some("New Person"));

    // Step 3: a wrong current password is refused.
    let err = me
        .update_password_me(&UpdatePassword {
            current_password: "not-it".to_string(),
            new_password: "second-pass".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.api_error().unwrap().body.as_ref().unwrap()["detail"], "Incorrect password");

    // Step 4: change the password; only the new one logs in.
    me.update_password_me(&UpdatePassword {
        current_password: "first-pass".to_string(),
        new_password: "second-pass".to_string(),
    })
    .await
    .unwrap();
    let err = client(addr)
        .login_access_token(&BodyLoginAccessToken::new("new@example.com", "first-pass"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    logged_in(addr, "new@example.com", "second-pass").await;

    // Step 5: delete the account; the session goes with it.
    let message = me.delete_user_me().await.unwrap();
    assert_eq!(message.message, "User deleted successfully");
    let err = me.test_token().await.unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[tokio::test]
async fn superusers_cannot_delete_themselves() {
    let admin = logged_in(start_server(), mock_server::ADMIN_EMAIL, mock_server::ADMIN_PASSWORD).await;
    let err = admin.delete_user_me().await.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert!(admin.read_user_me().await.is_ok());
}

#[tokio::test]
async fn password_recovery_and_reset() {
    let addr = start_server();
    let admin = logged_in(addr, mock_server::ADMIN_EMAIL, mock_server::ADMIN_PASSWORD).await;
    admin
        .create_user(&UserCreate::new("forgetful@example.com", "lost-it1"))
        .await
        .unwrap();

    // Step 1: anyone may ask for a recovery email; unknown addresses are 404.
    let anonymous = client(addr);
    let sent = anonymous.recover_password("forgetful@example.com").await.unwrap();
    assert_eq!(sent.message, "Password recovery email sent");
    let err = anonymous.recover_password("ghost@example.com").await.unwrap_err();
    assert_eq!(err.status(), Some(404));

    // Step 2: the admin previews the email and takes the token from its link.
    let html = admin
        .recover_password_html_content("forgetful@example.com")
        .await
        .unwrap();
    let token = html
        .split("token=")
        .nth(1)
        .and_then(|rest| rest.split('"').next())
        .unwrap()
        .to_string();

    // Step 3: reset and log in with the new password.
    let reset = NewPassword {
        token,
        new_password: "found-it1".to_string(),
    };
    let message = anonymous.reset_password(&reset).await.unwrap();
    assert_eq!(message.message, "Password updated successfully");
    logged_in(addr, "forgetful@example.com", "found-it1").await;

    // Step 4: the token is spent.
    let err = anonymous.reset_password(&reset).await.unwrap_err();
    let api = err.api_error().unwrap();
    assert_eq!(api.status, 400);
    assert_eq!(api.body.as_ref().unwrap()["detail"], "Invalid token");
}

#[tokio::test]
async fn project_lifecycle() {
    let client = logged_in(start_server(), mock_server::ADMIN_EMAIL, mock_server::ADMIN_PASSWORD).await;

    let created = client
        .create_project(&ProjectCreate {
            title: "Apollo".to_string(),
            description: Some("moonshot".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(client.read_project(created.id).await.unwrap(), created);

    let updated = client
        .update_project(
            created.id,
            &ProjectUpdate {
                title: Some("Artemis".to_string()),
                ..ProjectUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Artemis");
    assert_eq!(updated.description.as_deref(), Some("moonshot"));

    // Projects and items are separate collections.
    assert_eq!(client.read_projects(None, None).await.unwrap().count, 1);
    assert_eq!(client.read_items(None, None).await.unwrap().count, 0);

    let message = client.delete_project(created.id).await.unwrap();
    assert_eq!(message.message, "Project deleted successfully");
    let err = client.read_project(created.id).await.unwrap_err();
    assert_eq!(err.api_error().unwrap().body.as_ref().unwrap()["detail"], "Project not found");
}
