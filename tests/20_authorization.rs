mod common;

use anyhow::Result;
use axum::http::{header, Method, StatusCode};
use serde_json::json;

use catalog_gateway::auth::password::hash_password;
use catalog_gateway::database::models::UserCredentials;
use common::{expired_token, forged_token, TestApp};

const ADMIN_PRODUCTS: &str = "/api/admin/products";

#[tokio::test]
async fn admin_api_without_cookie_is_rejected() -> Result<()> {
    let app = TestApp::new().await;

    let response = app.get(ADMIN_PRODUCTS).await?;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "error": "No token" }));

    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected() -> Result<()> {
    let app = TestApp::new().await;

    let response = app.get_as(ADMIN_PRODUCTS, &expired_token("admin")).await?;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "error": "Token expired" }));

    Ok(())
}

#[tokio::test]
async fn forged_and_malformed_tokens_are_invalid() -> Result<()> {
    let app = TestApp::new().await;

    for token in [forged_token("admin"), "not-a-jwt".to_string()] {
        let response = app.get_as(ADMIN_PRODUCTS, &token).await?;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body, json!({ "error": "Invalid token" }));
    }

    Ok(())
}

#[tokio::test]
async fn non_admin_role_is_unauthorized() -> Result<()> {
    let app = TestApp::new().await;

    let response = app.get_as(ADMIN_PRODUCTS, &app.token_for(42, "customer")).await?;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body, json!({ "error": "Unauthorized" }));

    Ok(())
}

#[tokio::test]
async fn admin_token_reaches_the_handler() -> Result<()> {
    let app = TestApp::new().await;
    app.seed_product("Zinc", "zinc", &[9]).await;

    let response = app.get_as(ADMIN_PRODUCTS, &app.admin_token()).await?;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], json!(true));
    assert_eq!(response.body["data"][0]["slug"], json!("zinc"));

    Ok(())
}

#[tokio::test]
async fn admin_ui_without_session_redirects_to_login() -> Result<()> {
    let app = TestApp::new().await;

    for response in [
        app.get("/admin/orders?page=2").await?,
        app.get_as("/admin/orders?page=2", &expired_token("admin")).await?,
    ] {
        assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
        let location = response.headers.get(header::LOCATION).expect("Location header").to_str()?;
        assert_eq!(location, "/login?next=%2Fadmin%2Forders%3Fpage%3D2");
    }

    Ok(())
}

#[tokio::test]
async fn admin_ui_with_bad_signature_or_role_is_not_redirected() -> Result<()> {
    let app = TestApp::new().await;

    let forged = app.get_as("/admin", &forged_token("admin")).await?;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.body, json!({ "error": "Invalid token" }));

    let customer = app.get_as("/admin", &app.token_for(42, "customer")).await?;
    assert_eq!(customer.status, StatusCode::UNAUTHORIZED);
    assert_eq!(customer.body, json!({ "error": "Unauthorized" }));

    Ok(())
}

#[tokio::test]
async fn admin_ui_with_session_passes_the_gate() -> Result<()> {
    let app = TestApp::new().await;

    // the gateway does not serve the admin UI itself
    let response = app.get_as("/admin/orders", &app.admin_token()).await?;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn storefront_routes_ignore_bad_cookies() -> Result<()> {
    let app = TestApp::new().await;

    let response = app.get_as("/api/categories", &forged_token("admin")).await?;
    assert_eq!(response.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn login_sets_a_cookie_that_opens_the_admin_api() -> Result<()> {
    let app = TestApp::new().await;
    app.store
        .insert_user(UserCredentials {
            id: 1,
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            password: hash_password("s3cret-pass")?,
            role: "admin".to_string(),
        })
        .await;

    let wrong = app
        .send_json(
            Method::POST,
            "/api/auth",
            None,
            json!({ "email": "admin@example.com", "password": "guess" }),
        )
        .await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.body["error"], json!("Invalid email or password"));

    let login = app
        .send_json(
            Method::POST,
            "/api/auth",
            None,
            json!({ "email": "Admin@Example.com", "password": "s3cret-pass" }),
        )
        .await?;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["data"]["user"]["role"], json!("admin"));

    let set_cookie = login.headers.get(header::SET_COOKIE).expect("Set-Cookie").to_str()?;
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    // development sessions last 15 minutes
    assert!(set_cookie.contains("Max-Age=900"));

    let token = login.body["data"]["token"].as_str().expect("token").to_string();

    let whoami = app.get_as("/api/auth/whoami", &token).await?;
    assert_eq!(whoami.status, StatusCode::OK);
    assert_eq!(whoami.body["data"]["email"], json!("admin@example.com"));

    let admin = app.get_as(ADMIN_PRODUCTS, &token).await?;
    assert_eq!(admin.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn logout_clears_the_cookie() -> Result<()> {
    let app = TestApp::new().await;

    let response = app
        .send_json(Method::POST, "/api/auth/logout", Some(&app.admin_token()), json!({}))
        .await?;
    assert_eq!(response.status, StatusCode::OK);

    let set_cookie = response.headers.get(header::SET_COOKIE).expect("Set-Cookie").to_str()?;
    assert!(set_cookie.starts_with("token="));
    assert!(set_cookie.contains("Max-Age=0"));

    Ok(())
}
