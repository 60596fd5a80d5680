mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{draft_json, TestApp};

/// p1..p20, newest last. p1..p15 sit in category 7, p16..p20 in category 9.
async fn seeded_catalog() -> Result<TestApp> {
    let app = TestApp::new().await;
    for i in 1..=20 {
        let category = if i <= 15 { 7 } else { 9 };
        app.seed_product(&format!("Product {}", i), &format!("p{}", i), &[category]).await;
    }
    Ok(app)
}

async fn warm(app: &TestApp, paths: &[&str]) -> Result<()> {
    for path in paths {
        let response = app.get_as(path, &app.admin_token()).await?;
        assert_eq!(response.status, StatusCode::OK, "{}", path);
    }
    Ok(())
}

#[tokio::test]
async fn updating_a_product_purges_exactly_the_affected_keys() -> Result<()> {
    let app = seeded_catalog().await?;
    warm(
        &app,
        &[
            "/api/categories",
            "/api/products/shop/1",
            "/api/products/shop/2",
            "/api/products/shop/3",
            "/api/products/shop/1/7",
            "/api/products/shop/2/7",
            "/api/products/shop/1/9",
            "/api/products/p8",
            "/api/products/p19",
            "/api/admin/products",
        ],
    )
    .await?;
    for key in ["page:2", "category:7:page:1", "category:7:page:2", "category:9:page:1", "adminProducts", "product:p8"] {
        assert!(app.cache.contains(key), "{} should be warm", key);
    }

    // newest first with 9 per page: p8 is on page 2 of the full listing
    let id = app.store.product_id_by_slug("p8").await.expect("p8 exists");
    let response = app
        .send_json(
            Method::PUT,
            &format!("/api/admin/products/save/{}", id),
            Some(&app.admin_token()),
            draft_json("Product 8 Plus", "p8", &[7]),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK);

    for key in ["page:2", "category:7:page:1", "category:7:page:2", "adminProducts", "product:p8"] {
        assert!(!app.cache.contains(key), "{} should be purged", key);
    }
    for key in ["category:9:page:1", "product:p19", "categories"] {
        assert!(app.cache.contains(key), "{} should survive", key);
    }

    let page = app.get("/api/products/shop/2").await?;
    let names: Vec<&str> = page.body["data"]["products"]
        .as_array()
        .expect("products")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert!(names.contains(&"Product 8 Plus"));

    Ok(())
}

#[tokio::test]
async fn created_product_shows_up_on_a_cached_first_page() -> Result<()> {
    let app = TestApp::new().await;
    for i in 1..=5 {
        app.seed_product(&format!("Product {}", i), &format!("p{}", i), &[9]).await;
    }

    let before = app.get("/api/products/shop/1").await?;
    assert_eq!(before.body["data"]["products"].as_array().map(Vec::len), Some(5));
    assert!(app.cache.contains("page:1"));

    let created = app
        .send_json(
            Method::POST,
            "/api/admin/products/save",
            Some(&app.admin_token()),
            draft_json("Vitamin C", "vitamin-c", &[7]),
        )
        .await?;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.body["data"]["slug"], json!("vitamin-c"));

    let after = app.get("/api/products/shop/1").await?;
    assert_eq!(after.body["data"]["totalRows"], json!(6));
    assert_eq!(after.body["data"]["products"][0]["name"], json!("Vitamin C"));

    Ok(())
}

#[tokio::test]
async fn changing_a_slug_purges_the_old_product_key() -> Result<()> {
    let app = TestApp::new().await;
    let id = app.seed_product("Zinc", "zinc", &[9]).await;
    warm(&app, &["/api/products/zinc"]).await?;

    app.send_json(
        Method::PUT,
        &format!("/api/admin/products/save/{}", id),
        Some(&app.admin_token()),
        draft_json("Zinc", "zinc-picolinate", &[9]),
    )
    .await?;

    assert!(!app.cache.contains("product:zinc"));
    assert_eq!(app.get("/api/products/zinc").await?.status, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/api/products/zinc-picolinate").await?.status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn deleting_a_product_purges_its_pages() -> Result<()> {
    let app = TestApp::new().await;
    for i in 1..=10 {
        app.seed_product(&format!("Product {}", i), &format!("p{}", i), &[7]).await;
    }
    warm(&app, &["/api/products/shop/2", "/api/products/p1"]).await?;

    let id = app.store.product_id_by_slug("p1").await.expect("p1 exists");
    let response = app
        .send_json(
            Method::DELETE,
            &format!("/api/admin/products/delete/{}", id),
            Some(&app.admin_token()),
            json!({}),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK);

    assert!(!app.cache.contains("page:2"));
    assert!(!app.cache.contains("product:p1"));

    // nine products left: page 2 is now past the end
    let page = app.get("/api/products/shop/2").await?;
    assert_eq!(page.body["data"]["products"], json!([]));
    assert!(!app.cache.contains("page:2"));

    Ok(())
}

#[tokio::test]
async fn renaming_a_category_purges_its_listings_but_not_others() -> Result<()> {
    let app = TestApp::new().await;
    app.seed_product("Vitamin C", "vitamin-c", &[7]).await;
    app.seed_product("Zinc", "zinc", &[9]).await;
    warm(&app, &["/api/categories", "/api/products/shop/1/7", "/api/products/shop/1/9"]).await?;

    let response = app
        .send_json(
            Method::PUT,
            "/api/admin/categories/7",
            Some(&app.admin_token()),
            json!({ "name": "Immunity" }),
        )
        .await?;
    assert_eq!(response.status, StatusCode::OK);

    assert!(!app.cache.contains("categories"));
    assert!(!app.cache.contains("category:7:page:1"));
    assert!(app.cache.contains("category:9:page:1"));

    let categories = app.get("/api/categories").await?;
    let names: Vec<&str> = categories.body["data"]
        .as_array()
        .expect("categories")
        .iter()
        .filter_map(|c| c["name"].as_str())
        .collect();
    assert!(names.contains(&"Immunity"));

    Ok(())
}

#[tokio::test]
async fn failed_write_leaves_the_cache_alone() -> Result<()> {
    let app = TestApp::new().await;
    app.seed_product("Zinc", "zinc", &[9]).await;
    app.seed_product("Iron", "iron", &[9]).await;
    warm(&app, &["/api/products/shop/1", "/api/admin/products"]).await?;

    // duplicate slug
    let response = app
        .send_json(
            Method::POST,
            "/api/admin/products/save",
            Some(&app.admin_token()),
            draft_json("Zinc again", "zinc", &[9]),
        )
        .await?;
    assert_eq!(response.status, StatusCode::CONFLICT);

    assert!(app.cache.contains("page:1"));
    assert!(app.cache.contains("adminProducts"));

    Ok(())
}
