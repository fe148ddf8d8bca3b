//! End-to-end storefront scenarios.
//!
//! Cognito and the catalog API are both served by one `mockito` server:
//! Cognito calls are `POST /` with an `X-Amz-Target` header, catalog calls
//! live under `/products`.

#![allow(clippy::unwrap_used)]

use mockito::{Matcher, Server};
use secrecy::ExposeSecret;
use serde_json::json;

use ann_traders_core::{CurrencyCode, Email, NewProduct, Product, RouteDecision};
use ann_traders_integration_tests::{auth_response, config_for, id_token, temp_session_file};
use ann_traders_storefront::AppState;
use ann_traders_storefront::catalog::{ImageOutcome, ImageUpload, publish_product};
use ann_traders_storefront::routes::Route;
use ann_traders_storefront::session::SessionStatus;

const TARGET: &str = "x-amz-target";

async fn sign_in_mock(server: &mut Server, token: &str) -> mockito::Mock {
    server
        .mock("POST", "/")
        .match_header(TARGET, "AWSCognitoIdentityProviderService.InitiateAuth")
        .match_body(Matcher::PartialJson(json!({ "AuthFlow": "USER_PASSWORD_AUTH" })))
        .with_status(200)
        .with_body(auth_response(token))
        .create_async()
        .await
}

#[tokio::test]
async fn session_survives_restart_and_logout_clears_it() {
    let mut server = Server::new_async().await;
    let session_file = temp_session_file();
    let token = id_token("buyer@shop.com", &["user"]);
    sign_in_mock(&mut server, &token).await;
    server
        .mock("POST", "/")
        .match_header(TARGET, "AWSCognitoIdentityProviderService.GlobalSignOut")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    // First run: sign in.
    {
        let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
        let email: Email = "buyer@shop.com".parse().unwrap();
        let status = state
            .session()
            .sign_in(&email, &"pw".to_string().into())
            .await
            .unwrap();
        assert!(status.groups().contains("user"));
    }

    // Second run: the stored session is restored.
    let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
    let status = state.session().restore_session().await;
    assert!(status.is_authenticated());
    assert_eq!(
        state.session().bearer_token().unwrap().expose_secret(),
        token.as_str()
    );

    // Shoppers are kept away from the admin page and the login page.
    assert_eq!(state.navigate("/add-product").unwrap().shown, Route::Home);
    assert_eq!(state.navigate("/login").unwrap().shown, Route::Home);

    state.session().logout().await;
    assert_eq!(state.session().status(), SessionStatus::Anonymous);

    // Third run: nothing to restore.
    let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
    assert_eq!(state.session().restore_session().await, SessionStatus::Anonymous);
    assert_eq!(state.navigate("/add-product").unwrap().shown, Route::Login);

    let _ = std::fs::remove_dir_all(session_file.parent().unwrap());
}

#[tokio::test]
async fn failed_remote_sign_out_still_signs_out_locally() {
    let mut server = Server::new_async().await;
    let session_file = temp_session_file();
    sign_in_mock(&mut server, &id_token("a@shop.com", &["admin"])).await;
    server
        .mock("POST", "/")
        .match_header(TARGET, "AWSCognitoIdentityProviderService.GlobalSignOut")
        .with_status(503)
        .with_body(json!({ "__type": "ServiceUnavailable", "message": "down" }).to_string())
        .create_async()
        .await;

    let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
    let email: Email = "a@shop.com".parse().unwrap();
    state
        .session()
        .sign_in(&email, &"pw".to_string().into())
        .await
        .unwrap();

    state.session().logout().await;
    assert!(!state.session().is_authenticated());

    let restarted = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
    assert!(!restarted.session().is_authenticated());
    assert_eq!(
        restarted.session().restore_session().await,
        SessionStatus::Anonymous
    );

    let _ = std::fs::remove_dir_all(session_file.parent().unwrap());
}

#[tokio::test]
async fn admin_publishes_product_then_shopper_buys_it() {
    let mut server = Server::new_async().await;
    let session_file = temp_session_file();
    let admin_token = id_token("admin@shop.com", &["admin", "user"]);
    sign_in_mock(&mut server, &admin_token).await;

    let saved = json!({
        "id": 11,
        "sku": "TEA-11",
        "title": "Sencha",
        "description": "Steamed green tea",
        "price": 9.5,
        "currency": "USD",
        "category": "tea",
    });
    let create = server
        .mock("POST", "/products")
        .match_header("authorization", format!("Bearer {admin_token}").as_str())
        .with_status(201)
        .with_body(saved.to_string())
        .create_async()
        .await;
    let upload_url = format!("{}/s3/products/11/sencha.png", server.url());
    server
        .mock("POST", "/products/11/presign-upload")
        .with_status(200)
        .with_body(json!({ "url": upload_url, "key": "products/11/sencha.png" }).to_string())
        .create_async()
        .await;
    server
        .mock("PUT", "/s3/products/11/sencha.png")
        .match_header("content-type", "image/png")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("POST", "/products/11/confirm-upload")
        .match_body(Matcher::Json(json!({ "key": "products/11/sencha.png" })))
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let mut listed = saved.clone();
    listed["imageUrl"] = json!("https://img.example.com/sencha.png");
    server
        .mock("GET", "/products/11")
        .with_status(200)
        .with_body(listed.to_string())
        .create_async()
        .await;

    let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();
    let email: Email = "admin@shop.com".parse().unwrap();
    state
        .session()
        .sign_in(&email, &"pw".to_string().into())
        .await
        .unwrap();

    let nav = state.navigate("/add-product").unwrap();
    assert_eq!(nav.decision, RouteDecision::Allow);
    assert!(state.nav_menu().links.contains(&Route::AddProduct));

    let draft = NewProduct {
        sku: "TEA-11".to_string(),
        title: "Sencha".to_string(),
        description: "Steamed green tea".to_string(),
        price: NewProduct::parse_price("9.50").unwrap(),
        currency: CurrencyCode::USD,
        category: "tea".to_string(),
    };
    let image = ImageUpload::new("sencha.png", vec![0x89, b'P', b'N', b'G']).unwrap();
    let token = state.session().bearer_token().unwrap();
    let outcome = publish_product(state.catalog(), &draft, Some(image), &token)
        .await
        .unwrap();
    create.assert_async().await;
    assert_eq!(
        outcome.image,
        ImageOutcome::Uploaded {
            key: "products/11/sencha.png".to_string()
        }
    );

    // Shop: add, add again, adjust, check out.
    let product = state.catalog().get_product(outcome.product.id).await.unwrap();
    assert_eq!(
        product.image_url.as_deref(),
        Some("https://img.example.com/sencha.png")
    );
    assert_eq!(state.add_to_cart(product.clone(), 2), RouteDecision::Allow);
    assert_eq!(state.add_to_cart(product.clone(), 1), RouteDecision::Allow);
    assert_eq!(state.nav_menu().cart_badge().as_deref(), Some("3"));

    state.with_cart(|cart| cart.update_quantity(product.id, 4));
    let summary = state.checkout().unwrap();
    assert_eq!(summary.total_quantity, 4);
    assert_eq!(summary.subtotal, rust_decimal::Decimal::from(38));
    assert!(state.cart_snapshot().is_empty());

    let _ = std::fs::remove_dir_all(session_file.parent().unwrap());
}

#[tokio::test]
async fn anonymous_visitor_is_sent_to_login() {
    let server = Server::new_async().await;
    let session_file = temp_session_file();
    let state = AppState::new(config_for(&server.url(), &session_file).unwrap()).unwrap();

    let product: Product = serde_json::from_value(json!({
        "id": 1,
        "sku": "SKU-1",
        "title": "Chai",
        "price": 4,
    }))
    .unwrap();
    assert_eq!(state.add_to_cart(product, 1), RouteDecision::RedirectToLogin);
    assert!(state.cart_snapshot().is_empty());

    let menu = state.nav_menu();
    assert!(!menu.signed_in);
    assert_eq!(menu.cart, None);
    assert_eq!(state.navigate("/register").unwrap().shown, Route::Register);
}
