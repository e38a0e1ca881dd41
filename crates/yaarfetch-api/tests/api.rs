use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use yaarfetch_api::auth::AppStateInner;
use yaarfetch_db::Database;

fn app() -> Router {
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "integration-secret".into(),
        token_ttl: chrono::Duration::minutes(60),
    });
    yaarfetch_api::router(state)
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

struct Session {
    id: String,
    token: String,
}

async fn register(app: &Router, name: &str, phone: &str) -> Session {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": format!("{}@campus.edu", name.to_lowercase()),
            "password": "password123",
            "phone": phone,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["token_type"], "bearer");
    Session {
        id: body["user"]["id"].as_str().unwrap().to_string(),
        token: body["access_token"].as_str().unwrap().to_string(),
    }
}

async fn post_order(app: &Router, who: &Session, extra: Value) -> Value {
    let mut body = json!({ "item": "Cold coffee", "dropoff_location": "Hostel 12" });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        obj.extend(extra.clone());
    }
    let (status, order) = call(app, Method::POST, "/orders", Some(&who.token), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", order);
    order
}

async fn post_offer(app: &Router, who: &Session) -> Value {
    let (status, offer) = call(
        app,
        Method::POST,
        "/offers",
        Some(&who.token),
        Some(json!({
            "current_location": "Library",
            "destination": "Hostel 12",
            "arrival_time": "6:30 PM",
            "pickup_capability": "Food and small parcels",
            "contact_number": "9000000001",
            "delivery_charge": 20.0,
            "estimated_delivery_time": "30 min",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", offer);
    offer
}

async fn open_feed(app: &Router, who: &Session) -> Vec<String> {
    let (status, body) = call(
        app,
        Method::GET,
        "/orders?status_filter=open",
        Some(&who.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body.as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap().to_string())
        .collect()
}

fn id(value: &Value) -> &str {
    value["id"].as_str().unwrap()
}

#[tokio::test]
async fn register_login_and_me() {
    let app = app();
    let riya = register(&app, "Riya", "9111111111").await;

    let (status, me) = call(&app, Method::GET, "/auth/me", Some(&riya.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "riya@campus.edu");
    assert_eq!(me["phone"], "9111111111");
    assert!(me.get("password").is_none());

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "  RIYA@campus.edu", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], riya.id.as_str());
}

#[tokio::test]
async fn duplicate_email_conflicts_case_insensitively() {
    let app = app();
    register(&app, "Riya", "1").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "name": "Imposter", "email": "Riya@Campus.edu ", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], "Email already registered");
}

#[tokio::test]
async fn bad_login_does_not_say_which_field_was_wrong() {
    let app = app();
    register(&app, "Riya", "1").await;

    let (wrong_pw_status, wrong_pw) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "riya@campus.edu", "password": "not-the-password" })),
    )
    .await;
    let (unknown_status, unknown) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@campus.edu", "password": "password123" })),
    )
    .await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw, unknown);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let app = app();

    let (status, _) = call(&app, Method::GET, "/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(&app, Method::GET, "/auth/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "Could not validate credentials");

    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn token_for_a_user_of_another_deployment_is_rejected() {
    let app = app();
    let elsewhere = yaarfetch_api::auth::create_token(
        "integration-secret",
        yaarfetch_types::RecordId::new(),
        chrono::Duration::minutes(5),
    )
    .unwrap();

    let (status, _) = call(&app, Method::GET, "/auth/me", Some(&elsewhere), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn open_feed_hides_own_and_foreign_targeted_orders() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    let fetcher = register(&app, "Farhan", "2").await;
    let targeted = register(&app, "Tara", "3").await;

    let public = post_order(&app, &requester, json!({})).await;
    let offer = post_offer(&app, &targeted).await;
    let private = post_order(&app, &requester, json!({ "target_offer_id": id(&offer) })).await;
    assert_eq!(private["target_fetcher_id"], targeted.id.as_str());

    assert!(open_feed(&app, &requester).await.is_empty());

    let feed = open_feed(&app, &fetcher).await;
    assert_eq!(feed, vec![id(&public).to_string()]);

    let feed = open_feed(&app, &targeted).await;
    assert_eq!(feed.len(), 2);
    assert!(feed.contains(&id(&private).to_string()));

    // Filtering by offer narrows to requests made against it.
    let (status, by_offer) = call(
        &app,
        Method::GET,
        &format!("/orders?target_offer_id={}", id(&offer)),
        Some(&targeted.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_offer.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unfiltered_listing_is_not_viewer_filtered() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    post_order(&app, &requester, json!({})).await;

    let (status, all) = call(&app, Method::GET, "/orders", Some(&requester.token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["requester_name"], "Riya");
    assert_eq!(all[0]["requester_contact"], "1");
}

#[tokio::test]
async fn busy_requester_still_sees_foreign_open_orders() {
    let app = app();
    let other = register(&app, "Olu", "1").await;
    let viewer = register(&app, "Vik", "2").await;

    let foreign = post_order(&app, &other, json!({})).await;
    for _ in 0..100 {
        post_order(&app, &viewer, json!({})).await;
    }

    let feed = open_feed(&app, &viewer).await;
    assert_eq!(feed, vec![id(&foreign).to_string()]);

    let feed = open_feed(&app, &other).await;
    assert_eq!(feed.len(), 100);
    assert!(!feed.contains(&id(&foreign).to_string()));
}

#[tokio::test]
async fn invalid_listing_parameters_are_validation_errors() {
    let app = app();
    let who = register(&app, "Riya", "1").await;

    let (status, _) = call(
        &app,
        Method::GET,
        "/orders?status_filter=cancelled",
        Some(&who.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(
        &app,
        Method::GET,
        "/orders?target_offer_id=nope",
        Some(&who.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = call(&app, Method::POST, "/orders/nope/accept", Some(&who.token), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn order_against_missing_offer_is_not_found() {
    let app = app();
    let who = register(&app, "Riya", "1").await;

    let (status, _) = call(
        &app,
        Method::POST,
        "/orders",
        Some(&who.token),
        Some(json!({
            "item": "Chips",
            "dropoff_location": "Gate",
            "target_offer_id": yaarfetch_types::RecordId::new().to_string(),
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_accepts_have_exactly_one_winner() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    let mut fetchers = Vec::new();
    for name in ["Farhan", "Gita", "Hari", "Isha"] {
        fetchers.push(register(&app, name, "2").await);
    }
    let order = post_order(&app, &requester, json!({})).await;
    let uri = format!("/orders/{}/accept", id(&order));

    let attempts = fetchers
        .iter()
        .map(|f| call(&app, Method::POST, &uri, Some(&f.token), None));
    let results = futures_util::future::join_all(attempts).await;

    let winners: Vec<&Value> = results
        .iter()
        .filter(|(status, _)| *status == StatusCode::OK)
        .map(|(_, body)| body)
        .collect();
    let losers = results
        .iter()
        .filter(|(status, body)| {
            *status == StatusCode::CONFLICT
                && body["detail"] == "Order not available for acceptance"
        })
        .count();

    assert_eq!(winners.len(), 1);
    assert_eq!(losers, fetchers.len() - 1);

    let winner_id = winners[0]["fetcher_id"].as_str().unwrap();
    assert!(fetchers.iter().any(|f| f.id == winner_id));
    assert_eq!(winners[0]["status"], "accepted");

    let (_, all) = call(&app, Method::GET, "/orders?status_filter=accepted", Some(&requester.token), None).await;
    assert_eq!(all[0]["fetcher_id"], winner_id);
}

#[tokio::test]
async fn accepting_a_missing_order_is_not_found() {
    let app = app();
    let who = register(&app, "Riya", "1").await;
    let uri = format!("/orders/{}/accept", yaarfetch_types::RecordId::new());

    let (status, _) = call(&app, Method::POST, &uri, Some(&who.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contacts_are_disclosed_once_matched() {
    let app = app();
    let requester = register(&app, "Riya", "111").await;
    let fetcher = register(&app, "Farhan", "222").await;
    let outsider = register(&app, "Uma", "333").await;

    let order = post_order(&app, &requester, json!({})).await;
    assert_eq!(order["requester_contact"], "111");
    assert!(order.get("fetcher_contact").is_none());

    let (_, feed) = call(&app, Method::GET, "/orders?status_filter=open", Some(&fetcher.token), None).await;
    assert!(feed[0].get("requester_contact").is_none());
    assert_eq!(feed[0]["requester_name"], "Riya");

    let (status, accepted) = call(
        &app,
        Method::POST,
        &format!("/orders/{}/accept", id(&order)),
        Some(&fetcher.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(accepted["requester_contact"], "111");
    assert_eq!(accepted["fetcher_contact"], "222");
    assert_eq!(accepted["fetcher_name"], "Farhan");

    for (who, sees) in [(&requester, true), (&fetcher, true), (&outsider, false)] {
        let (_, listing) = call(
            &app,
            Method::GET,
            "/orders?status_filter=accepted",
            Some(&who.token),
            None,
        )
        .await;
        let o = &listing[0];
        assert_eq!(o.get("requester_contact").is_some(), sees);
        assert_eq!(o.get("fetcher_contact").is_some(), sees);
    }
}

#[tokio::test]
async fn only_the_fetcher_moves_status() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    let fetcher = register(&app, "Farhan", "2").await;
    let order = post_order(&app, &requester, json!({})).await;
    let status_uri = format!("/orders/{}/status", id(&order));

    // Nobody is assigned yet.
    let (status, _) = call(
        &app,
        Method::PATCH,
        &status_uri,
        Some(&requester.token),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    call(&app, Method::POST, &format!("/orders/{}/accept", id(&order)), Some(&fetcher.token), None).await;

    let (status, _) = call(
        &app,
        Method::PATCH,
        &status_uri,
        Some(&requester.token),
        Some(json!({ "status": "picked_up" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::PATCH,
        &status_uri,
        Some(&fetcher.token),
        Some(json!({ "status": "teleported" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        &app,
        Method::PATCH,
        &status_uri,
        Some(&fetcher.token),
        Some(json!({ "status": "picked_up" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "picked_up");

    let (_, listing) = call(
        &app,
        Method::GET,
        "/orders?status_filter=picked_up",
        Some(&requester.token),
        None,
    )
    .await;
    assert_eq!(listing[0]["id"], id(&order));

    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/orders/{}/status", yaarfetch_types::RecordId::new()),
        Some(&fetcher.token),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn releasing_an_order_puts_it_back_on_the_market() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    let fetcher = register(&app, "Farhan", "2").await;
    let other = register(&app, "Gita", "3").await;
    let order = post_order(&app, &requester, json!({})).await;

    call(&app, Method::POST, &format!("/orders/{}/accept", id(&order)), Some(&fetcher.token), None).await;
    let (status, body) = call(
        &app,
        Method::PATCH,
        &format!("/orders/{}/status", id(&order)),
        Some(&fetcher.token),
        Some(json!({ "status": "open" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["fetcher_id"].is_null());

    assert_eq!(open_feed(&app, &other).await, vec![id(&order).to_string()]);

    // Once someone else holds the order, the previous fetcher is locked out.
    let (status, _) = call(&app, Method::POST, &format!("/orders/{}/accept", id(&order)), Some(&other.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/orders/{}/status", id(&order)),
        Some(&fetcher.token),
        Some(json!({ "status": "delivered" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn chat_is_limited_to_participants_and_ordered() {
    let app = app();
    let requester = register(&app, "Riya", "1").await;
    let fetcher = register(&app, "Farhan", "2").await;
    let outsider = register(&app, "Uma", "3").await;
    let order = post_order(&app, &requester, json!({})).await;
    let uri = format!("/chat/{}/messages", id(&order));

    call(&app, Method::POST, &format!("/orders/{}/accept", id(&order)), Some(&fetcher.token), None).await;

    for (who, text) in [(&requester, "where are you?"), (&fetcher, "at the gate"), (&requester, "coming")] {
        let (status, msg) = call(&app, Method::POST, &uri, Some(&who.token), Some(json!({ "content": text }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(msg["sender_id"], who.id.as_str());
    }

    let (status, _) = call(&app, Method::POST, &uri, Some(&outsider.token), Some(json!({ "content": "hi" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::GET, &uri, Some(&outsider.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, history) = call(&app, Method::GET, &uri, Some(&fetcher.token), None).await;
    assert_eq!(status, StatusCode::OK);
    let history = history.as_array().unwrap();
    let contents: Vec<&str> = history.iter().map(|m| m["content"].as_str().unwrap()).collect();
    assert_eq!(contents, vec!["where are you?", "at the gate", "coming"]);
    assert_eq!(history[1]["sender_name"], "Farhan");

    let stamps: Vec<&str> = history.iter().map(|m| m["created_at"].as_str().unwrap()).collect();
    let parsed: Vec<chrono::DateTime<chrono::Utc>> = stamps.iter().map(|s| s.parse().unwrap()).collect();
    assert!(parsed.windows(2).all(|w| w[0] <= w[1]));

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/chat/{}/messages", yaarfetch_types::RecordId::new()),
        Some(&requester.token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offers_are_edited_only_by_their_owner() {
    let app = app();
    let owner = register(&app, "Farhan", "2").await;
    let other = register(&app, "Riya", "1").await;
    let offer = post_offer(&app, &owner).await;
    let uri = format!("/offers/{}", id(&offer));

    let (status, _) = call(&app, Method::PATCH, &uri, Some(&other.token), Some(json!({ "notes": "mine now" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, Method::DELETE, &uri, Some(&other.token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = call(
        &app,
        Method::PATCH,
        &uri,
        Some(&owner.token),
        Some(json!({ "destination": "Main gate", "notes": "UPI only" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["destination"], "Main gate");
    assert_eq!(updated["notes"], "UPI only");
    assert_eq!(updated["current_location"], "Library");
    assert_eq!(updated["delivery_charge"], 20.0);

    let (status, cleared) = call(
        &app,
        Method::PATCH,
        &uri,
        Some(&owner.token),
        Some(json!({ "notes": null, "delivery_charge": null })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cleared["notes"].is_null());
    assert!(cleared["delivery_charge"].is_null());
    assert_eq!(cleared["destination"], "Main gate");

    let (_, listed) = call(&app, Method::GET, "/offers", Some(&other.token), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = call(&app, Method::DELETE, &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = call(&app, Method::PATCH, &uri, Some(&owner.token), Some(json!({ "notes": "x" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, Method::GET, &uri, Some(&owner.token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offer_validation_runs_before_the_store() {
    let app = app();
    let owner = register(&app, "Farhan", "2").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/offers",
        Some(&owner.token),
        Some(json!({
            "current_location": "Library",
            "destination": "Hostel 12",
            "arrival_time": "6:30 PM",
            "pickup_capability": "Food",
            "contact_number": "123456789012345678901",
            "estimated_delivery_time": "30 min",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "contact_number must be at most 20 characters");
}
