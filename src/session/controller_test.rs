use std::sync::Mutex as StdMutex;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};

use super::*;
use crate::config::HttpTimeouts;
use crate::error::ErrorKind;
use crate::net::StaticProbe;
use crate::session::backend::{DEMO_PASSWORD, DEMO_USERNAME, MOCK_TOKEN, demo_user};
use crate::test_helpers::{customer, dead_url, provider, spawn_server};
use crate::user::UserType;

// =============================================================================
// FAKE BACKEND
// =============================================================================

#[derive(Clone, Default)]
struct Fake {
    registered: Arc<StdMutex<Vec<Value>>>,
    updates_supported: bool,
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned)
}

fn customer_json() -> Value {
    json!({ "id": 11, "email": "c@x.com", "first_name": "Cus", "last_name": "Tomer", "username": "customer", "is_provider": false })
}

fn provider_json() -> Value {
    json!({ "id": 22, "email": "p@x.com", "first_name": "Pro", "last_name": "Vider", "username": "provider", "is_provider": true, "service_category": "plumbing" })
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "pw" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "No active account found with the given credentials" })))
            .into_response();
    }
    match body["email"].as_str() {
        Some("c@x.com") => Json(json!({ "token": "tok-c", "user": customer_json() })).into_response(),
        Some("p@x.com") => Json(json!({ "access": "tok-p", "user": provider_json() })).into_response(),
        Some("notoken@x.com") => Json(json!({ "access": "tok-c" })).into_response(),
        Some("slowprofile@x.com") => Json(json!({ "access": "tok-slow" })).into_response(),
        Some("nulls@x.com") => Json(json!({
            "token": "tok-n",
            "user": {
                "id": 3,
                "email": "nulls@x.com",
                "first_name": "N",
                "last_name": null,
                "username": null,
                "is_provider": false,
                "verified": null,
            },
        }))
        .into_response(),
        Some("slow@x.com") => {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Json(json!({ "token": "tok-c", "user": customer_json() })).into_response()
        }
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "No active account found with the given credentials" })))
            .into_response(),
    }
}

async fn register(State(fake): State<Fake>, Json(body): Json<Value>) -> Response {
    fake.registered.lock().unwrap().push(body.clone());
    if body["email"] == "pending@x.com" {
        return (StatusCode::CREATED, Json(json!({ "message": "Check your inbox to verify your account." }))).into_response();
    }
    if body["email"] == "taken@x.com" {
        return (StatusCode::BAD_REQUEST, Json(json!({ "email": ["user with this email already exists."] }))).into_response();
    }
    let user = json!({
        "id": 5,
        "email": body["email"],
        "first_name": body["first_name"],
        "last_name": body["last_name"],
        "is_provider": body["is_provider"],
    });
    Json(json!({ "token": "tok-r", "user": user })).into_response()
}

async fn profile(headers: HeaderMap) -> Response {
    match bearer(&headers).as_deref() {
        Some("tok-c") => Json(json!({ "user": customer_json() })).into_response(),
        Some("tok-p") => Json(provider_json()).into_response(),
        Some("tok-slow") => {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Json(customer_json()).into_response()
        }
        Some("tok-r") => Json(json!({ "id": 5, "email": "a@b.com", "first_name": "A", "last_name": "B" })).into_response(),
        Some("flaky") => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({ "code": "token_not_valid", "detail": "Given token not valid for any token type" })))
            .into_response(),
    }
}

async fn update(State(fake): State<Fake>, Json(patch): Json<Value>) -> Response {
    if !fake.updates_supported {
        return (StatusCode::NOT_FOUND, Json(json!({ "code": "endpoint_not_supported", "message": "Profile update is not supported by the server." })))
            .into_response();
    }
    let mut user = customer_json();
    if let (Value::Object(user), Value::Object(patch)) = (&mut user, patch) {
        user.extend(patch);
    }
    Json(user).into_response()
}

async fn serve(fake: Fake) -> String {
    let router = Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/profile", get(profile).patch(update))
        .with_state(fake);
    spawn_server(router).await
}

fn memory_tokens() -> Arc<TokenStore> {
    Arc::new(TokenStore::new(Arc::new(MemoryStore::new()), CookieMirror::new(false)))
}

fn controller(base_url: &str, tokens: Arc<TokenStore>, available: bool, demo_login: bool) -> SessionController {
    let api = AuthApi::new(base_url, HttpTimeouts::default(), tokens.clone()).unwrap();
    SessionController::new(
        tokens.clone(),
        Arc::new(StaticProbe(available)),
        Arc::new(RemoteBackend::new(api)),
        Arc::new(MockBackend::new(tokens, demo_login)),
    )
}

async fn online() -> (SessionController, Fake) {
    let fake = Fake::default();
    let url = serve(fake.clone()).await;
    (controller(&url, memory_tokens(), true, false), fake)
}

// =============================================================================
// LOGIN
// =============================================================================

#[tokio::test]
async fn valid_login_persists_backend_token() {
    let (ctl, _) = online().await;
    let outcome = ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();

    assert_eq!(outcome.destination, CUSTOMER_DASHBOARD);
    assert_eq!(outcome.user.email, "c@x.com");
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("tok-c"));
    assert_eq!(ctl.tokens().cookie_header().as_deref(), Some("auth_token=tok-c"));
    assert_eq!(ctl.tokens().load_user().unwrap().id, "11");

    let session = ctl.snapshot();
    assert!(session.is_authenticated());
    assert!(!session.is_loading);
    assert_eq!(session.phase, SessionPhase::Authenticated);
    assert_eq!(ctl.backend_kind(), Some(BackendKind::Remote));
}

#[tokio::test]
async fn invalid_login_leaves_no_token() {
    let (ctl, _) = online().await;
    let err = ctl.login(&Credentials::new("c@x.com", "nope"), None).await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Auth);
    assert_eq!(err.message, "No active account found with the given credentials");
    assert!(ctl.tokens().get_token().is_none());
    assert!(ctl.tokens().load_user().is_none());
    assert!(!ctl.snapshot().is_authenticated());
}

#[tokio::test]
async fn login_without_user_fetches_profile_with_new_token() {
    let (ctl, _) = online().await;
    let outcome = ctl.login(&Credentials::new("notoken@x.com", "pw"), None).await.unwrap();
    assert_eq!(outcome.user.id, "11");
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("tok-c"));
}

#[tokio::test]
async fn provider_login_routes_to_provider_dashboard() {
    let (ctl, _) = online().await;
    let outcome = ctl.login(&Credentials::new("p@x.com", "pw"), None).await.unwrap();
    assert_eq!(outcome.destination, PROVIDER_DASHBOARD);
    assert!(outcome.user.is_provider);
    assert_eq!(outcome.user.user_type, UserType::Provider);
}

#[tokio::test]
async fn customer_requesting_provider_dashboard_is_denied_and_nothing_persists() {
    let (ctl, _) = online().await;
    let err = ctl
        .login(&Credentials::new("c@x.com", "pw"), Some(DashboardKind::Provider))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::AccessDenied);
    assert_eq!(err.message, PROVIDER_ACCESS_DENIED);
    assert!(ctl.tokens().get_token().is_none());
    assert!(!ctl.snapshot().is_authenticated());
}

#[tokio::test]
async fn denied_token_only_login_restores_previous_token() {
    let url = serve(Fake::default()).await;
    let tokens = memory_tokens();
    tokens.set_token(Some("older"));
    let ctl = controller(&url, tokens, true, false);

    let err = ctl
        .login(&Credentials::new("notoken@x.com", "pw"), Some(DashboardKind::Provider))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::AccessDenied);
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("older"));
}

#[tokio::test]
async fn refresh_during_token_only_login_never_sees_the_new_token() {
    let (ctl, _) = online().await;
    let creds = Credentials::new("slowprofile@x.com", "pw");
    let (login, refreshed) = tokio::join!(
        ctl.login(&creds, Some(DashboardKind::Provider)),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctl.fetch_user_profile().await
        }
    );

    assert_eq!(login.unwrap_err().kind, ErrorKind::AccessDenied);
    assert!(refreshed.is_none());
    assert!(ctl.tokens().get_token().is_none());
    let session = ctl.snapshot();
    assert!(!session.is_authenticated());
    assert!(session.token.is_none());
}

#[tokio::test]
async fn login_with_null_user_fields_authenticates() {
    let (ctl, _) = online().await;
    let outcome = ctl.login(&Credentials::new("nulls@x.com", "pw"), None).await.unwrap();
    assert_eq!(outcome.user.id, "3");
    assert_eq!(outcome.user.last_name, "");
    assert!(!outcome.user.verified);
    assert!(ctl.snapshot().is_authenticated());
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("tok-n"));
}

#[tokio::test]
async fn logout_during_login_wins() {
    let (ctl, _) = online().await;
    let creds = Credentials::new("slow@x.com", "pw");
    let (login, ()) = tokio::join!(ctl.login(&creds, None), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.logout();
    });

    assert_eq!(login.unwrap_err().kind, ErrorKind::Auth);
    assert!(ctl.tokens().get_token().is_none());
    assert_eq!(ctl.snapshot(), Session::anonymous());

    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();
    assert!(ctl.snapshot().is_authenticated());
}

#[tokio::test]
async fn provider_may_choose_customer_dashboard() {
    let (ctl, _) = online().await;
    let outcome = ctl
        .login(&Credentials::new("p@x.com", "pw"), Some(DashboardKind::Customer))
        .await
        .unwrap();
    assert_eq!(outcome.destination, CUSTOMER_DASHBOARD);
}

#[tokio::test]
async fn concurrent_mutation_is_rejected_as_busy() {
    let (ctl, _) = online().await;
    let slow = Credentials::new("slow@x.com", "pw");
    let fast = Credentials::new("c@x.com", "pw");

    let (first, second) = tokio::join!(ctl.login(&slow, None), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctl.login(&fast, None).await
    });

    assert!(first.is_ok());
    assert_eq!(second.unwrap_err().kind, ErrorKind::Busy);
}

// =============================================================================
// OFFLINE
// =============================================================================

#[tokio::test]
async fn offline_demo_login_yields_mock_user() {
    let ctl = controller(&dead_url().await, memory_tokens(), false, true);
    for id in [DEMO_USERNAME, "demo@example.com"] {
        let outcome = ctl.login(&Credentials::new(id, DEMO_PASSWORD), None).await.unwrap();
        assert_eq!(outcome.user, demo_user());
        assert_eq!(ctl.tokens().get_token().as_deref(), Some(MOCK_TOKEN));
    }
    assert_eq!(ctl.backend_kind(), Some(BackendKind::Mock));
}

#[tokio::test]
async fn offline_other_credentials_are_unauthorized() {
    let ctl = controller(&dead_url().await, memory_tokens(), false, true);
    let err = ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap_err();
    assert_eq!(err.status, 401);
    assert!(ctl.tokens().get_token().is_none());
}

#[tokio::test]
async fn offline_without_demo_login_rejects_demo_pair() {
    let ctl = controller(&dead_url().await, memory_tokens(), false, false);
    let err = ctl.login(&Credentials::new(DEMO_USERNAME, DEMO_PASSWORD), None).await.unwrap_err();
    assert_eq!(err.status, 401);
    assert!(ctl.tokens().get_token().is_none());
}

// =============================================================================
// REGISTER
// =============================================================================

fn scenario_input() -> RegisterInput {
    serde_json::from_value(json!({
        "email": "a@b.com",
        "firstName": "A",
        "lastName": "B",
        "password": "secret123",
        "userType": "customer",
        "phone": "9800000000",
        "city": "kathmandu",
        "area": "thamel",
    }))
    .unwrap()
}

#[tokio::test]
async fn register_submits_backend_shape_and_authenticates_customer() {
    let (ctl, fake) = online().await;
    let outcome = ctl.register(scenario_input()).await.unwrap();

    let submitted = fake.registered.lock().unwrap()[0].clone();
    assert_eq!(
        submitted,
        json!({
            "email": "a@b.com",
            "first_name": "A",
            "last_name": "B",
            "contact": "9800000000",
            "address": { "city": "kathmandu", "area": "thamel" },
            "is_provider": false,
            "password": "secret123",
        })
    );

    let RegisterOutcome::Authenticated(outcome) = outcome else {
        panic!("expected an authenticated session");
    };
    assert_eq!(outcome.user.user_type, UserType::Customer);
    assert_eq!(ctl.snapshot().user.unwrap().user_type, UserType::Customer);
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("tok-r"));
}

#[tokio::test]
async fn register_without_token_asks_for_login() {
    let (ctl, _) = online().await;
    let input = RegisterInput { email: "pending@x.com".into(), ..scenario_input() };
    let outcome = ctl.register(input).await.unwrap();

    assert_eq!(
        outcome,
        RegisterOutcome::PendingLogin { message: "Check your inbox to verify your account.".into() }
    );
    assert!(ctl.tokens().get_token().is_none());
    assert!(!ctl.snapshot().is_authenticated());
}

#[tokio::test]
async fn register_field_errors_surface_as_validation() {
    let (ctl, _) = online().await;
    let input = RegisterInput { email: "taken@x.com".into(), ..scenario_input() };
    let err = ctl.register(input).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.fields["email"], "user with this email already exists.");
}

#[tokio::test]
async fn register_rejects_missing_fields_before_network() {
    let (ctl, fake) = online().await;
    let input = RegisterInput { email: String::new(), ..scenario_input() };
    assert_eq!(ctl.register(input).await.unwrap_err().kind, ErrorKind::Validation);
    assert!(fake.registered.lock().unwrap().is_empty());
}

// =============================================================================
// BOOTSTRAP / LOGOUT
// =============================================================================

#[tokio::test]
async fn bootstrap_without_token_is_anonymous() {
    let (ctl, _) = online().await;
    assert!(ctl.snapshot().is_loading);
    ctl.bootstrap().await;
    let session = ctl.snapshot();
    assert!(!session.is_loading);
    assert_eq!(session.phase, SessionPhase::Anonymous);
}

#[tokio::test]
async fn bootstrap_restores_valid_token() {
    let url = serve(Fake::default()).await;
    let tokens = memory_tokens();
    tokens.set_token(Some("tok-p"));
    let ctl = controller(&url, tokens, true, false);

    ctl.bootstrap().await;
    let session = ctl.snapshot();
    assert_eq!(session.token.as_deref(), Some("tok-p"));
    assert_eq!(session.user.unwrap().id, "22");
    assert_eq!(ctl.tokens().load_user().unwrap().id, "22");
}

#[tokio::test]
async fn bootstrap_clears_rejected_token() {
    let url = serve(Fake::default()).await;
    let tokens = memory_tokens();
    tokens.persist_session("expired", &customer());
    let ctl = controller(&url, tokens, true, false);

    ctl.bootstrap().await;
    assert_eq!(ctl.snapshot(), Session::anonymous());
    assert!(ctl.tokens().get_token().is_none());
    assert!(ctl.tokens().load_user().is_none());
}

#[tokio::test]
async fn bootstrap_keeps_token_on_transient_failure() {
    let url = serve(Fake::default()).await;
    let tokens = memory_tokens();
    tokens.persist_session("flaky", &provider());
    let ctl = controller(&url, tokens, true, false);

    ctl.bootstrap().await;
    assert_eq!(ctl.snapshot(), Session::authenticated("flaky".into(), provider()));
    assert_eq!(ctl.tokens().get_token().as_deref(), Some("flaky"));
}

#[tokio::test]
async fn bootstrap_offline_uses_persisted_user() {
    let tokens = memory_tokens();
    tokens.persist_session("tok-c", &customer());
    let ctl = controller(&dead_url().await, tokens, false, false);

    ctl.bootstrap().await;
    assert_eq!(ctl.snapshot().user, Some(customer()));
    assert_eq!(ctl.backend_kind(), Some(BackendKind::Mock));
}

#[tokio::test]
async fn logout_twice_is_harmless() {
    let (ctl, _) = online().await;
    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();

    ctl.logout();
    let once = (ctl.snapshot(), ctl.tokens().get_token(), ctl.tokens().cookie_header());
    ctl.logout();
    let twice = (ctl.snapshot(), ctl.tokens().get_token(), ctl.tokens().cookie_header());

    assert_eq!(once, twice);
    assert_eq!(once.0, Session::anonymous());
    assert!(once.1.is_none());
    assert!(once.2.is_none());
}

#[tokio::test]
async fn subscribers_see_state_changes() {
    let (ctl, _) = online().await;
    let mut rx = ctl.subscribe();
    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_authenticated());

    ctl.logout();
    assert!(!rx.borrow_and_update().is_authenticated());
}

// =============================================================================
// PROFILE
// =============================================================================

fn bio(value: &str) -> ProfileUpdate {
    let mut patch = ProfileUpdate::new();
    patch.insert("bio".into(), json!(value));
    patch
}

#[tokio::test]
async fn fetch_profile_refreshes_user() {
    let (ctl, _) = online().await;
    assert!(ctl.fetch_user_profile().await.is_none());

    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();
    let user = ctl.fetch_user_profile().await.unwrap();
    assert_eq!(user.email, "c@x.com");
}

#[tokio::test]
async fn fetch_profile_with_rejected_token_signs_out() {
    let url = serve(Fake::default()).await;
    let tokens = memory_tokens();
    tokens.persist_session("expired", &customer());
    let ctl = controller(&url, tokens, true, false);

    assert!(ctl.fetch_user_profile().await.is_none());
    assert!(ctl.tokens().get_token().is_none());
}

#[tokio::test]
async fn update_profile_requires_session() {
    let (ctl, _) = online().await;
    let err = ctl.update_profile(&bio("x")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
}

#[tokio::test]
async fn update_profile_round_trips_through_backend() {
    let fake = Fake { updates_supported: true, ..Fake::default() };
    let url = serve(fake).await;
    let ctl = controller(&url, memory_tokens(), true, false);
    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();

    let updated = ctl.update_profile(&bio("x")).await.unwrap();
    assert_eq!(updated.bio.as_deref(), Some("x"));
    assert_eq!(ctl.snapshot().user.unwrap().bio.as_deref(), Some("x"));
    assert_eq!(ctl.tokens().load_user().unwrap().bio.as_deref(), Some("x"));
}

#[tokio::test]
async fn update_profile_merges_locally_when_unsupported() {
    let (ctl, _) = online().await;
    ctl.login(&Credentials::new("c@x.com", "pw"), None).await.unwrap();

    let updated = ctl.update_profile(&bio("x")).await.unwrap();
    assert_eq!(updated.bio.as_deref(), Some("x"));
    assert_eq!(updated.email, "c@x.com");
    assert_eq!(ctl.snapshot().user.unwrap().bio.as_deref(), Some("x"));
    assert_eq!(ctl.tokens().load_user().unwrap().bio.as_deref(), Some("x"));
}

#[tokio::test]
async fn update_profile_offline_merges_and_reads_back() {
    let ctl = controller(&dead_url().await, memory_tokens(), false, true);
    ctl.login(&Credentials::new(DEMO_USERNAME, DEMO_PASSWORD), None).await.unwrap();

    ctl.update_profile(&bio("x")).await.unwrap();
    let read_back = ctl.fetch_user_profile().await.unwrap();
    assert_eq!(read_back.bio.as_deref(), Some("x"));
    assert_eq!(read_back.id, demo_user().id);
}
