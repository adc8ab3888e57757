//! Shared fixtures for unit tests: throwaway paths and fake backends served
//! by axum on an ephemeral loopback port.

use std::path::PathBuf;

use axum::Router;
use rand::Rng;

use crate::user::{User, UserType};

/// A unique path under the system temp dir. Nothing is created.
#[must_use]
pub fn temp_path(name: &str) -> PathBuf {
    let suffix: u64 = rand::rng().random();
    std::env::temp_dir().join(format!("marketplace-test-{suffix:016x}-{name}"))
}

/// Serve `router` on `127.0.0.1:0` and return its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("test server failed");
    });
    format!("http://{addr}")
}

/// A loopback URL nothing listens on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    drop(listener);
    format!("http://{addr}")
}

#[must_use]
pub fn customer() -> User {
    User {
        id: "11".into(),
        email: "c@x.com".into(),
        first_name: "Cus".into(),
        last_name: "Tomer".into(),
        username: "customer".into(),
        ..User::default()
    }
}

#[must_use]
pub fn provider() -> User {
    User {
        id: "22".into(),
        email: "p@x.com".into(),
        first_name: "Pro".into(),
        last_name: "Vider".into(),
        username: "provider".into(),
        user_type: UserType::Provider,
        is_provider: true,
        service_category: Some("plumbing".into()),
        ..User::default()
    }
}
