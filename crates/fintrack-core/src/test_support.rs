//! Helpers shared by unit tests: fake tokens and a throwaway HTTP backend.

use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;

/// Build a JWT-shaped string carrying the given payload
pub fn token_with_payload(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}

/// Access token expiring `offset_secs` from now (negative = already expired)
pub fn token_expiring_in(offset_secs: i64) -> String {
    token_with_payload(&serde_json::json!({
        "token_type": "access",
        "exp": Utc::now().timestamp() + offset_secs,
        "user_id": 7,
    }))
}

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_backend(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test backend");
    });
    format!("http://{}", addr)
}
