use std::net::SocketAddr;

use axum::{middleware, routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::error::expose_error_detail;
use crate::state::AppState;
use crate::{auth, users};

pub fn build_app(state: AppState) -> Router {
    let expose_detail = state.config.expose_error_detail();

    let mut app = Router::new()
        .merge(auth::router())
        .merge(users::router())
        .route("/health", get(|| async { "ok" }))
        .with_state(state);

    if expose_detail {
        app = app.layer(middleware::map_response(expose_error_detail));
    }

    app.layer(CorsLayer::permissive()).layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<_>| {
                let method = req.method().clone();
                let uri = req.uri().clone();
                tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
            })
            .on_response(
                |res: &axum::http::Response<_>,
                 _latency: std::time::Duration,
                 span: &tracing::Span| {
                    let status = res.status();
                    span.record("status", tracing::field::display(status));
                    if status.is_server_error() {
                        tracing::error!(%status, "response");
                    } else {
                        tracing::info!(%status, "response");
                    }
                },
            ),
    )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::mail::tests::RecordingMailer;
    use crate::state::fake;
    use crate::users::repo_types::{NewUser, Role};
    use std::sync::Arc;

    struct TestApp {
        state: AppState,
        mailer: Arc<RecordingMailer>,
    }

    impl TestApp {
        fn new() -> Self {
            let (state, mailer) = fake::state();
            Self { state, mailer }
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(t) = token {
                req = req.header(header::AUTHORIZATION, format!("Bearer {}", t));
            }
            let req = match body {
                Some(b) => req
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(b.to_string())),
                None => req.body(Body::empty()),
            }
            .unwrap();

            let res = build_app(self.state.clone()).oneshot(req).await.unwrap();
            let status = res.status();
            let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, json)
        }

        async fn register(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": email,
                    "password": password,
                    "firstName": "Alice",
                    "lastName": "Liddell"
                })),
            )
            .await
        }

        async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
            self.call(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await
        }

        async fn seed_admin(&self) -> String {
            let admin = self
                .state
                .users
                .insert(NewUser {
                    email: "admin@example.com".into(),
                    password_hash: self.state.hasher.hash("Adm1nPass!").await.unwrap(),
                    first_name: "Ada".into(),
                    last_name: "Admin".into(),
                    role: Role::Admin,
                    verification_token: None,
                })
                .await
                .unwrap();
            self.state.jwt.sign(&admin).unwrap()
        }

        async fn last_link_token(&self, marker: &str) -> String {
            let outbox = self.mailer.outbox().await;
            let body = &outbox.last().expect("a mail was sent").body;
            let start = body.find(marker).expect("link") + marker.len();
            body[start..]
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect()
        }
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = TestApp::new();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = build_app(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn register_verify_then_me_shows_verified() {
        let app = TestApp::new();
        let (status, body) = app.register("alice@example.com", "Passw0rd!").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["user"]["isVerified"], false);
        assert!(body["data"]["user"].get("passwordHash").is_none());
        assert!(body["data"]["token"].as_str().is_some());

        let token = app.last_link_token("/verify-email/").await;
        let (status, body) = app
            .call(Method::GET, &format!("/auth/verify/{}", token), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");

        let (status, body) = app.login("alice@example.com", "Passw0rd!").await;
        assert_eq!(status, StatusCode::OK);
        let session = body["data"]["token"].as_str().unwrap().to_string();

        let (status, body) = app.call(Method::GET, "/auth/me", Some(&session), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["email"], "alice@example.com");
        assert_eq!(body["data"]["user"]["isVerified"], true);

        let (status, body) = app
            .call(Method::GET, &format!("/auth/verify/{}", token), None, None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let app = TestApp::new();
        app.register("alice@example.com", "Passw0rd!").await;
        let (status, body) = app.register("Alice@Example.com", "Passw0rd!").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn malformed_bodies_get_the_error_envelope() {
        let app = TestApp::new();
        let (status, body) = app
            .call(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "email": "alice@example.com",
                    "password": "Passw0rd!",
                    "lastName": "Liddell"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("firstName"));
        assert!(app.state.users.list().await.unwrap().is_empty());

        let req = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"email\":"))
            .unwrap();
        let res = build_app(app.state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn bad_user_id_in_path_gets_the_error_envelope() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let (status, body) = app
            .call(Method::GET, "/users/not-a-uuid", Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn registration_mail_outage_is_server_error_with_generic_message() {
        let app = TestApp::new();
        app.mailer.set_failing(true);
        let (status, body) = app.register("alice@example.com", "Passw0rd!").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], crate::error::GENERIC_SERVER_MESSAGE);
    }

    #[tokio::test]
    async fn error_detail_is_exposed_in_development() {
        let (mut state, mailer) = fake::state();
        let mut config = fake::config();
        config.environment = crate::config::Environment::Development;
        state.config = Arc::new(config);
        let app = TestApp { state, mailer };
        app.mailer.set_failing(true);
        let (status, body) = app.register("alice@example.com", "Passw0rd!").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("mail transport unavailable"));
    }

    #[tokio::test]
    async fn login_failures_share_status_and_message() {
        let app = TestApp::new();
        app.register("alice@example.com", "Passw0rd!").await;
        let (s1, b1) = app.login("alice@example.com", "wrong-password").await;
        let (s2, b2) = app.login("nobody@example.com", "Passw0rd!").await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s2, StatusCode::UNAUTHORIZED);
        assert_eq!(b1, b2);
    }

    #[tokio::test]
    async fn forgot_password_for_unknown_email_is_uniform() {
        let app = TestApp::new();
        app.register("alice@example.com", "Passw0rd!").await;
        let mails_before = app.mailer.outbox().await.len();

        let (s_unknown, b_unknown) = app
            .call(
                Method::POST,
                "/auth/forgot-password",
                None,
                Some(json!({ "email": "nobody@example.com" })),
            )
            .await;
        assert_eq!(s_unknown, StatusCode::OK);
        assert_eq!(app.mailer.outbox().await.len(), mails_before);
        assert!(app
            .state
            .users
            .list()
            .await
            .unwrap()
            .iter()
            .all(|u| u.reset_password_token.is_none()));

        let (s_known, b_known) = app
            .call(
                Method::POST,
                "/auth/forgot-password",
                None,
                Some(json!({ "email": "alice@example.com" })),
            )
            .await;
        assert_eq!(s_known, StatusCode::OK);
        assert_eq!(b_unknown, b_known);
    }

    #[tokio::test]
    async fn reset_password_flow() {
        let app = TestApp::new();
        app.register("alice@example.com", "Passw0rd!").await;
        app.call(
            Method::POST,
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "alice@example.com" })),
        )
        .await;
        let token = app.last_link_token("/reset-password/").await;

        let reset = json!({ "token": token, "password": "N3wPassword!" });
        let (status, _) = app
            .call(Method::POST, "/auth/reset-password", None, Some(reset.clone()))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .call(Method::POST, "/auth/reset-password", None, Some(reset))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app.login("alice@example.com", "N3wPassword!").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn me_requires_valid_bearer() {
        let app = TestApp::new();
        let (status, body) = app.call(Method::GET, "/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], "error");

        let (status, _) = app.call(Method::GET, "/auth/me", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn deleted_user_token_is_rejected() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let (_, body) = app.register("alice@example.com", "Passw0rd!").await;
        let alice = body["data"]["token"].as_str().unwrap().to_string();
        let alice_id = body["data"]["user"]["id"].as_str().unwrap().to_string();

        let (status, _) = app
            .call(Method::DELETE, &format!("/users/{}", alice_id), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call(Method::GET, "/auth/me", Some(&alice), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn user_routes_enforce_policies() {
        let app = TestApp::new();
        let admin = app.seed_admin().await;
        let (_, a) = app.register("alice@example.com", "Passw0rd!").await;
        let (_, b) = app.register("bob@example.com", "Passw0rd!").await;
        let alice = a["data"]["token"].as_str().unwrap().to_string();
        let alice_id = a["data"]["user"]["id"].as_str().unwrap().to_string();
        let bob = b["data"]["token"].as_str().unwrap().to_string();
        let alice_url = format!("/users/{}", alice_id);

        let (status, _) = app.call(Method::GET, "/users", Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = app.call(Method::GET, "/users", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], 3);

        let (status, _) = app.call(Method::GET, &alice_url, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &alice_url, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &alice_url, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                Method::PUT,
                &alice_url,
                Some(&alice),
                Some(json!({ "firstName": "Alicia" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["firstName"], "Alicia");

        let (status, _) = app
            .call(
                Method::PUT,
                &format!("{}/change-password", alice_url),
                Some(&bob),
                Some(json!({ "currentPassword": "Passw0rd!", "newPassword": "Hijacked1!" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                Method::PUT,
                &format!("{}/change-password", alice_url),
                Some(&alice),
                Some(json!({ "currentPassword": "Passw0rd!", "newPassword": "N3wPassword!" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.call(Method::DELETE, &alice_url, Some(&alice), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.call(Method::DELETE, &alice_url, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &alice_url, Some(&admin), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
