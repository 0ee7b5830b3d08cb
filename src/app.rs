use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::trace::TraceLayer;

use crate::{auth, config::Variant, secrets, state::AppState, views};

async fn home() -> Html<String> {
    Html(views::home_page())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(views::not_found_page()))
}

pub fn build_app(state: AppState) -> Router {
    let variant = state.config.variant;

    let mut routes = Router::new()
        .route("/", get(home))
        .merge(auth::router(variant));
    if variant == Variant::Extended {
        routes = routes.merge(secrets::router());
    }

    routes
        .fallback(not_found)
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(
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

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "3000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, Response},
    };
    use tower::ServiceExt;

    use crate::auth::session::{OAUTH_STATE_COOKIE, SESSION_COOKIE};

    fn extended() -> (AppState, Router) {
        let state = AppState::fake(Variant::Extended);
        (state.clone(), build_app(state))
    }

    async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
        app.clone().oneshot(req).await.expect("infallible router")
    }

    fn get_req(uri: &str, cookies: &[String]) -> Request<Body> {
        let mut builder = Request::get(uri);
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn form_req(uri: &str, body: &str, cookies: &[String]) -> Request<Body> {
        let mut builder = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if !cookies.is_empty() {
            builder = builder.header(header::COOKIE, cookies.join("; "));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn location(res: &Response<Body>) -> Option<&str> {
        res.headers().get(header::LOCATION).and_then(|v| v.to_str().ok())
    }

    /// `name=value` of a non-empty cookie set by the response.
    fn set_cookie(res: &Response<Body>, name: &str) -> Option<String> {
        res.headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .find(|pair| {
                pair.split_once('=')
                    .is_some_and(|(k, v)| k == name && !v.is_empty())
            })
            .map(str::to_string)
    }

    async fn body_text(res: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    async fn register(app: &Router, email: &str, password: &str) -> Response<Body> {
        let body = format!("username={email}&password={password}");
        send(app, form_req("/register", &body, &[])).await
    }

    async fn login(app: &Router, email: &str, password: &str) -> Response<Body> {
        let body = format!("username={email}&password={password}");
        send(app, form_req("/login", &body, &[])).await
    }

    #[tokio::test]
    async fn home_is_public() {
        let (_, app) = extended();
        let res = send(&app, get_req("/", &[])).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("/register"));
    }

    #[tokio::test]
    async fn register_then_login_reaches_secrets() {
        let (_, app) = extended();

        let res = register(&app, "alice%40example.com", "pw123").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/secrets"));
        assert!(set_cookie(&res, SESSION_COOKIE).is_some());

        let res = login(&app, "alice%40example.com", "pw123").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/secrets"));
        let session = set_cookie(&res, SESSION_COOKIE).expect("session cookie");

        let res = send(&app, get_req("/secrets", &[session])).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("No secrets have been shared yet."));
    }

    #[tokio::test]
    async fn login_normalizes_email_case() {
        let (_, app) = extended();
        register(&app, "Alice%40Example.com", "pw123").await;
        let res = login(&app, "alice%40example.COM", "pw123").await;
        assert_eq!(location(&res), Some("/secrets"));
    }

    #[tokio::test]
    async fn wrong_password_gets_no_session() {
        let (_, app) = extended();
        register(&app, "alice%40example.com", "pw123").await;

        let res = login(&app, "alice%40example.com", "wrongpw").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/login"));
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());

        let res = login(&app, "nobody%40example.com", "pw123").await;
        assert_eq!(location(&res), Some("/login"));
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let (state, app) = extended();
        register(&app, "alice%40example.com", "pw123").await;

        let res = register(&app, "ALICE%40example.com", "other").await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());
        assert!(body_text(res).await.contains("already registered"));

        // the original password still works
        let user = state.store.find_by_email("alice@example.com").await.unwrap();
        assert!(user.is_some());
        let res = login(&app, "alice%40example.com", "pw123").await;
        assert_eq!(location(&res), Some("/secrets"));
    }

    #[tokio::test]
    async fn malformed_registration_is_refused() {
        let (_, app) = extended();
        let res = register(&app, "not-an-email", "pw123").await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = register(&app, "bob%40example.com", "").await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn protected_pages_redirect_anonymous_users() {
        let (_, app) = extended();

        for uri in ["/secrets", "/submit"] {
            let res = send(&app, get_req(uri, &[])).await;
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(location(&res), Some("/login"), "{uri}");
        }

        let res = send(&app, form_req("/submit", "secret=sneaky", &[])).await;
        assert_eq!(location(&res), Some("/login"));

        let forged = format!("{SESSION_COOKIE}=not-a-token");
        let res = send(&app, get_req("/secrets", &[forged])).await;
        assert_eq!(location(&res), Some("/login"));
    }

    #[tokio::test]
    async fn second_secret_replaces_the_first() {
        let (state, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        let res = send(&app, get_req("/submit", &[session.clone()])).await;
        assert_eq!(res.status(), StatusCode::OK);

        for secret in ["hello", "world"] {
            let body = format!("secret={secret}");
            let res = send(&app, form_req("/submit", &body, &[session.clone()])).await;
            assert_eq!(location(&res), Some("/secrets"));
        }

        let user = state
            .store
            .find_by_email("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.secret.as_deref(), Some("world"));

        let page = body_text(send(&app, get_req("/secrets", &[session])).await).await;
        assert!(page.contains("world"));
        assert!(!page.contains(">hello<"));
    }

    #[tokio::test]
    async fn secret_is_stored_as_submitted() {
        let (state, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        let res = send(&app, form_req("/submit", "secret=+hello+", &[session])).await;
        assert_eq!(location(&res), Some("/secrets"));
        let user = state.store.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(user.secret.as_deref(), Some(" hello "));
    }

    #[tokio::test]
    async fn blank_secret_is_not_saved() {
        let (state, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        let res = send(&app, form_req("/submit", "secret=+++", &[session])).await;
        assert_eq!(location(&res), Some("/submit"));
        let user = state.store.find_by_email("alice@example.com").await.unwrap().unwrap();
        assert!(user.secret.is_none());
    }

    #[tokio::test]
    async fn signed_in_users_skip_login_and_register_forms() {
        let (_, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        for uri in ["/login", "/register"] {
            let res = send(&app, get_req(uri, &[session.clone()])).await;
            assert_eq!(location(&res), Some("/secrets"), "{uri}");
        }

        let res = send(&app, get_req("/login", &[])).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_clears_the_session_cookie() {
        let (_, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        let res = send(&app, get_req("/logout", &[session])).await;
        assert_eq!(location(&res), Some("/"));
        let cleared = res
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with(&format!("{SESSION_COOKIE}=;")) || v.starts_with(&format!("{SESSION_COOKIE}=\"\"")));
        assert!(cleared, "logout should expire the session cookie");
    }

    #[tokio::test]
    async fn logged_out_cookie_no_longer_signs_in() {
        let (_, app) = extended();
        let res = register(&app, "alice%40example.com", "pw123").await;
        let session = set_cookie(&res, SESSION_COOKIE).unwrap();

        let res = send(&app, get_req("/secrets", &[session.clone()])).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(&app, get_req("/logout", &[session.clone()])).await;
        assert_eq!(location(&res), Some("/"));

        // replaying the cookie captured before logout
        let res = send(&app, get_req("/secrets", &[session.clone()])).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/login"));
        let res = send(&app, form_req("/submit", "secret=late", &[session])).await;
        assert_eq!(location(&res), Some("/login"));

        // a fresh login works again
        let res = login(&app, "alice%40example.com", "pw123").await;
        let fresh = set_cookie(&res, SESSION_COOKIE).expect("new session");
        let res = send(&app, get_req("/secrets", &[fresh])).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn logout_without_session_just_redirects() {
        let (_, app) = extended();
        let res = send(&app, get_req("/logout", &[])).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/"));
    }

    #[tokio::test]
    async fn store_failures_render_the_error_page() {
        for variant in [Variant::Basic, Variant::Extended] {
            let app = build_app(AppState::fake_with_broken_store(variant));

            let res = register(&app, "alice%40example.com", "pw123").await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "{variant} register");
            assert!(set_cookie(&res, SESSION_COOKIE).is_none());
            assert!(body_text(res).await.contains("Something went wrong"));

            let res = login(&app, "alice%40example.com", "pw123").await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR, "{variant} login");
            assert!(set_cookie(&res, SESSION_COOKIE).is_none());
            assert!(body_text(res).await.contains("Something went wrong"));
        }
    }

    async fn start_google(app: &Router) -> String {
        let res = send(app, get_req("/auth/google", &[])).await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert!(location(&res).unwrap().starts_with("https://accounts.example/authorize"));
        set_cookie(&res, OAUTH_STATE_COOKIE).expect("oauth state cookie")
    }

    #[tokio::test]
    async fn google_callback_creates_the_user_once() {
        let (state, app) = extended();

        let pending = start_google(&app).await;
        let res = send(
            &app,
            get_req("/auth/google/secrets?code=ok:g-42&state=fake-state", &[pending]),
        )
        .await;
        assert_eq!(location(&res), Some("/secrets"));
        let session = set_cookie(&res, SESSION_COOKIE).expect("session");
        let first = state.store.find_or_create_by_google_id("g-42").await.unwrap();

        let pending = start_google(&app).await;
        let res = send(
            &app,
            get_req("/auth/google/secrets?code=ok:g-42&state=fake-state", &[pending]),
        )
        .await;
        assert_eq!(location(&res), Some("/secrets"));
        let second = state.store.find_or_create_by_google_id("g-42").await.unwrap();
        assert_eq!(first.id, second.id);

        let with_secret = state.store.find_all_with_secret().await.unwrap();
        assert!(with_secret.is_empty());

        let res = send(&app, form_req("/submit", "secret=from+google", &[session])).await;
        assert_eq!(location(&res), Some("/secrets"));
        let user = state.store.find_by_id(first.id).await.unwrap().unwrap();
        assert_eq!(user.secret.as_deref(), Some("from google"));
        assert!(user.password_hash.is_none());
    }

    #[tokio::test]
    async fn google_callback_failures_go_to_login() {
        let (_, app) = extended();

        // state mismatch
        let pending = start_google(&app).await;
        let res = send(
            &app,
            get_req("/auth/google/secrets?code=ok:g-1&state=forged", &[pending]),
        )
        .await;
        assert_eq!(location(&res), Some("/login"));
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());

        // provider refused the code
        let pending = start_google(&app).await;
        let res = send(
            &app,
            get_req("/auth/google/secrets?code=bad&state=fake-state", &[pending]),
        )
        .await;
        assert_eq!(location(&res), Some("/login"));

        // user denied consent
        let pending = start_google(&app).await;
        let res = send(
            &app,
            get_req("/auth/google/secrets?error=access_denied&state=fake-state", &[pending]),
        )
        .await;
        assert_eq!(location(&res), Some("/login"));

        // no pending state at all
        let res = send(
            &app,
            get_req("/auth/google/secrets?code=ok:g-1&state=fake-state", &[]),
        )
        .await;
        assert_eq!(location(&res), Some("/login"));
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());
    }

    #[tokio::test]
    async fn google_start_without_provider_goes_to_login() {
        let state = AppState {
            google: None,
            ..AppState::fake(Variant::Extended)
        };
        let app = build_app(state);
        let res = send(&app, get_req("/auth/google", &[])).await;
        assert_eq!(location(&res), Some("/login"));
    }

    #[tokio::test]
    async fn basic_variant_renders_confirmation_without_sessions() {
        let app = build_app(AppState::fake(Variant::Basic));

        let res = register(&app, "alice%40example.com", "pw123").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(set_cookie(&res, SESSION_COOKIE).is_none());
        assert!(body_text(res).await.contains("You've Discovered My Secret!"));

        let res = login(&app, "alice%40example.com", "pw123").await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("You've Discovered My Secret!"));

        let res = login(&app, "alice%40example.com", "wrongpw").await;
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&res), Some("/login"));
    }

    #[tokio::test]
    async fn basic_variant_has_no_session_routes() {
        let app = build_app(AppState::fake(Variant::Basic));
        for uri in ["/secrets", "/submit", "/logout", "/auth/google"] {
            let res = send(&app, get_req(uri, &[])).await;
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
        }
        let res = send(&app, get_req("/login", &[])).await;
        assert_eq!(res.status(), StatusCode::OK);
    }
}
