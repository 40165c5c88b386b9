use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeaderRejection,
    TypedHeader,
};
use deployer_types::Credential;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::serde::deserialize_string_or_number;

/// State for [`require_bearer`]: the expected token and the realm reported on failure
#[derive(Clone, Debug)]
pub struct BearerAuth {
    pub token: Credential,
    pub realm: &'static str,
}

impl BearerAuth {
    pub fn new(token: Credential, realm: &'static str) -> Self {
        Self { token, realm }
    }

    fn reject(&self, error: &str, description: &str) -> Response {
        unauthorized(self.realm, error, description)
    }
}

fn unauthorized(realm: &str, error: &str, description: &str) -> Response {
    let challenge = format!(
        "Bearer realm=\"{realm}\", error=\"{error}\", error_description=\"{description}\""
    );

    let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    if let Ok(value) = HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Middleware for routes that must present `Authorization: Bearer <token>`.
/// Tokens are compared in constant time.
pub async fn require_bearer(
    State(auth): State<BearerAuth>,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    req: Request,
    next: Next,
) -> Response {
    let Ok(TypedHeader(Authorization(bearer))) = header else {
        return auth.reject("invalid_request", "missing or malformed authorization header");
    };

    if bool::from(bearer.token().as_bytes().ct_eq(auth.token.as_bytes())) {
        next.run(req).await
    } else {
        auth.reject("invalid_token", "token mismatch")
    }
}

/// Claims of an HS256 user token. Only `id` is required, `exp` is checked when present.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserClaims {
    /// The authenticated user, numeric ids are kept in their decimal form
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// State for [`require_jwt`]
#[derive(Clone)]
pub struct JwtAuth {
    key: DecodingKey,
    validation: Validation,
    realm: &'static str,
}

impl JwtAuth {
    pub fn new(secret: &Credential, realm: &'static str) -> Self {
        let mut validation = Validation::default();
        validation.required_spec_claims.clear();

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            realm,
        }
    }

    pub fn validate(&self, token: &str) -> Result<UserClaims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<UserClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
    }
}

/// Middleware for routes that need a signed user token.
/// The decoded [`UserClaims`] are added to the request extensions.
pub async fn require_jwt(
    State(auth): State<JwtAuth>,
    header: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut req: Request,
    next: Next,
) -> Response {
    let Ok(TypedHeader(Authorization(bearer))) = header else {
        tracing::warn!("Authentication failed: no bearer token provided");
        return unauthorized(auth.realm, "invalid_request", "no token provided");
    };

    match auth.validate(bearer.token()) {
        Ok(claims) => {
            tracing::info!("User authenticated: {}", claims.id);
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(err) => {
            tracing::warn!("Authentication failed: {err}");
            unauthorized(auth.realm, "invalid_token", "invalid token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, middleware, routing::post, Router};
    use tower::util::ServiceExt;

    fn protected(token: &str) -> Router {
        Router::new()
            .route("/jobs", post(|| async { "queued" }))
            .layer(middleware::from_fn_with_state(
                BearerAuth::new(Credential::new(token), "deployer-test"),
                require_bearer,
            ))
    }

    fn request(auth: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/jobs");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn missing_header_is_rejected_with_challenge() {
        let resp = protected("s3cr3t").oneshot(request(None)).await.unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.contains("realm=\"deployer-test\""));
        assert!(challenge.contains("invalid_request"));
    }

    #[tokio::test]
    async fn wrong_token_is_rejected() {
        let resp = protected("s3cr3t")
            .oneshot(request(Some("Bearer nope")))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let challenge = resp.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.contains("invalid_token"));
    }

    const JWT_SECRET: &str = "jwt-test-secret";

    fn user_token(claims: serde_json::Value, secret: &str) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn user_routes() -> Router {
        Router::new()
            .route(
                "/jobs",
                post(|axum::Extension(claims): axum::Extension<UserClaims>| async move {
                    claims.id
                }),
            )
            .layer(middleware::from_fn_with_state(
                JwtAuth::new(&Credential::new(JWT_SECRET), "deployer-test"),
                require_jwt,
            ))
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn valid_user_token_exposes_claims() {
        let token = user_token(serde_json::json!({"id": "user-7"}), JWT_SECRET);
        let resp = user_routes()
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, "user-7");
    }

    #[tokio::test]
    async fn numeric_user_id_is_accepted() {
        let token = user_token(serde_json::json!({"id": 42}), JWT_SECRET);
        let resp = user_routes()
            .oneshot(request(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();

        assert_eq!(body_text(resp).await, "42");
    }

    #[tokio::test]
    async fn bad_user_tokens_are_rejected() {
        let expired = user_token(serde_json::json!({"id": "user-7", "exp": 1}), JWT_SECRET);
        let foreign = user_token(serde_json::json!({"id": "user-7"}), "another-secret");

        for auth in [
            None,
            Some("Bearer not-a-jwt".to_string()),
            Some(format!("Bearer {expired}")),
            Some(format!("Bearer {foreign}")),
        ] {
            let resp = user_routes()
                .oneshot(request(auth.as_deref()))
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{auth:?}");
            assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
        }
    }

    #[tokio::test]
    async fn matching_token_passes() {
        let resp = protected("s3cr3t")
            .oneshot(request(Some("Bearer s3cr3t")))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
    }
}
