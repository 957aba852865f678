use async_graphql::http::GraphiQLSource;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use utoipa_swagger_ui::SwaggerUi;

use storefront::{NewProduct, NewUser, Product, Storefront, StorefrontError, User};

use crate::auth::{require_bearer, Subject};
use crate::graphql::{build_schema, StorefrontSchema};
use crate::openapi::openapi_spec;

/// Gateway state shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Services, token issuer and store handle
    pub shop: Storefront,
    /// Schema served on both GraphQL endpoints
    pub schema: StorefrontSchema,
}

impl AppState {
    pub fn new(shop: Storefront) -> Self {
        let schema = build_schema(shop.clone());
        Self { shop, schema }
    }
}

/// Build the full HTTP surface
///
/// - `GET /`, `GET /health`
/// - `POST /register`, `POST /login`, `POST /products`
/// - `GET|POST /graphql` (GraphiQL page / execution)
/// - `POST /graphql/protected` (bearer token required)
/// - `GET /docs` (Swagger UI over `/api-docs/openapi.json`)
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/graphql/protected", post(graphql_protected))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/products", post(create_product))
        .route("/graphql", get(graphiql).post(graphql_public))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi_spec()))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: &'static str,
}

/// Body of every REST error response
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[schema(example = "VALIDATION_ERROR")]
    pub code: String,
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Storefront API is running",
        "graphql": "/graphql",
        "docs": "/docs"
    }))
}

/// Reports whether the table store answers
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.shop.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "store": "reachable",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => {
            warn!("Health check: store unreachable: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "store": "unreachable",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
    }
}

#[utoipa::path(
    post,
    path = "/register",
    tag = "auth",
    request_body = NewUser,
    responses(
        (status = 200, description = "Account created", body = UserResponse),
        (status = 400, description = "Invalid input or username taken", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub(crate) async fn register(
    State(state): State<AppState>,
    payload: Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<UserResponse>, ApiError> {
    let Json(request) = payload?;
    debug!("Register request for {}", request.username);

    let user = state.shop.users.register(request).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Credentials accepted", body = TokenResponse),
        (status = 400, description = "Unknown username or wrong password", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub(crate) async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(request) = payload?;

    let user = state.shop.users.authenticate(&request.username, &request.password).await?;
    let access_token = state.shop.tokens.issue(&user.username)?;

    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer",
    }))
}

#[utoipa::path(
    post,
    path = "/products",
    tag = "products",
    request_body = NewProduct,
    responses(
        (status = 200, description = "Product created", body = Product),
        (status = 400, description = "Negative price or stock, or malformed body", body = ErrorBody),
        (status = 500, description = "Store failure", body = ErrorBody)
    )
)]
pub(crate) async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Json(request) = payload?;
    let product = state.shop.products.create(request).await?;
    Ok(Json(product))
}

async fn graphiql() -> Html<String> {
    Html(GraphiQLSource::build().endpoint("/graphql").finish())
}

async fn graphql_public(
    State(state): State<AppState>,
    payload: Result<Json<async_graphql::Request>, JsonRejection>,
) -> Result<Json<async_graphql::Response>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.schema.execute(request).await))
}

async fn graphql_protected(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    payload: Result<Json<async_graphql::Request>, JsonRejection>,
) -> Result<Json<async_graphql::Response>, ApiError> {
    let Json(request) = payload?;
    debug!("Protected GraphQL request from {}", subject.username);
    Ok(Json(state.schema.execute(request.data(subject)).await))
}

/// Gateway-specific errors
#[derive(Debug)]
pub enum ApiError {
    /// A service call failed
    Service(StorefrontError),
    /// Request body could not be decoded
    BadRequest(String),
    /// Missing or invalid bearer token
    Unauthorized,
}

impl From<StorefrontError> for ApiError {
    fn from(err: StorefrontError) -> Self {
        Self::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

fn status_for(err: &StorefrontError) -> StatusCode {
    match err {
        StorefrontError::Validation(_)
        | StorefrontError::InvalidStatus(_)
        | StorefrontError::DuplicateUsername(_)
        | StorefrontError::Authentication => StatusCode::BAD_REQUEST,
        StorefrontError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        StorefrontError::NotFound { .. } | StorefrontError::ProductNotFound(_) => StatusCode::NOT_FOUND,
        StorefrontError::InsufficientStock { .. } | StorefrontError::Conflict(_) => StatusCode::CONFLICT,
        StorefrontError::Upstream(_) | StorefrontError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_body(error: impl Into<String>, code: &str) -> Json<ErrorBody> {
    Json(ErrorBody {
        error: error.into(),
        code: code.to_string(),
    })
}

fn unauthorized(message: &str, code: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        error_body(message, code),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Service(StorefrontError::InvalidToken(reason)) => {
                debug!("Invalid token: {}", reason);
                unauthorized("Invalid authentication credentials", "INVALID_TOKEN")
            }
            ApiError::Service(err) if err.is_server_error() => {
                error!("Request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    error_body("Internal server error", err.code()),
                )
                    .into_response()
            }
            ApiError::Service(err) => {
                let status = status_for(&err);
                if status == StatusCode::CONFLICT {
                    info!("Request refused: {}", err);
                }
                (status, error_body(err.to_string(), err.code())).into_response()
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, error_body(message, "BAD_REQUEST")).into_response(),
            ApiError::Unauthorized => unauthorized("Invalid authentication credentials", "UNAUTHORIZED"),
        }
    }
}
