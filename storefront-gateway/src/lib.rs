//! # Storefront Gateway
//!
//! HTTP surface for the storefront services: a small REST API for
//! registration, login and product creation, plus a GraphQL endpoint in a
//! public and a bearer-protected flavour. The REST routes are described by
//! an OpenAPI document with Swagger UI mounted at `/docs`.
//!
//! ```text
//! Client -> HTTP -> Gateway -> Storefront services -> Table store
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use storefront::{Settings, Storefront};
//! use storefront_gateway::{create_router, AppState};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new()?;
//!     let app = create_router(AppState::new(Storefront::from_settings(&settings)));
//!
//!     let listener = tokio::net::TcpListener::bind(&settings.server.bind_address).await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod graphql;
pub mod openapi;
pub mod router;

pub use auth::{require_bearer, Subject};
pub use graphql::{build_schema, StorefrontSchema};
pub use openapi::{openapi_spec, ApiDoc};
pub use router::{create_router, ApiError, AppState};
