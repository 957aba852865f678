use utoipa::OpenApi;

use storefront::{NewProduct, NewUser, Product};

use crate::router::{ErrorBody, LoginRequest, TokenResponse, UserResponse};

/// OpenAPI document for the REST routes; served at `/api-docs/openapi.json`
/// and browsable through Swagger UI at `/docs`
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::router::register,
        crate::router::login,
        crate::router::create_product,
    ),
    components(schemas(
        NewUser,
        UserResponse,
        LoginRequest,
        TokenResponse,
        NewProduct,
        Product,
        ErrorBody,
    )),
    tags(
        (name = "auth", description = "Registration and login"),
        (name = "products", description = "Catalogue management"),
    ),
    info(
        title = "Storefront API",
        description = "REST side of the storefront gateway; the full read/write surface is on /graphql",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

pub fn openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
