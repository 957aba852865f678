//! GraphQL schema over the storefront services
//!
//! The same schema is mounted twice: publicly at `/graphql` and behind the
//! bearer guard at `/graphql/protected`. On the protected mount the caller's
//! [`Subject`] is attached to every request.

use async_graphql::{
    Context, EmptySubscription, Error, ErrorExtensions, InputObject, Object, Result, Schema, SimpleObject,
};
use storefront::model::timestamp;
use storefront::{NewProduct, NewPurchase, Product, Purchase, Storefront, StorefrontError, User};
use tracing::error;

use crate::auth::Subject;

pub type StorefrontSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

pub fn build_schema(shop: Storefront) -> StorefrontSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(shop)
        .finish()
}

/// Convert a service failure into a GraphQL error carrying the same `code`
/// the REST surface uses. Server-side failures are logged, not echoed.
pub(crate) fn service_error(err: StorefrontError) -> Error {
    let message = if err.is_server_error() {
        error!("GraphQL resolver failed: {}", err);
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    let code = err.code();
    Error::new(message).extend_with(|_, e| e.set("code", code.to_string()))
}

fn unauthorized() -> Error {
    Error::new("Authentication required").extend_with(|_, e| e.set("code", "UNAUTHORIZED".to_string()))
}

#[derive(SimpleObject)]
#[graphql(name = "User")]
pub struct UserObject {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<User> for UserObject {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "Product")]
pub struct ProductObject {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: i64,
    pub stock: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Product> for ProductObject {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            price: product.price,
            stock: product.stock,
            created_at: timestamp::format(&product.created_at),
            updated_at: timestamp::format(&product.updated_at),
        }
    }
}

#[derive(SimpleObject)]
#[graphql(name = "Purchase")]
pub struct PurchaseObject {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub quantity: i64,
    pub total_price: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Purchase> for PurchaseObject {
    fn from(purchase: Purchase) -> Self {
        Self {
            id: purchase.id,
            user_id: purchase.user_id,
            product_id: purchase.product_id,
            quantity: purchase.quantity,
            total_price: purchase.total_price,
            status: purchase.status.to_string(),
            created_at: timestamp::format(&purchase.created_at),
            updated_at: timestamp::format(&purchase.updated_at),
        }
    }
}

#[derive(InputObject)]
pub struct ProductInput {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub stock: i64,
}

impl From<ProductInput> for NewProduct {
    fn from(input: ProductInput) -> Self {
        Self {
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
        }
    }
}

#[derive(InputObject)]
pub struct PurchaseInput {
    pub product_id: i64,
    pub quantity: i64,
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    async fn user(&self, ctx: &Context<'_>, id: i64) -> Result<Option<UserObject>> {
        let shop = ctx.data::<Storefront>()?;
        let user = shop.users.get(id).await.map_err(service_error)?;
        Ok(user.map(Into::into))
    }

    async fn users(&self, ctx: &Context<'_>) -> Result<Vec<UserObject>> {
        let shop = ctx.data::<Storefront>()?;
        let users = shop.users.list().await.map_err(service_error)?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn product(&self, ctx: &Context<'_>, id: i64) -> Result<Option<ProductObject>> {
        let shop = ctx.data::<Storefront>()?;
        let product = shop.products.get(id).await.map_err(service_error)?;
        Ok(product.map(Into::into))
    }

    async fn products(&self, ctx: &Context<'_>) -> Result<Vec<ProductObject>> {
        let shop = ctx.data::<Storefront>()?;
        let products = shop.products.list().await.map_err(service_error)?;
        Ok(products.into_iter().map(Into::into).collect())
    }

    async fn purchase(&self, ctx: &Context<'_>, id: i64) -> Result<Option<PurchaseObject>> {
        let shop = ctx.data::<Storefront>()?;
        let purchase = shop.purchases.get(id).await.map_err(service_error)?;
        Ok(purchase.map(Into::into))
    }

    async fn purchases(&self, ctx: &Context<'_>) -> Result<Vec<PurchaseObject>> {
        let shop = ctx.data::<Storefront>()?;
        let purchases = shop.purchases.list().await.map_err(service_error)?;
        Ok(purchases.into_iter().map(Into::into).collect())
    }

    async fn user_purchases(&self, ctx: &Context<'_>, user_id: i64) -> Result<Vec<PurchaseObject>> {
        let shop = ctx.data::<Storefront>()?;
        let purchases = shop.purchases.list_for_user(user_id).await.map_err(service_error)?;
        Ok(purchases.into_iter().map(Into::into).collect())
    }

    /// The account the bearer token was issued to; protected endpoint only
    async fn me(&self, ctx: &Context<'_>) -> Result<Option<UserObject>> {
        let subject = ctx.data_opt::<Subject>().ok_or_else(unauthorized)?;
        let shop = ctx.data::<Storefront>()?;
        let user = shop
            .users
            .find_by_username(&subject.username)
            .await
            .map_err(service_error)?;
        Ok(user.map(Into::into))
    }
}

pub struct MutationRoot;

#[Object]
impl MutationRoot {
    async fn create_product(&self, ctx: &Context<'_>, input: ProductInput) -> Result<ProductObject> {
        let shop = ctx.data::<Storefront>()?;
        let product = shop.products.create(input.into()).await.map_err(service_error)?;
        Ok(product.into())
    }

    /// Replaces every field of the product with `input`
    async fn update_product(&self, ctx: &Context<'_>, id: i64, input: ProductInput) -> Result<ProductObject> {
        let shop = ctx.data::<Storefront>()?;
        let changes = NewProduct::from(input).into();
        let product = shop.products.update(id, changes).await.map_err(service_error)?;
        Ok(product.into())
    }

    async fn delete_product(&self, ctx: &Context<'_>, id: i64) -> Result<bool> {
        let shop = ctx.data::<Storefront>()?;
        shop.products.delete(id).await.map_err(service_error)
    }

    async fn create_purchase(
        &self,
        ctx: &Context<'_>,
        input: PurchaseInput,
        user_id: i64,
    ) -> Result<PurchaseObject> {
        let shop = ctx.data::<Storefront>()?;
        let request = NewPurchase {
            product_id: input.product_id,
            quantity: input.quantity,
        };
        let purchase = shop
            .purchases
            .create_purchase(user_id, request)
            .await
            .map_err(service_error)?;
        Ok(purchase.into())
    }

    async fn update_purchase_status(&self, ctx: &Context<'_>, id: i64, status: String) -> Result<PurchaseObject> {
        let shop = ctx.data::<Storefront>()?;
        let purchase = shop
            .purchases
            .update_purchase_status(id, &status)
            .await
            .map_err(service_error)?;
        Ok(purchase.into())
    }
}
