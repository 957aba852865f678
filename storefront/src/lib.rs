//! # Storefront - users, products and purchases over a hosted table store
//!
//! The services in this crate never touch a database driver. Every read and
//! write goes through the [`TableStore`] seam: [`SupabaseStore`] talks to a
//! hosted PostgREST endpoint, [`MemoryStore`] keeps everything in process.
//!
//! ```rust,no_run
//! use storefront::{Settings, Storefront};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::new()?;
//!     let shop = Storefront::from_settings(&settings);
//!
//!     let token = {
//!         let user = shop.users.authenticate("alice", "wonderland").await?;
//!         shop.tokens.issue(&user.username)?
//!     };
//!     println!("bearer {}", token);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod service;
pub mod store;

use std::sync::Arc;

use tracing::info;

pub use auth::{Claims, PasswordHasher, TokenIssuer};
pub use crate::config::{Settings, StoreBackend};
pub use error::{Result, StorefrontError};
pub use model::{
    NewProduct, NewPurchase, NewUser, Product, ProductChanges, Purchase, PurchaseStatus, User,
};
pub use service::{ProductService, PurchaseService, UserService};
pub use store::{Filter, MemoryStore, StoreError, SupabaseStore, TableStore};

/// Everything a request handler needs, built once at startup
#[derive(Clone)]
pub struct Storefront {
    pub users: UserService,
    pub products: ProductService,
    pub purchases: PurchaseService,
    pub tokens: Arc<TokenIssuer>,
    pub store: Arc<dyn TableStore>,
}

impl Storefront {
    pub fn new(store: Arc<dyn TableStore>, hasher: PasswordHasher, tokens: TokenIssuer) -> Self {
        Self {
            users: UserService::new(store.clone(), hasher),
            products: ProductService::new(store.clone()),
            purchases: PurchaseService::new(store.clone()),
            tokens: Arc::new(tokens),
            store,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let store: Arc<dyn TableStore> = match settings.store.backend {
            StoreBackend::Supabase => {
                info!("Using Supabase table store at {}", settings.store.url);
                Arc::new(SupabaseStore::new(&settings.store.url, settings.store.key.clone()))
            }
            StoreBackend::Memory => {
                info!("Using in-memory table store");
                Arc::new(MemoryStore::for_storefront())
            }
        };

        let tokens = TokenIssuer::new(
            &settings.auth.secret,
            chrono::Duration::minutes(settings.auth.token_lifetime_minutes),
        );

        Self::new(store, PasswordHasher::new(settings.auth.bcrypt_cost), tokens)
    }

    /// Whether the table store answers
    pub async fn ping(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_settings() -> Settings {
        Settings {
            server: crate::config::Server {
                bind_address: "127.0.0.1:0".into(),
            },
            store: crate::config::Store {
                backend: StoreBackend::Memory,
                url: String::new(),
                key: String::new(),
            },
            auth: crate::config::Auth {
                secret: "s3cret".into(),
                token_lifetime_minutes: 30,
                bcrypt_cost: 4,
            },
        }
    }

    #[tokio::test]
    async fn test_register_login_and_buy() {
        let shop = Storefront::from_settings(&memory_settings());
        shop.ping().await.unwrap();

        let user = shop
            .users
            .register(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: "wonderland".into(),
            })
            .await
            .unwrap();

        let authenticated = shop.users.authenticate("alice", "wonderland").await.unwrap();
        let token = shop.tokens.issue(&authenticated.username).unwrap();
        assert_eq!(shop.tokens.validate(&token).unwrap(), "alice");
        assert_eq!(shop.tokens.lifetime(), chrono::Duration::minutes(30));

        let product = shop
            .products
            .create(NewProduct {
                name: "Widget".into(),
                description: "A very fine widget".into(),
                price: 1000,
                stock: 5,
            })
            .await
            .unwrap();

        let purchase = shop
            .purchases
            .create_purchase(user.id, NewPurchase { product_id: product.id, quantity: 3 })
            .await
            .unwrap();
        assert_eq!(purchase.total_price, 3000);
        assert_eq!(shop.products.get(product.id).await.unwrap().unwrap().stock, 2);
    }

    #[test]
    fn test_clones_share_the_store() {
        let shop = Storefront::from_settings(&memory_settings());
        let copy = shop.clone();
        assert!(Arc::ptr_eq(&shop.store, &copy.store));
        assert!(Arc::ptr_eq(&shop.tokens, &copy.tokens));
    }
}
