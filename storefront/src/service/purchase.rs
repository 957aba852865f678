use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{Result, StorefrontError};
use crate::model::{
    timestamp, NewPurchase, Product, Purchase, PurchaseRow, PurchaseStatus, StatusPatch, StockPatch, PRODUCTS,
    PURCHASES,
};
use crate::store::{Filter, Table, TableStore};

/// How often a stock compare-and-set is retried after losing a race
const MAX_STOCK_ATTEMPTS: u32 = 3;

/// Purchase workflow: stock check, pricing, stock reservation, record keeping
#[derive(Clone)]
pub struct PurchaseService {
    products: Table<Product>,
    purchases: Table<Purchase>,
}

/// Stock taken out of a product for one purchase
#[derive(Debug, Clone, Copy, PartialEq)]
struct Reservation {
    product_id: i64,
    quantity: i64,
    total_price: i64,
    remaining: i64,
}

impl PurchaseService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            products: Table::new(store.clone(), PRODUCTS),
            purchases: Table::new(store, PURCHASES),
        }
    }

    /// Buy `quantity` units of a product on behalf of `user_id`.
    ///
    /// Stock is reserved first with a compare-and-set on the stock value the
    /// check was made against, so concurrent buyers can never oversell. The
    /// purchase record is written afterwards; if that write fails the
    /// reservation is handed back.
    pub async fn create_purchase(&self, user_id: i64, request: NewPurchase) -> Result<Purchase> {
        if request.quantity <= 0 {
            return Err(StorefrontError::validation("quantity must be positive"));
        }

        let product = self.load_product(request.product_id).await?;
        let reservation = self.reserve_stock(product, request.quantity).await?;

        let now = timestamp::now();
        let row = PurchaseRow {
            user_id,
            product_id: reservation.product_id,
            quantity: reservation.quantity,
            total_price: reservation.total_price,
            status: PurchaseStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        match self.purchases.insert(&row).await {
            Ok(purchase) => {
                info!(
                    "Created purchase {} for user {}: {} x product {} ({} left)",
                    purchase.id, user_id, purchase.quantity, purchase.product_id, reservation.remaining
                );
                Ok(purchase)
            }
            Err(e) => {
                error!("Failed to record purchase for product {}: {}", reservation.product_id, e);
                if let Err(release_err) = self.release_stock(reservation.product_id, reservation.quantity).await {
                    error!(
                        "Could not return {} unit(s) to product {}: {}",
                        reservation.quantity, reservation.product_id, release_err
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Set the status of an existing purchase
    pub async fn update_purchase_status(&self, id: i64, status: &str) -> Result<Purchase> {
        let status: PurchaseStatus = status.parse()?;

        let patch = StatusPatch {
            status,
            updated_at: timestamp::now(),
        };
        let updated = self.purchases.update(&[Filter::eq("id", id)], &patch).await?;

        match updated.into_iter().next() {
            Some(purchase) => {
                info!("Purchase {} is now {}", id, status);
                Ok(purchase)
            }
            None => Err(StorefrontError::NotFound { entity: "Purchase", id }),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Option<Purchase>> {
        Ok(self.purchases.find_one(&[Filter::eq("id", id)]).await?)
    }

    pub async fn list(&self) -> Result<Vec<Purchase>> {
        Ok(self.purchases.find(&[]).await?)
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Purchase>> {
        let purchases = self.purchases.find(&[Filter::eq("user_id", user_id)]).await?;
        debug!("User {} has {} purchase(s)", user_id, purchases.len());
        Ok(purchases)
    }

    async fn load_product(&self, id: i64) -> Result<Product> {
        self.products
            .find_one(&[Filter::eq("id", id)])
            .await?
            .ok_or(StorefrontError::ProductNotFound(id))
    }

    /// Take `quantity` out of `product`'s stock. `product` is the snapshot the
    /// caller read; when another writer changed the stock since, the product
    /// is re-read and the check repeated.
    async fn reserve_stock(&self, mut product: Product, quantity: i64) -> Result<Reservation> {
        let mut attempts = 0;
        loop {
            if product.stock < quantity {
                warn!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product.id, quantity, product.stock
                );
                return Err(StorefrontError::InsufficientStock {
                    product_id: product.id,
                    requested: quantity,
                    available: product.stock,
                });
            }

            let total_price = product
                .price
                .checked_mul(quantity)
                .ok_or_else(|| StorefrontError::validation("total price out of range"))?;

            attempts += 1;
            let patch = StockPatch {
                stock: product.stock - quantity,
                updated_at: timestamp::now(),
            };
            let guard = [Filter::eq("id", product.id), Filter::eq("stock", product.stock)];

            if let Some(after) = self.products.update(&guard, &patch).await?.into_iter().next() {
                return Ok(Reservation {
                    product_id: product.id,
                    quantity,
                    total_price,
                    remaining: after.stock,
                });
            }

            debug!("Stock of product {} moved during reservation (attempt {})", product.id, attempts);
            product = self.load_product(product.id).await?;

            if attempts >= MAX_STOCK_ATTEMPTS && product.stock >= quantity {
                return Err(StorefrontError::Conflict(format!(
                    "stock of product {} is changing too quickly, try again",
                    product.id
                )));
            }
        }
    }

    /// Hand `quantity` units back to a product
    async fn release_stock(&self, product_id: i64, quantity: i64) -> Result<()> {
        for _ in 0..MAX_STOCK_ATTEMPTS {
            let Some(product) = self.products.find_one(&[Filter::eq("id", product_id)]).await? else {
                warn!("Product {} vanished before its stock could be returned", product_id);
                return Ok(());
            };

            let patch = StockPatch {
                stock: product.stock + quantity,
                updated_at: timestamp::now(),
            };
            let guard = [Filter::eq("id", product_id), Filter::eq("stock", product.stock)];
            if !self.products.update(&guard, &patch).await?.is_empty() {
                info!("Returned {} unit(s) to product {}", quantity, product_id);
                return Ok(());
            }
        }

        Err(StorefrontError::Conflict(format!(
            "stock of product {} kept changing while returning {} unit(s)",
            product_id, quantity
        )))
    }
}
