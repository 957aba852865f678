use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{Result, StorefrontError};
use crate::model::{timestamp, NewProduct, Product, ProductChanges, ProductPatch, ProductRow, PRODUCTS};
use crate::store::{Filter, Table, TableStore};

/// Product catalog CRUD
#[derive(Clone)]
pub struct ProductService {
    products: Table<Product>,
}

fn check_amounts(price: Option<i64>, stock: Option<i64>) -> Result<()> {
    if price.is_some_and(|p| p < 0) {
        return Err(StorefrontError::validation("price must be non-negative"));
    }
    if stock.is_some_and(|s| s < 0) {
        return Err(StorefrontError::validation("stock must be non-negative"));
    }
    Ok(())
}

impl ProductService {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            products: Table::new(store, PRODUCTS),
        }
    }

    pub async fn create(&self, request: NewProduct) -> Result<Product> {
        check_amounts(Some(request.price), Some(request.stock))?;

        let now = timestamp::now();
        let row = ProductRow {
            name: &request.name,
            description: &request.description,
            price: request.price,
            stock: request.stock,
            created_at: now,
            updated_at: now,
        };

        let product = self.products.insert(&row).await?;
        info!("Created product: {} (ID: {})", product.name, product.id);
        Ok(product)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Product>> {
        debug!("Getting product with ID: {}", id);
        Ok(self.products.find_one(&[Filter::eq("id", id)]).await?)
    }

    pub async fn list(&self) -> Result<Vec<Product>> {
        let products = self.products.find(&[]).await?;
        debug!("Listed {} products", products.len());
        Ok(products)
    }

    /// Overwrite the supplied fields and refresh `updated_at`
    pub async fn update(&self, id: i64, changes: ProductChanges) -> Result<Product> {
        check_amounts(changes.price, changes.stock)?;

        let patch = ProductPatch {
            name: changes.name.as_deref(),
            description: changes.description.as_deref(),
            price: changes.price,
            stock: changes.stock,
            updated_at: timestamp::now(),
        };

        let updated = self.products.update(&[Filter::eq("id", id)], &patch).await?;
        match updated.into_iter().next() {
            Some(product) => {
                info!("Updated product: {} (ID: {})", product.name, product.id);
                Ok(product)
            }
            None => Err(StorefrontError::NotFound { entity: "Product", id }),
        }
    }

    /// True if a row was removed
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let removed = self.products.delete(&[Filter::eq("id", id)]).await?;
        if !removed.is_empty() {
            info!("Deleted product {}", id);
        }
        Ok(!removed.is_empty())
    }
}
