//! Business operations over the table store

pub mod product;
pub mod purchase;
pub mod user;

pub use product::ProductService;
pub use purchase::PurchaseService;
pub use user::UserService;
