pub mod addresses;
pub mod common;
pub mod products;

use crate::events::EventSender;
use crate::services::{
    addresses::AddressBookService, product_images::ProductImageService,
    products::ProductCatalogService,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub product_catalog: Arc<ProductCatalogService>,
    pub product_images: Arc<ProductImageService>,
    pub address_book: Arc<AddressBookService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        max_images_per_product: usize,
    ) -> Self {
        Self {
            product_catalog: Arc::new(ProductCatalogService::new(
                db.clone(),
                event_sender.clone(),
                max_images_per_product,
            )),
            product_images: Arc::new(ProductImageService::new(
                db.clone(),
                event_sender.clone(),
                max_images_per_product,
            )),
            address_book: Arc::new(AddressBookService::new(db, event_sender)),
        }
    }
}
