use crate::{
    db::transaction::with_transaction,
    entities::{product, product_image, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
    reconciliation::Reconciler,
    services::product_images::{
        self, image_reconciler, record_outcome, to_entries, DesiredImage, ReconcileOutcome,
    },
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// A product together with its images in display order.
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithImages {
    pub product: ProductModel,
    pub images: Vec<product_image::Model>,
}

/// Product catalog service; every image write goes through reconciliation
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    reconciler: Reconciler,
}

impl ProductCatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        max_images: usize,
    ) -> Self {
        Self {
            db,
            event_sender,
            reconciler: image_reconciler(max_images),
        }
    }

    /// Create a new product, reconciling its images from the empty set
    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductWithImages, ServiceError> {
        input.validate()?;
        let entries = to_entries(&input.images);
        self.reconciler.check_desired(&entries)?;
        self.ensure_unique_slug(&input.slug, None).await?;

        let product_id = Uuid::new_v4();
        let reconciler = self.reconciler;
        let start = Instant::now();

        let (product, outcome) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let row = product::ActiveModel {
                    id: Set(product_id),
                    name: Set(input.name),
                    slug: Set(input.slug),
                    description: Set(input.description),
                    price: Set(input.price),
                    discount: Set(input.discount),
                    quantity: Set(input.quantity),
                    is_active: Set(input.is_active.unwrap_or(true)),
                    ..Default::default()
                };
                row.insert(txn).await?;

                let result =
                    product_images::reconcile(txn, &reconciler, product_id, &entries, None).await;
                record_outcome(product_id, &result, start);
                let outcome = result?;

                let product = Product::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError(format!(
                            "Product {} vanished during creation",
                            product_id
                        ))
                    })?;
                Ok::<_, ServiceError>((product, outcome))
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product_id))
            .await;
        if !outcome.images.is_empty() {
            self.event_sender.send_or_log(outcome.event()).await;
        }

        info!(
            "Created product {} with {} images",
            product_id,
            outcome.images.len()
        );
        Ok(ProductWithImages {
            product,
            images: outcome.images,
        })
    }

    /// Get a product by ID with its images
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithImages, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
        let images = product_images::list_images(&*self.db, product_id).await?;
        Ok(ProductWithImages { product, images })
    }

    /// Storefront lookup by the product's unique slug
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<ProductWithImages, ServiceError> {
        let product = Product::find()
            .filter(product::Column::Slug.eq(slug.trim()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product with slug '{}' not found", slug)))?;
        let images = product_images::list_images(&*self.db, product.id).await?;
        Ok(ProductWithImages { product, images })
    }

    /// Newest products first, one page at a time
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: ProductListQuery,
    ) -> Result<ProductListResult, ServiceError> {
        let mut db_query = Product::find();

        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            db_query = db_query.filter(
                product::Column::Name
                    .contains(search.trim())
                    .or(product::Column::Slug.contains(search.trim())),
            );
        }
        if let Some(is_active) = query.is_active {
            db_query = db_query.filter(product::Column::IsActive.eq(is_active));
        }

        let total = db_query.clone().count(&*self.db).await?;

        let products = db_query
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Id)
            .limit(query.limit)
            .offset(query.offset)
            .all(&*self.db)
            .await?;

        let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
        let mut images_by_product: HashMap<Uuid, Vec<product_image::Model>> = HashMap::new();
        if !ids.is_empty() {
            let images = product_image::Entity::find()
                .filter(product_image::Column::ProductId.is_in(ids))
                .order_by_asc(product_image::Column::SortOrder)
                .order_by_asc(product_image::Column::Id)
                .all(&*self.db)
                .await?;
            for image in images {
                images_by_product
                    .entry(image.product_id)
                    .or_default()
                    .push(image);
            }
        }

        let products = products
            .into_iter()
            .map(|product| {
                let images = images_by_product.remove(&product.id).unwrap_or_default();
                ProductWithImages { product, images }
            })
            .collect();

        Ok(ProductListResult { products, total })
    }

    /// Update product fields and, when given, its image set in one transaction
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductWithImages, ServiceError> {
        input.validate()?;
        if input.expected_image_generation.is_some() && input.images.is_none() {
            return Err(ServiceError::ValidationError(
                "expected_image_generation only applies when images are sent".to_string(),
            ));
        }
        let entries = input.images.as_deref().map(to_entries);
        if let Some(entries) = &entries {
            self.reconciler.check_desired(entries)?;
        }
        if let Some(slug) = &input.slug {
            self.ensure_unique_slug(slug, Some(product_id)).await?;
        }

        let reconciler = self.reconciler;
        let expected_generation = input.expected_image_generation;
        let start = Instant::now();

        let (product, images, outcome) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = Product::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;

                if input.has_field_changes() {
                    let mut active: product::ActiveModel = existing.into();
                    if let Some(name) = input.name {
                        active.name = Set(name);
                    }
                    if let Some(slug) = input.slug {
                        active.slug = Set(slug);
                    }
                    if let Some(description) = input.description {
                        active.description = Set(Some(description));
                    }
                    if let Some(price) = input.price {
                        active.price = Set(price);
                    }
                    if let Some(discount) = input.discount {
                        active.discount = Set(Some(discount));
                    }
                    if let Some(quantity) = input.quantity {
                        active.quantity = Set(quantity);
                    }
                    if let Some(is_active) = input.is_active {
                        active.is_active = Set(is_active);
                    }
                    active.update(txn).await?;
                }

                let outcome: Option<ReconcileOutcome> = match entries {
                    Some(entries) => {
                        let result = product_images::reconcile(
                            txn,
                            &reconciler,
                            product_id,
                            &entries,
                            expected_generation,
                        )
                        .await;
                        record_outcome(product_id, &result, start);
                        Some(result?)
                    }
                    None => None,
                };

                let product = Product::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;
                let images = match &outcome {
                    Some(outcome) => outcome.images.clone(),
                    None => product_images::list_images(txn, product_id).await?,
                };
                Ok::<_, ServiceError>((product, images, outcome))
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;
        if let Some(outcome) = &outcome {
            self.event_sender.send_or_log(outcome.event()).await;
        }

        info!("Updated product: {}", product_id);
        Ok(ProductWithImages { product, images })
    }

    /// Delete a product and its images
    #[instrument(skip(self))]
    pub async fn delete_product(&self, product_id: Uuid) -> Result<(), ServiceError> {
        with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                Product::find_by_id(product_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Product {} not found", product_id))
                    })?;

                product_image::Entity::delete_many()
                    .filter(product_image::Column::ProductId.eq(product_id))
                    .exec(txn)
                    .await?;
                Product::delete_by_id(product_id).exec(txn).await?;
                Ok::<_, ServiceError>(())
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;

        info!("Deleted product {}", product_id);
        Ok(())
    }

    async fn ensure_unique_slug(
        &self,
        slug: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find().filter(product::Column::Slug.eq(slug));
        if let Some(id) = exclude_id {
            query = query.filter(product::Column::Id.ne(id));
        }

        if query.one(&*self.db).await?.is_some() {
            return Err(ServiceError::ValidationError(format!(
                "Slug {} already exists",
                slug
            )));
        }

        Ok(())
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 255))]
    pub slug: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom = "non_negative_price")]
    pub price: Decimal,
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i32>,
    #[validate(range(min = 0))]
    pub quantity: i32,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub images: Vec<DesiredImage>,
}

/// Input for updating a product; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(custom = "non_negative_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i32>,
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    pub is_active: Option<bool>,
    /// Replaces the whole image set when present
    pub images: Option<Vec<DesiredImage>>,
    /// Image generation the caller last saw
    pub expected_image_generation: Option<i64>,
}

impl UpdateProductInput {
    fn has_field_changes(&self) -> bool {
        self.name.is_some()
            || self.slug.is_some()
            || self.description.is_some()
            || self.price.is_some()
            || self.discount.is_some()
            || self.quantity.is_some()
            || self.is_active.is_some()
    }
}

fn non_negative_price(price: &Decimal) -> Result<(), validator::ValidationError> {
    if price.is_sign_negative() {
        let mut err = validator::ValidationError::new("price");
        err.message = Some("Price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone)]
pub struct ProductListResult {
    pub products: Vec<ProductWithImages>,
    pub total: u64,
}
