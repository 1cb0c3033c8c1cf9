//! Store-facing half of image reconciliation.
//!
//! [`load_snapshot`] reads a product's image rows and its image generation,
//! [`apply`] writes a [`Plan`] against that snapshot. Both take any
//! `ConnectionTrait` so callers can run them inside a wider transaction (as
//! product creation does); [`ProductImageService`] wraps the whole
//! snapshot-plan-apply cycle in one transaction of its own.

use crate::{
    db::transaction::with_transaction,
    entities::{product, product_image},
    errors::ServiceError,
    events::{Event, EventSender},
    reconciliation::{validate, ChildRecord, DesiredEntry, Plan, ReconcileError, Reconciler},
};
use metrics::{counter, histogram};
use sea_orm::{
    sea_query::Expr, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

impl ChildRecord for product_image::Model {
    type Id = Uuid;

    fn record_id(&self) -> Uuid {
        self.id
    }

    fn key(&self) -> &str {
        &self.url
    }

    fn is_selected(&self) -> bool {
        self.is_primary
    }

    fn position(&self) -> i32 {
        self.sort_order
    }
}

/// One entry of a caller's desired image list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DesiredImage {
    #[schema(example = "https://cdn.example.com/p/blue-mug-front.jpg")]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_primary: Option<bool>,
}

impl DesiredImage {
    pub fn new(url: impl Into<String>, is_primary: Option<bool>) -> Self {
        Self {
            url: url.into(),
            is_primary,
        }
    }
}

impl From<&DesiredImage> for DesiredEntry {
    fn from(image: &DesiredImage) -> Self {
        DesiredEntry::new(image.url.clone(), image.is_primary)
    }
}

pub fn to_entries(desired: &[DesiredImage]) -> Vec<DesiredEntry> {
    desired.iter().map(DesiredEntry::from).collect()
}

/// Reconciler policy for product images: urls must be http(s) or
/// root-relative, and at most `max_images` distinct urls per product.
pub fn image_reconciler(max_images: usize) -> Reconciler {
    Reconciler::new(validate::resource_locator).with_max_entries(max_images)
}

/// A product's image rows as read at one point in time.
#[derive(Debug, Clone)]
pub struct ImageSetSnapshot {
    pub product_id: Uuid,
    /// `products.image_generation` when the rows were read
    pub generation: i64,
    /// Ordered by `sort_order`
    pub images: Vec<product_image::Model>,
}

/// What a committed reconciliation did.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub product_id: Uuid,
    pub generation: i64,
    pub images: Vec<product_image::Model>,
    pub deleted: usize,
    pub updated: usize,
    pub inserted: usize,
}

impl ReconcileOutcome {
    pub fn primary(&self) -> Option<&product_image::Model> {
        self.images.iter().find(|image| image.is_primary)
    }

    pub fn event(&self) -> Event {
        Event::ProductImagesReconciled {
            product_id: self.product_id,
            generation: self.generation,
            deleted: self.deleted,
            updated: self.updated,
            inserted: self.inserted,
            primary_url: self.primary().map(|image| image.url.clone()),
        }
    }
}

/// A plan computed against the current rows but not applied.
#[derive(Debug, Clone)]
pub struct PlanPreview {
    pub snapshot: ImageSetSnapshot,
    pub plan: Plan<Uuid>,
}

/// Image rows of a product ordered for display.
pub async fn list_images<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<Vec<product_image::Model>, sea_orm::DbErr> {
    product_image::Entity::find()
        .filter(product_image::Column::ProductId.eq(product_id))
        .order_by_asc(product_image::Column::SortOrder)
        .order_by_asc(product_image::Column::Id)
        .all(conn)
        .await
}

pub async fn load_snapshot<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<ImageSetSnapshot, ReconcileError> {
    read_snapshot(conn, product_id)
        .await
        .map_err(|err| err.for_product(product_id))
}

async fn read_snapshot<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<ImageSetSnapshot, ReconcileError> {
    let product = product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(ReconcileError::ProductNotFound(product_id))?;

    let images = list_images(conn, product_id).await?;

    Ok(ImageSetSnapshot {
        product_id,
        generation: product.image_generation,
        images,
    })
}

/// Writes `plan` for the snapshot's product.
///
/// The first statement moves `image_generation` from the snapshot's value to
/// the next one; if another writer got there first nothing else is written.
/// A writer blocked by another transaction on the same database (SQLite
/// BUSY, Postgres serialization failure) has lost the same race.
/// The caller owns the transaction: any error returned here must roll it back.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    snapshot: &ImageSetSnapshot,
    plan: &Plan<Uuid>,
) -> Result<ReconcileOutcome, ReconcileError> {
    write_plan(conn, snapshot, plan)
        .await
        .map_err(|err| err.for_product(snapshot.product_id))
}

async fn write_plan<C: ConnectionTrait>(
    conn: &C,
    snapshot: &ImageSetSnapshot,
    plan: &Plan<Uuid>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let product_id = snapshot.product_id;

    let bumped = product::Entity::update_many()
        .col_expr(
            product::Column::ImageGeneration,
            Expr::col(product::Column::ImageGeneration).add(1),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::ImageGeneration.eq(snapshot.generation))
        .exec(conn)
        .await?;

    if bumped.rows_affected == 0 {
        let exists = product::Entity::find_by_id(product_id)
            .one(conn)
            .await?
            .is_some();
        return Err(if exists {
            ReconcileError::ConflictingConcurrentEdit(product_id)
        } else {
            ReconcileError::ProductNotFound(product_id)
        });
    }

    if !plan.delete.is_empty() {
        let deleted = product_image::Entity::delete_many()
            .filter(product_image::Column::ProductId.eq(product_id))
            .filter(product_image::Column::Id.is_in(plan.delete.clone()))
            .exec(conn)
            .await?;
        if deleted.rows_affected != plan.delete.len() as u64 {
            return Err(ReconcileError::ConflictingConcurrentEdit(product_id));
        }
    }

    // Demote before promoting so no statement sees two primaries.
    let (promotions, demotions): (Vec<_>, Vec<_>) =
        plan.changed_updates().partition(|update| update.selected);
    let mut updated = 0;
    for update in demotions {
        write_update(conn, product_id, update.id, update.position, update.selected).await?;
        updated += 1;
    }

    let (primary_inserts, plain_inserts): (Vec<_>, Vec<_>) =
        plan.insert.iter().partition(|insert| insert.selected);
    for insert in plain_inserts {
        insert_image(conn, product_id, &insert.key, insert.position, false).await?;
    }
    for update in promotions {
        write_update(conn, product_id, update.id, update.position, true).await?;
        updated += 1;
    }
    for insert in primary_inserts {
        insert_image(conn, product_id, &insert.key, insert.position, true).await?;
    }

    let images = list_images(conn, product_id).await?;
    verify_stored(product_id, plan, &images)?;

    debug!(
        %product_id,
        deleted = plan.delete.len(),
        updated,
        inserted = plan.insert.len(),
        "Image plan written"
    );

    Ok(ReconcileOutcome {
        product_id,
        generation: snapshot.generation + 1,
        images,
        deleted: plan.delete.len(),
        updated,
        inserted: plan.insert.len(),
    })
}

/// Loads, plans and applies on `conn` in one go.
///
/// With `expected_generation` set, the caller's own view of the set is the
/// one that must still be current.
pub async fn reconcile<C: ConnectionTrait>(
    conn: &C,
    reconciler: &Reconciler,
    product_id: Uuid,
    desired: &[DesiredEntry],
    expected_generation: Option<i64>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut snapshot = load_snapshot(conn, product_id).await?;
    if let Some(expected) = expected_generation {
        snapshot.generation = expected;
    }
    let plan = reconciler.compute_plan(&snapshot.images, desired)?;
    apply(conn, &snapshot, &plan).await
}

async fn write_update<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    image_id: Uuid,
    position: i32,
    selected: bool,
) -> Result<(), ReconcileError> {
    let result = product_image::Entity::update_many()
        .col_expr(product_image::Column::SortOrder, Expr::value(position))
        .col_expr(product_image::Column::IsPrimary, Expr::value(selected))
        .filter(product_image::Column::Id.eq(image_id))
        .filter(product_image::Column::ProductId.eq(product_id))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ReconcileError::ConflictingConcurrentEdit(product_id));
    }
    Ok(())
}

async fn insert_image<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    url: &str,
    position: i32,
    selected: bool,
) -> Result<(), ReconcileError> {
    let row = product_image::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        url: Set(url.to_string()),
        alt_text: Set(None),
        sort_order: Set(position),
        is_primary: Set(selected),
    };
    product_image::Entity::insert(row).exec(conn).await?;
    Ok(())
}

fn verify_stored(
    product_id: Uuid,
    plan: &Plan<Uuid>,
    images: &[product_image::Model],
) -> Result<(), ReconcileError> {
    let primaries = images.iter().filter(|image| image.is_primary).count();
    let expected_primaries = usize::from(!images.is_empty());
    if images.len() != plan.resulting_len() || primaries != expected_primaries {
        return Err(ReconcileError::InvariantViolation(format!(
            "product {} holds {} images with {} primary after applying a plan for {}",
            product_id,
            images.len(),
            primaries,
            plan.resulting_len()
        )));
    }
    Ok(())
}

/// Runs image reconciliations in their own transaction and reports outcomes.
#[derive(Clone)]
pub struct ProductImageService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    reconciler: Reconciler,
}

impl ProductImageService {
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

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Current image set of a product
    #[instrument(skip(self))]
    pub async fn get_images(&self, product_id: Uuid) -> Result<ImageSetSnapshot, ServiceError> {
        Ok(load_snapshot(&*self.db, product_id).await?)
    }

    /// Replaces a product's image set with `desired`
    #[instrument(skip(self, desired), fields(desired_len = desired.len()))]
    pub async fn replace_images(
        &self,
        product_id: Uuid,
        desired: &[DesiredImage],
        expected_generation: Option<i64>,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let entries = to_entries(desired);
        self.reconciler.check_desired(&entries)?;

        let reconciler = self.reconciler;
        let start = Instant::now();
        let result = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                reconcile(txn, &reconciler, product_id, &entries, expected_generation).await
            })
        })
        .await
        .map_err(|err| err.for_product(product_id));
        record_outcome(product_id, &result, start);

        let outcome = result?;
        self.event_sender.send_or_log(outcome.event()).await;
        info!(
            "Reconciled images of product {}: {} kept, {} removed, {} added",
            product_id,
            outcome.images.len() - outcome.inserted,
            outcome.deleted,
            outcome.inserted
        );
        Ok(outcome)
    }

    /// Plan for `desired` against the current rows, without writing anything
    #[instrument(skip(self, desired), fields(desired_len = desired.len()))]
    pub async fn preview(
        &self,
        product_id: Uuid,
        desired: &[DesiredImage],
    ) -> Result<PlanPreview, ServiceError> {
        let entries = to_entries(desired);
        self.reconciler.check_desired(&entries)?;

        let snapshot = load_snapshot(&*self.db, product_id).await?;
        let plan = self.reconciler.compute_plan(&snapshot.images, &entries)?;
        Ok(PlanPreview { snapshot, plan })
    }
}

/// Metrics and log lines for one reconciliation attempt.
pub(crate) fn record_outcome<T>(
    product_id: Uuid,
    result: &Result<T, ReconcileError>,
    start: Instant,
) {
    histogram!(
        "storefront_images.reconcile.duration_seconds",
        start.elapsed().as_secs_f64()
    );
    match result {
        Ok(_) => counter!("storefront_images.reconcile.applied", 1),
        Err(ReconcileError::ConflictingConcurrentEdit(_)) => {
            warn!("Concurrent image edit on product {}", product_id);
            counter!("storefront_images.reconcile.conflict", 1);
        }
        Err(ReconcileError::InvariantViolation(msg)) => {
            error!(
                "Image invariant violated on product {}: {}",
                product_id, msg
            );
            counter!("storefront_images.reconcile.invariant_violation", 1);
        }
        Err(ReconcileError::InvalidEntry { .. }) | Err(ReconcileError::TooManyEntries { .. }) => {
            counter!("storefront_images.reconcile.rejected", 1);
        }
        Err(e) => {
            warn!("Image reconciliation failed on product {}: {}", product_id, e);
            counter!("storefront_images.reconcile.failed", 1);
        }
    }
}
