use crate::entities::{product_image, ProductModel};
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, normalize_optional_string,
    normalize_string, success_response, validate_input, PaginatedResponse, PaginationParams,
};
use crate::{
    errors::ApiError,
    services::{
        product_images::{DesiredImage, ImageSetSnapshot, PlanPreview, ReconcileOutcome},
        products::{CreateProductInput, ProductListQuery, ProductWithImages, UpdateProductInput},
    },
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_decimal_min_zero(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("decimal_min_zero"));
    }
    Ok(())
}

fn require_non_blank(value: String, field: &str) -> Result<String, ApiError> {
    let value = normalize_string(value);
    if value.is_empty() {
        Err(ApiError::ValidationError(format!("{field} cannot be blank")))
    } else {
        Ok(value)
    }
}

/// Creates the router for product endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
        .route(
            "/:id/images",
            get(get_product_images).put(replace_product_images),
        )
        .route("/:id/images/preview", post(preview_product_images))
        .route("/slug/:slug", get(get_product_by_slug))
}

/// List products, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ProductListParams),
    responses(
        (status = 200, description = "Products retrieved", body = crate::ApiResponse<PaginatedResponse<ProductResponse>>),
        (status = 400, description = "Invalid query parameters", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (page, per_page) = PaginationParams {
        page: params.page,
        per_page: params.per_page,
    }
    .resolve(
        state.config.api_default_page_size,
        state.config.api_max_page_size,
    )?;

    let query = ProductListQuery {
        search: normalize_optional_string(params.search),
        is_active: params.is_active,
        limit: per_page,
        offset: PaginationParams::offset(page, per_page),
    };

    let result = state
        .services
        .product_catalog
        .list_products(query)
        .await
        .map_err(map_service_error)?;

    let products = result
        .products
        .into_iter()
        .map(ProductResponse::from)
        .collect();

    Ok(success_response(PaginatedResponse::new(
        products,
        page,
        per_page,
        result.total,
    )))
}

/// Create a new product with an optional initial image set
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = CreateProductInput {
        name: require_non_blank(payload.name, "Product name")?,
        slug: require_non_blank(payload.slug, "Slug")?,
        description: normalize_optional_string(payload.description),
        price: payload.price.unwrap_or(Decimal::ZERO),
        discount: payload.discount,
        quantity: payload.quantity.unwrap_or(0),
        is_active: payload.is_active,
        images: payload.images,
    };

    let product = state
        .services
        .product_catalog
        .create_product(input)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(ProductResponse::from(product)))
}

/// Get a product by ID
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Get a product by its storefront slug
#[utoipa::path(
    get,
    path = "/api/v1/products/slug/{slug}",
    params(
        ("slug" = String, Path, description = "Product slug")
    ),
    responses(
        (status = 200, description = "Product retrieved", body = crate::ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn get_product_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .product_catalog
        .get_product_by_slug(&slug)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Update product fields and, when `images` is present, replace its image set
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = crate::ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Image set changed concurrently", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let input = UpdateProductInput {
        name: payload
            .name
            .map(|v| require_non_blank(v, "Product name"))
            .transpose()?,
        slug: payload
            .slug
            .map(|v| require_non_blank(v, "Slug"))
            .transpose()?,
        description: normalize_optional_string(payload.description),
        price: payload.price,
        discount: payload.discount,
        quantity: payload.quantity,
        is_active: payload.is_active,
        images: payload.images,
        expected_image_generation: payload.expected_image_generation,
    };

    let product = state
        .services
        .product_catalog
        .update_product(id, input)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ProductResponse::from(product)))
}

/// Delete a product and its images
#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .product_catalog
        .delete_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Current image set of a product
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/images",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    responses(
        (status = 200, description = "Image set retrieved", body = crate::ApiResponse<ImageSetResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Product Images"
)]
pub async fn get_product_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let snapshot = state
        .services
        .product_images
        .get_images(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ImageSetResponse::from(snapshot)))
}

/// Replace a product's image set with the desired ordered list
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}/images",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = ReplaceImagesRequest,
    responses(
        (status = 200, description = "Image set reconciled", body = crate::ApiResponse<ImageSetResponse>),
        (status = 400, description = "Invalid image entry", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Image set changed concurrently", body = crate::errors::ErrorResponse),
        (status = 503, description = "Store unavailable, retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Product Images"
)]
pub async fn replace_product_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceImagesRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let outcome = state
        .services
        .product_images
        .replace_images(id, &payload.images, payload.expected_generation)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ImageSetResponse::from(outcome)))
}

/// Plan a replacement of the image set without applying it
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/images/preview",
    params(
        ("id" = Uuid, Path, description = "Product ID")
    ),
    request_body = ReplaceImagesRequest,
    responses(
        (status = 200, description = "Plan computed", body = crate::ApiResponse<ImagePlanResponse>),
        (status = 400, description = "Invalid image entry", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Product Images"
)]
pub async fn preview_product_images(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceImagesRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let preview = state
        .services
        .product_images
        .preview(id, &payload.images)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ImagePlanResponse::from(preview)))
}

// Request/Response DTOs

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductListParams {
    #[serde(default = "default_page")]
    pub page: u64,
    pub per_page: Option<u64>,
    /// Matches name or slug
    pub search: Option<String>,
    pub is_active: Option<bool>,
}

fn default_page() -> u64 {
    1
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "name": "Stoneware mug",
    "slug": "stoneware-mug",
    "description": "Hand glazed, 350 ml.",
    "price": "18.00",
    "quantity": 40,
    "images": [
        { "url": "https://cdn.example.com/p/mug-front.jpg", "isPrimary": true },
        { "url": "/images/mug-side.png" }
    ]
}))]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// URL slug, unique across the catalog
    #[validate(length(min = 1, max = 255))]
    pub slug: String,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_decimal_min_zero")]
    pub price: Option<Decimal>,
    /// Discount percentage
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub is_active: Option<bool>,
    /// Initial image set; the first entry flagged primary wins, else the first entry
    #[serde(default)]
    pub images: Vec<DesiredImage>,
}

/// Product fields use the snake_case names of the product resource
/// (`image_generation` in responses); only the image fragment is camelCase.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255))]
    pub slug: Option<String>,
    #[serde(default)]
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_decimal_min_zero")]
    pub price: Option<Decimal>,
    #[serde(default)]
    #[validate(range(min = 0, max = 100))]
    pub discount: Option<i32>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub quantity: Option<i32>,
    pub is_active: Option<bool>,
    /// Replaces the whole image set when present
    #[serde(default)]
    pub images: Option<Vec<DesiredImage>>,
    /// Image generation the caller last read; a mismatch is a 409.
    /// Rejected with a 400 when `images` is absent.
    #[serde(default, alias = "expectedImageGeneration")]
    pub expected_image_generation: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceImagesRequest {
    pub images: Vec<DesiredImage>,
    #[serde(default)]
    pub expected_generation: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub id: Uuid,
    pub url: String,
    pub is_primary: bool,
}

impl From<product_image::Model> for ImageResponse {
    fn from(image: product_image::Model) -> Self {
        Self {
            id: image.id,
            url: image.url,
            is_primary: image.is_primary,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub discount: Option<i32>,
    pub quantity: i32,
    pub is_active: bool,
    pub image_generation: i64,
    /// Ordered by position
    pub images: Vec<ImageResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProductResponse {
    fn new(product: ProductModel, images: Vec<product_image::Model>) -> Self {
        Self {
            id: product.id,
            name: product.name,
            slug: product.slug,
            description: product.description,
            price: product.price,
            discount: product.discount,
            quantity: product.quantity,
            is_active: product.is_active,
            image_generation: product.image_generation,
            images: images.into_iter().map(ImageResponse::from).collect(),
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

impl From<ProductWithImages> for ProductResponse {
    fn from(value: ProductWithImages) -> Self {
        Self::new(value.product, value.images)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSetResponse {
    pub product_id: Uuid,
    pub generation: i64,
    pub images: Vec<ImageResponse>,
}

impl From<ImageSetSnapshot> for ImageSetResponse {
    fn from(snapshot: ImageSetSnapshot) -> Self {
        Self {
            product_id: snapshot.product_id,
            generation: snapshot.generation,
            images: snapshot.images.into_iter().map(ImageResponse::from).collect(),
        }
    }
}

impl From<ReconcileOutcome> for ImageSetResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        Self {
            product_id: outcome.product_id,
            generation: outcome.generation,
            images: outcome.images.into_iter().map(ImageResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedImageDelete {
    pub id: Uuid,
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedImageUpdate {
    pub id: Uuid,
    pub url: String,
    pub position: i32,
    pub is_primary: bool,
    pub changed: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedImageInsert {
    pub url: String,
    pub position: i32,
    pub is_primary: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImagePlanResponse {
    pub product_id: Uuid,
    /// Generation to send back as `expectedGeneration` when applying
    pub generation: i64,
    pub noop: bool,
    pub primary_url: Option<String>,
    pub delete: Vec<PlannedImageDelete>,
    pub update: Vec<PlannedImageUpdate>,
    pub insert: Vec<PlannedImageInsert>,
}

impl From<PlanPreview> for ImagePlanResponse {
    fn from(preview: PlanPreview) -> Self {
        let PlanPreview { snapshot, plan } = preview;
        let delete = plan
            .delete
            .iter()
            .map(|id| PlannedImageDelete {
                id: *id,
                url: snapshot
                    .images
                    .iter()
                    .find(|image| image.id == *id)
                    .map(|image| image.url.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            product_id: snapshot.product_id,
            generation: snapshot.generation,
            noop: plan.is_noop(),
            primary_url: plan.selected_key().map(str::to_string),
            delete,
            update: plan
                .update
                .iter()
                .map(|u| PlannedImageUpdate {
                    id: u.id,
                    url: u.key.clone(),
                    position: u.position,
                    is_primary: u.selected,
                    changed: u.is_change(),
                })
                .collect(),
            insert: plan
                .insert
                .iter()
                .map(|i| PlannedImageInsert {
                    url: i.key.clone(),
                    position: i.position,
                    is_primary: i.selected,
                })
                .collect(),
        }
    }
}
