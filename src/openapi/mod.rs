use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# Storefront Catalog API

Products, their ordered image sets and customer address books.

## Image sets

`PUT /api/v1/products/{id}/images` replaces the whole image set of a product.
Entries are matched by URL: existing images are kept (and reordered),
missing ones are deleted, new ones inserted. Exactly one image is primary
whenever the set is non-empty. Every successful replace bumps the product's
image generation; pass the last generation you read as `expectedGeneration`
to get a `409 Conflict` instead of overwriting a concurrent edit.

## Errors

Failures share one body shape:

```json
{
  "error": "Conflict",
  "message": "Concurrent modification for ID 550e8400-e29b-41d4-a716-446655440000",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-12-09T10:30:00.000Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Product Images", description = "Image set reconciliation endpoints"),
        (name = "Addresses", description = "Customer address book endpoints"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::health_check,

        // Products
        crate::handlers::products::list_products,
        crate::handlers::products::create_product,
        crate::handlers::products::get_product,
        crate::handlers::products::get_product_by_slug,
        crate::handlers::products::update_product,
        crate::handlers::products::delete_product,

        // Product images
        crate::handlers::products::get_product_images,
        crate::handlers::products::replace_product_images,
        crate::handlers::products::preview_product_images,

        // Addresses
        crate::handlers::addresses::list_addresses,
        crate::handlers::addresses::create_address,
        crate::handlers::addresses::get_address,
        crate::handlers::addresses::update_address,
        crate::handlers::addresses::delete_address,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::HealthStatus,
            crate::handlers::common::PaginationMeta,

            crate::handlers::products::CreateProductRequest,
            crate::handlers::products::UpdateProductRequest,
            crate::handlers::products::ProductResponse,
            crate::handlers::products::ReplaceImagesRequest,
            crate::handlers::products::ImageResponse,
            crate::handlers::products::ImageSetResponse,
            crate::handlers::products::ImagePlanResponse,
            crate::services::product_images::DesiredImage,

            crate::handlers::addresses::AddressResponse,
            crate::services::addresses::CreateAddressInput,
            crate::services::addresses::UpdateAddressInput,

            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;
