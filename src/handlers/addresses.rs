use crate::entities::AddressModel;
use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    services::addresses::{CreateAddressInput, UpdateAddressInput},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Routes nested under `/customers`
pub fn addresses_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:customer_id/addresses",
            get(list_addresses).post(create_address),
        )
        .route(
            "/:customer_id/addresses/:id",
            get(get_address).put(update_address).delete(delete_address),
        )
}

/// List a customer's addresses, default first
#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/addresses",
    params(
        ("customer_id" = Uuid, Path, description = "Customer ID")
    ),
    responses(
        (status = 200, description = "Addresses retrieved", body = crate::ApiResponse<Vec<AddressResponse>>)
    ),
    tag = "Addresses"
)]
pub async fn list_addresses(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let addresses = state
        .services
        .address_book
        .list(customer_id)
        .await
        .map_err(map_service_error)?;

    let addresses: Vec<AddressResponse> =
        addresses.into_iter().map(AddressResponse::from).collect();
    Ok(success_response(addresses))
}

/// Add an address; the first one becomes the default
#[utoipa::path(
    post,
    path = "/api/v1/customers/{customer_id}/addresses",
    params(
        ("customer_id" = Uuid, Path, description = "Customer ID")
    ),
    request_body = CreateAddressInput,
    responses(
        (status = 201, description = "Address created", body = crate::ApiResponse<AddressResponse>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn create_address(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(payload): Json<CreateAddressInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let address = state
        .services
        .address_book
        .create(customer_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(AddressResponse::from(address)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{customer_id}/addresses/{id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer ID"),
        ("id" = Uuid, Path, description = "Address ID")
    ),
    responses(
        (status = 200, description = "Address retrieved", body = crate::ApiResponse<AddressResponse>),
        (status = 403, description = "Address belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn get_address(
    State(state): State<AppState>,
    Path((customer_id, id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let address = state
        .services
        .address_book
        .get(customer_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(AddressResponse::from(address)))
}

/// Update an address; `is_default: true` makes it the default
#[utoipa::path(
    put,
    path = "/api/v1/customers/{customer_id}/addresses/{id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer ID"),
        ("id" = Uuid, Path, description = "Address ID")
    ),
    request_body = UpdateAddressInput,
    responses(
        (status = 200, description = "Address updated", body = crate::ApiResponse<AddressResponse>),
        (status = 400, description = "Invalid payload or default cannot be unset", body = crate::errors::ErrorResponse),
        (status = 403, description = "Address belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn update_address(
    State(state): State<AppState>,
    Path((customer_id, id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateAddressInput>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let address = state
        .services
        .address_book
        .update(customer_id, id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(AddressResponse::from(address)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/customers/{customer_id}/addresses/{id}",
    params(
        ("customer_id" = Uuid, Path, description = "Customer ID"),
        ("id" = Uuid, Path, description = "Address ID")
    ),
    responses(
        (status = 204, description = "Address deleted"),
        (status = 403, description = "Address belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Address not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Addresses"
)]
pub async fn delete_address(
    State(state): State<AppState>,
    Path((customer_id, id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .address_book
        .remove(customer_id, id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AddressResponse {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub full_name: String,
    pub phone: String,
    pub address_line: String,
    pub apartment: Option<String>,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub country: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AddressModel> for AddressResponse {
    fn from(address: AddressModel) -> Self {
        Self {
            id: address.id,
            customer_id: address.customer_id,
            full_name: address.full_name,
            phone: address.phone,
            address_line: address.address_line,
            apartment: address.apartment,
            province: address.province,
            district: address.district,
            ward: address.ward,
            country: address.country,
            is_default: address.is_default,
            created_at: address.created_at,
            updated_at: address.updated_at,
        }
    }
}
