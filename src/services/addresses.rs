use crate::{
    db::transaction::with_transaction,
    entities::{address, Address, AddressModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Customer address book. A customer with any address has exactly one
/// default; every change that moves the flag does so in one transaction.
#[derive(Clone)]
pub struct AddressBookService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl AddressBookService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds an address; the customer's first one becomes the default.
    #[instrument(skip(self, input))]
    pub async fn create(
        &self,
        customer_id: Uuid,
        input: CreateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        input.validate()?;
        let address_id = Uuid::new_v4();

        let created = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let has_default = Address::find()
                    .filter(address::Column::CustomerId.eq(customer_id))
                    .filter(address::Column::IsDefault.eq(true))
                    .one(txn)
                    .await?
                    .is_some();
                let make_default = input.is_default || !has_default;
                if make_default {
                    clear_default(txn, customer_id).await?;
                }

                let now = Utc::now();
                let row = address::ActiveModel {
                    id: Set(address_id),
                    customer_id: Set(customer_id),
                    full_name: Set(input.full_name),
                    phone: Set(input.phone),
                    address_line: Set(input.address_line),
                    apartment: Set(input.apartment),
                    province: Set(input.province),
                    district: Set(input.district),
                    ward: Set(input.ward),
                    country: Set(input.country),
                    is_default: Set(make_default),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                Ok::<_, ServiceError>(row.insert(txn).await?)
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::AddressCreated {
                customer_id,
                address_id,
            })
            .await;
        if created.is_default {
            self.event_sender
                .send_or_log(Event::DefaultAddressChanged {
                    customer_id,
                    address_id,
                })
                .await;
        }

        info!("Created address {} for customer {}", address_id, customer_id);
        Ok(created)
    }

    /// Default address first, then newest first
    #[instrument(skip(self))]
    pub async fn list(&self, customer_id: Uuid) -> Result<Vec<AddressModel>, ServiceError> {
        Address::find()
            .filter(address::Column::CustomerId.eq(customer_id))
            .order_by_desc(address::Column::IsDefault)
            .order_by_desc(address::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(Into::into)
    }

    #[instrument(skip(self))]
    pub async fn get(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
    ) -> Result<AddressModel, ServiceError> {
        find_owned(&*self.db, customer_id, address_id).await
    }

    /// Updates fields; `is_default: true` moves the flag here, while clearing
    /// the flag of the current default is refused.
    #[instrument(skip(self, input))]
    pub async fn update(
        &self,
        customer_id: Uuid,
        address_id: Uuid,
        input: UpdateAddressInput,
    ) -> Result<AddressModel, ServiceError> {
        input.validate()?;

        let (updated, became_default) = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = find_owned(txn, customer_id, address_id).await?;
                let was_default = existing.is_default;

                let became_default = match input.is_default {
                    Some(false) if was_default => {
                        return Err(ServiceError::InvalidOperation(
                            "The default address cannot be unset; make another address the default instead"
                                .to_string(),
                        ));
                    }
                    Some(true) if !was_default => {
                        clear_default(txn, customer_id).await?;
                        true
                    }
                    _ => false,
                };

                let mut active: address::ActiveModel = existing.into();
                if let Some(full_name) = input.full_name {
                    active.full_name = Set(full_name);
                }
                if let Some(phone) = input.phone {
                    active.phone = Set(phone);
                }
                if let Some(address_line) = input.address_line {
                    active.address_line = Set(address_line);
                }
                if let Some(apartment) = input.apartment {
                    active.apartment = Set(Some(apartment));
                }
                if let Some(province) = input.province {
                    active.province = Set(province);
                }
                if let Some(district) = input.district {
                    active.district = Set(district);
                }
                if let Some(ward) = input.ward {
                    active.ward = Set(ward);
                }
                if let Some(country) = input.country {
                    active.country = Set(country);
                }
                if became_default {
                    active.is_default = Set(true);
                }
                active.updated_at = Set(Utc::now());

                let updated = active.update(txn).await?;
                Ok::<_, ServiceError>((updated, became_default))
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::AddressUpdated {
                customer_id,
                address_id,
            })
            .await;
        if became_default {
            self.event_sender
                .send_or_log(Event::DefaultAddressChanged {
                    customer_id,
                    address_id,
                })
                .await;
        }

        info!("Updated address {}", address_id);
        Ok(updated)
    }

    /// Removes an address; removing the default promotes the newest remaining one.
    #[instrument(skip(self))]
    pub async fn remove(&self, customer_id: Uuid, address_id: Uuid) -> Result<(), ServiceError> {
        let promoted = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let existing = find_owned(txn, customer_id, address_id).await?;
                Address::delete_by_id(address_id).exec(txn).await?;

                if !existing.is_default {
                    return Ok::<_, ServiceError>(None);
                }

                let successor = Address::find()
                    .filter(address::Column::CustomerId.eq(customer_id))
                    .order_by_desc(address::Column::CreatedAt)
                    .order_by_desc(address::Column::Id)
                    .one(txn)
                    .await?;

                match successor {
                    Some(next) => {
                        let next_id = next.id;
                        let mut active: address::ActiveModel = next.into();
                        active.is_default = Set(true);
                        active.updated_at = Set(Utc::now());
                        active.update(txn).await?;
                        Ok(Some(next_id))
                    }
                    None => Ok(None),
                }
            })
        })
        .await?;

        self.event_sender
            .send_or_log(Event::AddressDeleted {
                customer_id,
                address_id,
            })
            .await;
        if let Some(next_id) = promoted {
            self.event_sender
                .send_or_log(Event::DefaultAddressChanged {
                    customer_id,
                    address_id: next_id,
                })
                .await;
        }

        info!("Deleted address {}", address_id);
        Ok(())
    }
}

async fn find_owned<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    address_id: Uuid,
) -> Result<AddressModel, ServiceError> {
    let address = Address::find_by_id(address_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Address {} not found", address_id)))?;
    if address.customer_id != customer_id {
        return Err(ServiceError::Forbidden(format!(
            "Address {} belongs to another customer",
            address_id
        )));
    }
    Ok(address)
}

async fn clear_default<C: ConnectionTrait>(conn: &C, customer_id: Uuid) -> Result<(), ServiceError> {
    Address::update_many()
        .col_expr(address::Column::IsDefault, Expr::value(false))
        .col_expr(address::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(address::Column::CustomerId.eq(customer_id))
        .filter(address::Column::IsDefault.eq(true))
        .exec(conn)
        .await?;
    Ok(())
}

/// Input for creating an address
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateAddressInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: String,
    #[validate(length(min = 3, max = 32))]
    pub phone: String,
    #[validate(length(min = 1, max = 500))]
    pub address_line: String,
    #[validate(length(max = 100))]
    pub apartment: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub province: String,
    #[validate(length(min = 1, max = 100))]
    pub district: String,
    #[validate(length(min = 1, max = 100))]
    pub ward: String,
    #[validate(length(min = 2, max = 100))]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

/// Input for updating an address
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateAddressInput {
    #[validate(length(min = 1, max = 255))]
    pub full_name: Option<String>,
    #[validate(length(min = 3, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub address_line: Option<String>,
    #[validate(length(max = 100))]
    pub apartment: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub province: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub district: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub ward: Option<String>,
    #[validate(length(min = 2, max = 100))]
    pub country: Option<String>,
    pub is_default: Option<bool>,
}
