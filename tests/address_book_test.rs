mod common;

use assert_matches::assert_matches;
use chrono::Utc;
use common::TestApp;
use sea_orm::{ActiveModelTrait, Set, SqlErr};
use storefront_api::{
    entities::{address, AddressModel},
    errors::ServiceError,
    services::addresses::{CreateAddressInput, UpdateAddressInput},
};
use uuid::Uuid;

fn address(label: &str, is_default: bool) -> CreateAddressInput {
    CreateAddressInput {
        full_name: format!("Customer {}", label),
        phone: "0901234567".to_string(),
        address_line: format!("{} Nguyen Hue", label),
        apartment: None,
        province: "Ho Chi Minh".to_string(),
        district: "District 1".to_string(),
        ward: "Ben Nghe".to_string(),
        country: "VN".to_string(),
        is_default,
    }
}

fn defaults(addresses: &[AddressModel]) -> Vec<Uuid> {
    addresses
        .iter()
        .filter(|a| a.is_default)
        .map(|a| a.id)
        .collect()
}

#[tokio::test]
async fn first_address_becomes_default() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    let first = book.create(customer, address("1", false)).await.unwrap();
    assert!(first.is_default);

    let second = book.create(customer, address("2", false)).await.unwrap();
    assert!(!second.is_default);

    let listed = book.list(customer).await.unwrap();
    assert_eq!(defaults(&listed), vec![first.id]);
    assert_eq!(listed[0].id, first.id);
}

#[tokio::test]
async fn creating_a_default_moves_the_flag() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    book.create(customer, address("1", false)).await.unwrap();
    let second = book.create(customer, address("2", true)).await.unwrap();

    let listed = book.list(customer).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(defaults(&listed), vec![second.id]);
}

#[tokio::test]
async fn update_can_make_an_address_default() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    let first = book.create(customer, address("1", false)).await.unwrap();
    let second = book.create(customer, address("2", false)).await.unwrap();

    let updated = book
        .update(
            customer,
            second.id,
            UpdateAddressInput {
                is_default: Some(true),
                phone: Some("0987654321".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.is_default);
    assert_eq!(updated.phone, "0987654321");

    let listed = book.list(customer).await.unwrap();
    assert_eq!(defaults(&listed), vec![second.id]);
    assert!(!book.get(customer, first.id).await.unwrap().is_default);
}

#[tokio::test]
async fn unsetting_the_default_is_rejected() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    let only = book.create(customer, address("1", false)).await.unwrap();
    let err = book
        .update(
            customer,
            only.id,
            UpdateAddressInput {
                is_default: Some(false),
                full_name: Some("Renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let stored = book.get(customer, only.id).await.unwrap();
    assert!(stored.is_default);
    assert_eq!(stored.full_name, only.full_name);
}

#[tokio::test]
async fn removing_the_default_promotes_the_newest_remaining() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    let first = book.create(customer, address("1", false)).await.unwrap();
    let second = book.create(customer, address("2", false)).await.unwrap();
    let third = book.create(customer, address("3", false)).await.unwrap();
    assert!(first.is_default);

    book.remove(customer, first.id).await.unwrap();

    let listed = book.list(customer).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(defaults(&listed), vec![third.id]);
    assert!(listed.iter().any(|a| a.id == second.id));
}

#[tokio::test]
async fn removing_the_last_address_leaves_an_empty_book() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();

    let only = book.create(customer, address("1", false)).await.unwrap();
    book.remove(customer, only.id).await.unwrap();

    assert!(book.list(customer).await.unwrap().is_empty());
    let next = book.create(customer, address("2", false)).await.unwrap();
    assert!(next.is_default);
}

#[tokio::test]
async fn addresses_of_other_customers_are_forbidden() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();

    let owned = book.create(owner, address("1", false)).await.unwrap();

    assert_matches!(
        book.get(stranger, owned.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        book.remove(stranger, owned.id).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        book.get(owner, Uuid::new_v4()).await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(book.list(owner).await.unwrap().len(), 1);
}

#[tokio::test]
async fn defaults_are_tracked_per_customer() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    let a = book.create(alice, address("a", false)).await.unwrap();
    let b = book.create(bob, address("b", true)).await.unwrap();

    assert!(a.is_default);
    assert!(b.is_default);
    assert_eq!(defaults(&book.list(alice).await.unwrap()), vec![a.id]);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let mut input = address("1", false);
    input.full_name = String::new();

    assert_matches!(
        book.create(Uuid::new_v4(), input).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn store_refuses_a_second_default_for_one_customer() {
    let app = TestApp::new().await;
    let book = &app.state.services.address_book;
    let customer = Uuid::new_v4();
    let existing = book.create(customer, address("1", false)).await.unwrap();
    assert!(existing.is_default);

    // A writer that skipped the service rules.
    let now = Utc::now();
    let stray = address::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer),
        full_name: Set("Stray".to_string()),
        phone: Set("0901234567".to_string()),
        address_line: Set("2 Nguyen Hue".to_string()),
        apartment: Set(None),
        province: Set("Ho Chi Minh".to_string()),
        district: Set("District 1".to_string()),
        ward: Set("Ben Nghe".to_string()),
        country: Set("VN".to_string()),
        is_default: Set(true),
        created_at: Set(now),
        updated_at: Set(now),
    };
    let err = stray.insert(app.db()).await.unwrap_err();
    assert_matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)));
    assert_matches!(ServiceError::from(err), ServiceError::Conflict(_));

    assert_eq!(defaults(&book.list(customer).await.unwrap()), vec![existing.id]);
}
