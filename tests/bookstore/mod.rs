//! Shared bookstore fixture: schema, metadata and seed data
//!
//! Authors write books; orders carry line items and a shipping address.
//! Seeded ids are deterministic (per table, starting at 1).

#![allow(dead_code)]

use axum_test::TestServer;
use model_api::core::transforms;
use model_api::core::{AttributeErrorKind, Naming};
use model_api::prelude::*;
use model_api::storage::validators;
use tracing_subscriber::EnvFilter;

pub fn schema() -> Schema {
    Schema::new()
        .table(
            TableSchema::new("author")
                .column(ColumnDef::new("name", ColumnType::Other).required())
                .column(
                    ColumnDef::new("email", ColumnType::Other)
                        .unique()
                        .validate_with(validators::email()),
                )
                .column(ColumnDef::new("country", ColumnType::Other))
                .association("books", AssociationInfo::has_many("book", "author_id")),
        )
        .table(
            TableSchema::new("book")
                .column(
                    ColumnDef::new("title", ColumnType::Other)
                        .required()
                        .validate_with(validators::string_length(1, 200)),
                )
                .column(ColumnDef::new("price", ColumnType::Decimal).validate_with(validators::positive()))
                .column(ColumnDef::new("in_print", ColumnType::Boolean).default_value(json!(true)))
                .column(ColumnDef::new("published_at", ColumnType::Date))
                .column(
                    ColumnDef::new("format", ColumnType::Other)
                        .validate_with(validators::in_list(["paperback", "hardcover", "ebook"])),
                )
                .column(ColumnDef::new("cost", ColumnType::Decimal))
                .column(ColumnDef::new("deleted", ColumnType::Boolean).default_value(json!(false)))
                .association("author", AssociationInfo::belongs_to("author", "author_id")),
        )
        .table(
            TableSchema::new("order")
                .column(ColumnDef::new("customer", ColumnType::Other).required())
                .column(ColumnDef::new("status", ColumnType::Other))
                .association("items", AssociationInfo::has_many("order_item", "order_id"))
                .association(
                    "shipping_address",
                    AssociationInfo::has_one("address", "order_id"),
                ),
        )
        .table(
            TableSchema::new("order_item")
                .column(ColumnDef::new("name", ColumnType::Other).required())
                .column(
                    ColumnDef::new("qty", ColumnType::Integer)
                        .default_value(json!(1))
                        .validate_with(validators::positive()),
                )
                .association("order", AssociationInfo::belongs_to("order", "order_id")),
        )
        .table(
            TableSchema::new("address")
                .column(ColumnDef::new("city", ColumnType::Other).required())
                .column(ColumnDef::new("street", ColumnType::Other))
                .association("order", AssociationInfo::belongs_to("order", "order_id")),
        )
}

pub fn registry_builder() -> RegistryBuilder {
    Registry::builder()
        .naming(Naming::default())
        // === Authors ===
        .model(ModelMetadata::new("author").link("books", "/books?author_id={id}"))
        .attributes(
            "author",
            vec![
                AttributeMetadata::new("id").id().read_only().filterable().sortable(),
                AttributeMetadata::new("name").filterable().sortable(),
                AttributeMetadata::new("email")
                    .filterable()
                    .parse(transforms::lowercase()),
                AttributeMetadata::new("country").filterable().sortable(),
                AttributeMetadata::new("books")
                    .read_only()
                    .only([Operation::Show])
                    .nested_attributes(["id", "title"]),
            ],
        )
        // === Books ===
        .model(
            ModelMetadata::new("book")
                .soft_delete("deleted")
                .link("author", "/authors/{author_id}")
                .validate_on(
                    Operation::Destroy,
                    hook(|book, _| {
                        if book.field("in_print") == Some(json!(true)) {
                            book.add_error(ValidationErrors::BASE, "cannot delete a book that is in print");
                        }
                    }),
                ),
        )
        .attributes(
            "book",
            vec![
                AttributeMetadata::new("id").id().read_only().filterable().sortable(),
                AttributeMetadata::new("title")
                    .filterable()
                    .sortable()
                    .parse(transforms::trim()),
                AttributeMetadata::new("price")
                    .filterable()
                    .sortable()
                    .on_exception(
                        ErrorMatcher::Kind(AttributeErrorKind::TypeMismatch),
                        ExceptionHandler::Message("must be a number".to_string()),
                    ),
                AttributeMetadata::new("in_print").alias("available").filterable(),
                AttributeMetadata::new("published_at").filterable().sortable(),
                AttributeMetadata::new("format")
                    .filterable()
                    .parse(transforms::lowercase()),
                AttributeMetadata::new("cost").admin_only().filterable(),
                AttributeMetadata::new("author_id").filterable().hide_when_null(),
                AttributeMetadata::new("author")
                    .read_only()
                    .filterable()
                    .sortable()
                    .except([Operation::Index])
                    .nested_attributes(["id", "name"]),
                AttributeMetadata::computed("display_title", |book, _| {
                    let title = book.field("title").unwrap_or(Value::Null);
                    json!(title.as_str().unwrap_or_default().to_uppercase())
                })
                .filterable()
                .sortable(),
            ],
        )
        // === Orders ===
        .model(
            ModelMetadata::new("order")
                .before_create(hook(|order, _| {
                    if order.field("status").is_none_or(|status| status.is_null()) {
                        let _ = order.set_field("status", json!("pending"));
                    }
                }))
                .validate_on(
                    Operation::Show,
                    hook(|order, ctx| {
                        if order.field("customer") == Some(json!("restricted")) && !ctx.admin {
                            order.add_error(ValidationErrors::BASE, "order is restricted to administrators");
                        }
                    }),
                ),
        )
        .attributes(
            "order",
            vec![
                AttributeMetadata::new("id").id().read_only().filterable().sortable(),
                AttributeMetadata::new("customer").filterable().sortable(),
                AttributeMetadata::new("status").read_only().filterable(),
                AttributeMetadata::new("items"),
                AttributeMetadata::new("shipping_address"),
            ],
        )
        .model(ModelMetadata::new("order_item"))
        .attributes(
            "order_item",
            vec![
                AttributeMetadata::new("id").id().read_only(),
                AttributeMetadata::new("name").filterable(),
                AttributeMetadata::new("qty"),
            ],
        )
        .model(ModelMetadata::new("address").plural("addresses"))
        .attributes(
            "address",
            vec![
                AttributeMetadata::new("id").id().read_only(),
                AttributeMetadata::new("city").filterable(),
                AttributeMetadata::new("street"),
            ],
        )
}

pub fn registry(store: &InMemoryStore) -> Registry {
    registry_builder()
        .build_with(store)
        .expect("bookstore registry should build")
}

/// A store holding three authors, six books (one soft-deleted) and two
/// orders
pub fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new(schema());
    seed(&store).expect("seed data should insert");
    store
}

fn seed(store: &InMemoryStore) -> Result<()> {
    // Authors 1..=3
    store.insert("author", json!({"name": "Frank Herbert", "email": "frank@example.com", "country": "US"}))?;
    store.insert("author", json!({"name": "Ursula K. Le Guin", "email": "ursula@example.com", "country": "US"}))?;
    store.insert("author", json!({"name": "Stanislaw Lem", "email": "lem@example.com", "country": "PL"}))?;

    // Books 1..=6
    store.insert("book", json!({
        "title": "Dune", "price": 9.99, "in_print": true, "published_at": "1965-08-01",
        "format": "paperback", "cost": 3.5, "author_id": 1
    }))?;
    store.insert("book", json!({
        "title": "Children of Dune", "price": 12.5, "in_print": true, "published_at": "1976-04-01",
        "format": "hardcover", "cost": 5.0, "author_id": 1
    }))?;
    store.insert("book", json!({
        "title": "The Left Hand of Darkness", "price": 8.75, "in_print": true,
        "published_at": "1969-03-01", "format": "paperback", "author_id": 2
    }))?;
    store.insert("book", json!({
        "title": "The Dispossessed", "price": 11.0, "in_print": false,
        "published_at": "1974-05-01", "format": "ebook", "author_id": 2
    }))?;
    store.insert("book", json!({
        "title": "Solaris", "price": 7.5, "in_print": false, "published_at": "1961-06-01",
        "format": "paperback", "author_id": 3
    }))?;
    store.insert("book", json!({
        "title": "Lost Manuscript", "price": 20.0, "in_print": false, "deleted": true, "author_id": 3
    }))?;

    // Orders 1..=2, items 1..=2, address 1
    store.insert("order", json!({"customer": "Ada", "status": "open"}))?;
    store.insert("order", json!({"customer": "restricted", "status": "open"}))?;
    store.insert("order_item", json!({"name": "Dune", "qty": 1, "order_id": 1}))?;
    store.insert("order_item", json!({"name": "Solaris", "qty": 2, "order_id": 1}))?;
    store.insert("address", json!({"city": "London", "street": "1 Main St", "order_id": 1}))?;
    Ok(())
}

/// Seeded store plus its registry
pub fn fixture() -> (InMemoryStore, Registry) {
    let store = seeded_store();
    let registry = registry(&store);
    (store, registry)
}

/// Serve the seeded bookstore with header-based authentication
pub fn server() -> TestServer {
    server_with(ApiConfig::default())
}

/// Route engine logs to the test harness; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn server_with(config: ApiConfig) -> TestServer {
    init_tracing();
    let (store, registry) = fixture();
    let app = ApiBuilder::new()
        .with_store(store)
        .with_registry(registry)
        .with_config(config)
        .with_auth_provider(HeaderAuthProvider)
        .build()
        .expect("bookstore app should build");
    TestServer::try_new(app).expect("Failed to create test server")
}

/// Header value identifying an admin caller
pub const ADMIN_ID: &str = "6f1c2b8e-1d2a-4c3b-9e4f-5a6b7c8d9e0f";
