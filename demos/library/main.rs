//! Library service demo
//!
//! Serves authors and books from the in-memory store:
//!
//! ```text
//! cargo run --example library
//! curl 'http://127.0.0.1:3000/books?price=>=10&sort_by=title_desc'
//! curl -X POST http://127.0.0.1:3000/books -d '{"title": "Ubik", "price": 6.5, "authorId": 2}'
//! ```
//!
//! Set `MODEL_API_CONFIG` to a YAML file to override the defaults.

use anyhow::Result;
use model_api::core::transforms;
use model_api::prelude::*;
use model_api::storage::validators;
use tracing_subscriber::EnvFilter;

fn schema() -> Schema {
    Schema::new()
        .table(
            TableSchema::new("author")
                .column(ColumnDef::new("name", ColumnType::Other).required())
                .column(ColumnDef::new("born_on", ColumnType::Date))
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
                .column(ColumnDef::new("archived", ColumnType::Boolean).default_value(json!(false)))
                .association("author", AssociationInfo::belongs_to("author", "author_id")),
        )
}

fn registry(store: &InMemoryStore) -> Result<Registry> {
    let registry = Registry::builder()
        .model(ModelMetadata::new("author").link("books", "/books?author_id={id}"))
        .attributes(
            "author",
            vec![
                AttributeMetadata::new("id").id().read_only().filterable().sortable(),
                AttributeMetadata::new("name").filterable().sortable(),
                AttributeMetadata::new("born_on").filterable().sortable(),
                AttributeMetadata::new("books")
                    .read_only()
                    .only([Operation::Show])
                    .nested_attributes(["id", "title"]),
            ],
        )
        .model(ModelMetadata::new("book").soft_delete("archived"))
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
                    .parse(transforms::round_decimals(2)),
                AttributeMetadata::new("author_id").filterable(),
                AttributeMetadata::new("author")
                    .read_only()
                    .filterable()
                    .sortable()
                    .nested_attributes(["id", "name"]),
            ],
        )
        .build_with(store)?;
    Ok(registry)
}

fn populate(store: &InMemoryStore) -> Result<()> {
    store.insert("author", json!({"name": "Octavia E. Butler", "born_on": "1947-06-22"}))?;
    store.insert("author", json!({"name": "Philip K. Dick", "born_on": "1928-12-16"}))?;
    store.insert("book", json!({"title": "Kindred", "price": 11.99, "author_id": 1}))?;
    store.insert("book", json!({"title": "Parable of the Sower", "price": 13.5, "author_id": 1}))?;
    store.insert("book", json!({"title": "A Scanner Darkly", "price": 9.25, "author_id": 2}))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let store = InMemoryStore::new(schema());
    populate(&store)?;
    let registry = registry(&store)?;

    let mut builder = ApiBuilder::new()
        .with_store(store)
        .with_registry(registry)
        .with_auth_provider(HeaderAuthProvider);
    if let Ok(path) = std::env::var("MODEL_API_CONFIG") {
        builder = builder.with_config_file(&path)?;
    }

    builder.serve("127.0.0.1:3000").await
}
