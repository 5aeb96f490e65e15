//! Write-side engine tests over the bookstore fixture
//!
//! Covers payload merging (nested to-one and to-many writes, ignored
//! fields, exception policies), validation and persistence, and destroy.

mod bookstore;

use bookstore::*;
use chrono::FixedOffset;
use model_api::core::MergeError;
use model_api::core::store::eq_predicate;
use model_api::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn zone() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).unwrap()
}

fn apply(
    store: &InMemoryStore,
    registry: &Registry,
    entity: &mut Record,
    payload: Value,
    ctx: &RequestContext,
) -> Result<IgnoredFields, MergeError> {
    let composer = QueryComposer::new(registry, store, zone());
    let mut engine = UpdateEngine::new(registry, store, composer);
    let mut ignored = IgnoredFields::new();
    let payload = payload.as_object().cloned().unwrap_or_default();
    engine.apply_updates(entity, &payload, ctx.operation, ctx, &mut ignored)?;
    Ok(ignored)
}

fn save(store: &InMemoryStore, registry: &Registry, entity: &mut Record, ctx: &RequestContext) -> SaveOutcome {
    Persistence::new(registry, store)
        .save(entity, ctx.operation, ctx, &SaveHooks::default())
        .unwrap()
}

/// Load a row with the associations a `ctx` request would render
fn load(store: &InMemoryStore, registry: &Registry, entity_type: &str, id: i64, ctx: &RequestContext) -> Record {
    let includes = registry
        .include_paths(entity_type, Operation::Show, ctx)
        .unwrap();
    store
        .all(entity_type)
        .unwrap()
        .filter(eq_predicate("id", ColumnType::Integer, &json!(id)))
        .include(&includes)
        .first()
        .unwrap()
        .unwrap_or_else(|| panic!("{} {} should exist", entity_type, id))
}

fn messages(outcome: &SaveOutcome) -> Vec<String> {
    outcome.errors.iter().map(|e| e.message.clone()).collect()
}

// ============================================================================
// Nested creates
// ============================================================================

mod create_tests {
    use super::*;

    #[test]
    fn test_create_with_nested_children() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut order = store.instantiate("order").unwrap();

        let ignored = apply(
            &store,
            &registry,
            &mut order,
            json!({
                "customer": "Grace",
                "items": [{"name": "Dune", "qty": 3}, {"name": "Solaris"}],
                "shippingAddress": {"city": "Paris", "street": "2 Rue Neuve"}
            }),
            &ctx,
        )
        .unwrap();
        assert!(ignored.is_empty());

        let outcome = save(&store, &registry, &mut order, &ctx);
        assert!(outcome.is_success(), "unexpected errors: {:?}", outcome.errors);
        assert_eq!(order.id(), Some(3));
        assert_eq!(order.field("status"), Some(json!("pending")));
        assert_eq!(store.len("order_item").unwrap(), 4);

        let stored = load(&store, &registry, "order", 3, &RequestContext::new(Operation::Show));
        let items = stored.to_many("items");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].field("qty"), Some(json!(3)));
        assert_eq!(items[1].field("qty"), Some(json!(1)));
        assert!(items.iter().all(|item| item.field("order_id") == Some(json!(3))));
        assert_eq!(
            stored.to_one("shipping_address").and_then(|a| a.field("city")),
            Some(json!("Paris"))
        );
    }

    #[test]
    fn test_nested_errors_are_path_qualified() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut order = store.instantiate("order").unwrap();
        apply(
            &store,
            &registry,
            &mut order,
            json!({
                "customer": "Grace",
                "items": [{"name": "Dune"}, {"qty": 2}],
                "shippingAddress": {"street": "nowhere"}
            }),
            &ctx,
        )
        .unwrap();

        let outcome = save(&store, &registry, &mut order, &ctx);
        assert_eq!(outcome.status, 400);
        let attributes: Vec<Option<String>> =
            outcome.errors.iter().map(|e| e.attribute.clone()).collect();
        assert_eq!(
            attributes,
            vec![
                Some("items[1].name".to_string()),
                Some("shippingAddress->city".to_string())
            ]
        );
        assert_eq!(messages(&outcome)[0], "items[1].name can't be blank");
        // nothing was written
        assert_eq!(store.len("order").unwrap(), 2);
        assert_eq!(store.len("order_item").unwrap(), 2);
    }

    #[test]
    fn test_unknown_and_read_only_keys_are_ignored() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut order = store.instantiate("order").unwrap();
        let ignored = apply(
            &store,
            &registry,
            &mut order,
            json!({"customer": "Grace", "bogus": "x", "status": "shipped"}),
            &ctx,
        )
        .unwrap();

        assert_eq!(ignored.to_value(), json!([{"bogus": "x"}, {"status": "shipped"}]));
        assert_eq!(order.field("status"), Some(Value::Null));
    }

    #[test]
    fn test_parse_transform_runs_before_write() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut book = store.instantiate("book").unwrap();
        apply(
            &store,
            &registry,
            &mut book,
            json!({"title": "  Ubik  ", "format": "EBOOK", "price": 6}),
            &ctx,
        )
        .unwrap();
        assert_eq!(book.field("title"), Some(json!("Ubik")));
        assert_eq!(book.field("format"), Some(json!("ebook")));
        assert!(save(&store, &registry, &mut book, &ctx).is_success());
        assert_eq!(book.field("in_print"), Some(json!(true)));
    }

    #[test]
    fn test_scope_is_written_onto_the_root() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create).with_scope("author_id", json!(3));
        let mut book = store.instantiate("book").unwrap();
        apply(&store, &registry, &mut book, json!({"title": "Fiasco", "price": 10}), &ctx).unwrap();
        assert_eq!(book.field("author_id"), Some(json!(3)));
    }

    #[test]
    fn test_admin_only_attributes_need_admin_authorship() {
        let (store, registry) = fixture();
        let payload = json!({"title": "Eden", "cost": 2.5});

        let anonymous = RequestContext::new(Operation::Create);
        let mut book = store.instantiate("book").unwrap();
        let ignored = apply(&store, &registry, &mut book, payload.clone(), &anonymous).unwrap();
        assert_eq!(ignored.to_value(), json!([{"cost": 2.5}]));
        assert_eq!(book.field("cost"), Some(Value::Null));

        let admin = RequestContext::new(Operation::Create).with_admin_user(true);
        let mut book = store.instantiate("book").unwrap();
        let ignored = apply(&store, &registry, &mut book, payload, &admin).unwrap();
        assert!(ignored.is_empty());
        assert_eq!(book.field("cost"), Some(json!(2.5)));
    }
}

// ============================================================================
// Exception policies and payload shapes
// ============================================================================

mod policy_tests {
    use super::*;

    #[test]
    fn test_mapped_setter_error_becomes_validation_error() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut book = store.instantiate("book").unwrap();
        apply(&store, &registry, &mut book, json!({"title": "Eden", "price": "cheap"}), &ctx).unwrap();

        let outcome = save(&store, &registry, &mut book, &ctx);
        assert_eq!(outcome.status, 400);
        assert_eq!(messages(&outcome), vec!["price must be a number"]);
    }

    #[test]
    fn test_unmapped_setter_error_escapes_with_its_path() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut order = store.instantiate("order").unwrap();
        let err = apply(
            &store,
            &registry,
            &mut order,
            json!({"customer": "Grace", "items": [{"name": "Dune", "qty": "lots"}]}),
            &ctx,
        )
        .unwrap_err();

        match err {
            MergeError::Unhandled { path, .. } => assert_eq!(path, "items[0].qty"),
            other => panic!("expected an unhandled setter error, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_association_shapes() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut order = store.instantiate("order").unwrap();
        apply(
            &store,
            &registry,
            &mut order,
            json!({"customer": "Grace", "items": "nope", "shippingAddress": ["x"]}),
            &ctx,
        )
        .unwrap();

        let outcome = save(&store, &registry, &mut order, &ctx);
        assert_eq!(
            messages(&outcome),
            vec![
                "items must be supplied as an array of objects",
                "shippingAddress must be supplied as an object"
            ]
        );
    }

    #[test]
    fn test_unique_columns() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let mut author = store.instantiate("author").unwrap();
        apply(
            &store,
            &registry,
            &mut author,
            json!({"name": "Impostor", "email": "FRANK@example.com"}),
            &ctx,
        )
        .unwrap();

        let outcome = save(&store, &registry, &mut author, &ctx);
        assert_eq!(messages(&outcome), vec!["email has already been taken"]);
    }
}

// ============================================================================
// Updates
// ============================================================================

mod update_tests {
    use super::*;

    #[test]
    fn test_children_matched_by_id_and_unmentioned_kept() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Update);
        let mut order = load(&store, &registry, "order", 1, &ctx);

        let ignored = apply(
            &store,
            &registry,
            &mut order,
            json!({"items": [{"id": 2, "qty": 5}, {"name": "Eden"}]}),
            &ctx,
        )
        .unwrap();
        // the read-only id is reported even though it matched the child
        assert_eq!(ignored.to_value(), json!([{"items[0]": [{"id": 2}]}]));

        assert!(save(&store, &registry, &mut order, &ctx).is_success());
        let stored = load(&store, &registry, "order", 1, &RequestContext::new(Operation::Show));
        let items: Vec<(Option<Value>, Option<Value>)> = stored
            .to_many("items")
            .iter()
            .map(|item| (item.field("name"), item.field("qty")))
            .collect();
        assert_eq!(
            items,
            vec![
                (Some(json!("Dune")), Some(json!(1))),
                (Some(json!("Solaris")), Some(json!(5))),
                (Some(json!("Eden")), Some(json!(1))),
            ]
        );
    }

    #[test]
    fn test_child_found_in_store_is_relinked() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Update);
        let mut order = load(&store, &registry, "order", 2, &ctx);
        apply(&store, &registry, &mut order, json!({"items": [{"id": 1, "qty": 4}]}), &ctx).unwrap();
        assert!(save(&store, &registry, &mut order, &ctx).is_success());

        let item = store.find("order_item", 1).unwrap().unwrap();
        assert_eq!(item.field("order_id"), Some(json!(2)));
        assert_eq!(item.field("qty"), Some(json!(4)));
    }

    #[test]
    fn test_existing_to_one_child_is_updated_in_place() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Update);
        let mut order = load(&store, &registry, "order", 1, &ctx);
        apply(&store, &registry, &mut order, json!({"shippingAddress": {"city": "Leeds"}}), &ctx).unwrap();
        assert!(save(&store, &registry, &mut order, &ctx).is_success());

        assert_eq!(store.len("address").unwrap(), 1);
        let address = store.find("address", 1).unwrap().unwrap();
        assert_eq!(address.field("city"), Some(json!("Leeds")));
        assert_eq!(address.field("street"), Some(json!("1 Main St")));
    }

    #[test]
    fn test_round_trip_is_idempotent() {
        let (store, registry) = fixture();
        let show = RequestContext::new(Operation::Show);
        let serializer = Serializer::new(&registry);
        let book = load(&store, &registry, "book", 1, &show);
        let before = serializer.serialize(&book, Operation::Show, &show).unwrap();

        let update = RequestContext::new(Operation::Update);
        let writable: Vec<String> = registry
            .resolve("book", Operation::Update, &update)
            .unwrap()
            .iter()
            .map(|attr| registry.external_name(attr))
            .collect();
        let payload: serde_json::Map<String, Value> = before
            .as_object()
            .unwrap()
            .iter()
            .filter(|(key, _)| writable.contains(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let mut book = load(&store, &registry, "book", 1, &update);
        let ignored = apply(&store, &registry, &mut book, Value::Object(payload), &update).unwrap();
        assert!(ignored.is_empty());
        assert!(save(&store, &registry, &mut book, &update).is_success());

        let after = serializer
            .serialize(&load(&store, &registry, "book", 1, &show), Operation::Show, &show)
            .unwrap();
        assert_eq!(after, before);
    }
}

// ============================================================================
// Hooks
// ============================================================================

mod hook_tests {
    use super::*;

    #[test]
    fn test_call_hooks_run_after_model_hooks() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let saves = Arc::new(AtomicUsize::new(0));
        let counter = saves.clone();
        let hooks = SaveHooks {
            before_create: Some(hook(|order, _| {
                // the model hook has already filled the status
                let status = order.field("status").unwrap_or(Value::Null);
                let _ = order.set_field("status", json!(format!("{}-checked", status.as_str().unwrap_or_default())));
            })),
            after_save: Some(hook(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..SaveHooks::default()
        };

        let mut order = store.instantiate("order").unwrap();
        apply(&store, &registry, &mut order, json!({"customer": "Grace"}), &ctx).unwrap();
        let outcome = Persistence::new(&registry, &store)
            .save(&mut order, Operation::Create, &ctx, &hooks)
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(order.field("status"), Some(json!("pending-checked")));
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_hook_errors_abort_the_save() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Create);
        let hooks = SaveHooks {
            before_save: Some(hook(|order, _| {
                order.add_error(ValidationErrors::BASE, "orders are closed");
            })),
            ..SaveHooks::default()
        };

        let mut order = store.instantiate("order").unwrap();
        apply(&store, &registry, &mut order, json!({"customer": "Grace"}), &ctx).unwrap();
        let outcome = Persistence::new(&registry, &store)
            .save(&mut order, Operation::Create, &ctx, &hooks)
            .unwrap();

        assert_eq!(outcome.status, 400);
        assert_eq!(messages(&outcome), vec!["orders are closed"]);
        assert_eq!(store.len("order").unwrap(), 2);
    }
}

// ============================================================================
// Destroy
// ============================================================================

mod destroy_tests {
    use super::*;

    #[test]
    fn test_destroy_validator_blocks() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Destroy);
        let mut book = load(&store, &registry, "book", 1, &ctx);
        let errors = Persistence::new(&registry, &store)
            .validate_read(&mut book, Operation::Destroy, &ctx)
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "cannot delete a book that is in print");
        assert!(errors[0].attribute.is_none());
    }

    #[test]
    fn test_soft_delete_keeps_the_row() {
        let (store, registry) = fixture();
        let ctx = RequestContext::new(Operation::Destroy);
        let mut book = load(&store, &registry, "book", 4, &ctx);
        let outcome = Persistence::new(&registry, &store)
            .destroy(&mut book, Operation::Destroy)
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(store.len("book").unwrap(), 6);
        let row = store.find("book", 4).unwrap().unwrap();
        assert_eq!(row.field("deleted"), Some(json!(true)));

        let composer = QueryComposer::new(&registry, &store, zone());
        let live = composer.base_query("book", &ctx).unwrap();
        assert_eq!(live.count().unwrap(), 4);
    }

    #[test]
    fn test_hard_delete_without_marker() {
        let (store, registry) = fixture();
        let mut item = store.find("order_item", 1).unwrap().unwrap();
        let outcome = Persistence::new(&registry, &store)
            .destroy(&mut item, Operation::Destroy)
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(store.len("order_item").unwrap(), 1);
        assert!(store.find("order_item", 1).unwrap().is_none());
    }

    #[test]
    fn test_unsaved_entity_reports_unspecified_error() {
        let (store, registry) = fixture();
        let mut item = store.instantiate("order_item").unwrap();
        let outcome = Persistence::new(&registry, &store)
            .destroy(&mut item, Operation::Destroy)
            .unwrap();

        assert_eq!(outcome.status, 500);
        assert_eq!(outcome.errors[0].error, "Unspecified error");
    }
}
