//! REST exposure tests: the bookstore served through axum-test

mod bookstore;

use axum::http::header::LOCATION;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use bookstore::*;
use model_api::prelude::*;

fn admin_headers() -> [(HeaderName, HeaderValue); 2] {
    [
        (HeaderName::from_static("x-user-id"), HeaderValue::from_static(ADMIN_ID)),
        (HeaderName::from_static("x-user-roles"), HeaderValue::from_static("editor, admin")),
    ]
}

fn titles(body: &Value) -> Vec<&str> {
    body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|book| book["title"].as_str().unwrap())
        .collect()
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_routes() {
    let server = server();
    for path in ["/health", "/healthz"] {
        let response = server.get(path).await;
        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({"status": "ok", "service": "model-api"})
        );
    }
}

// ============================================================================
// List
// ============================================================================

mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_envelope() {
        let server = server();
        let response = server.get("/books").await;
        response.assert_status_ok();
        assert_eq!(response.header("x-total-count"), "5");

        let body = response.json::<Value>();
        assert_eq!(body["successful"], json!(true));
        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["statusCode"], json!(200));
        assert_eq!(body["count"], json!(5));
        assert_eq!(body["page"], json!(1));
        assert_eq!(body["pageCount"], json!(1));
        assert_eq!(body["pageSize"], json!(100));

        let first = &body["books"][0];
        assert_eq!(first["title"], json!("Dune"));
        assert_eq!(first["available"], json!(true));
        assert_eq!(first["displayTitle"], json!("DUNE"));
        // excluded from the index and admin-only respectively
        assert!(first.get("author").is_none());
        assert!(first.get("cost").is_none());
        assert_eq!(
            first["_links"],
            json!([
                {"rel": "self", "href": "/books/1"},
                {"rel": "author", "href": "/authors/1"}
            ])
        );
    }

    #[tokio::test]
    async fn test_filter_and_sort() {
        let server = server();
        let response = server
            .get("/books")
            .add_query_param("format", "paperback")
            .add_query_param("sort_by", "price_desc")
            .await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(
            titles(&body),
            vec!["Dune", "The Left Hand of Darkness", "Solaris"]
        );
        assert_eq!(
            body["_links"][0],
            json!({
                "rel": "first",
                "href": "/books?format=paperback&sort_by=price_desc&page=1&page_size=100"
            })
        );
    }

    #[tokio::test]
    async fn test_association_filter() {
        let server = server();
        let response = server
            .get("/books")
            .add_query_param("author.country", "PL")
            .await;
        response.assert_status_ok();
        assert_eq!(titles(&response.json::<Value>()), vec!["Solaris"]);
    }

    #[tokio::test]
    async fn test_paging_links() {
        let server = server();
        let response = server
            .get("/books")
            .add_query_param("sort_by", "id")
            .add_query_param("page", 2)
            .add_query_param("page_size", 2)
            .await;
        response.assert_status_ok();
        assert_eq!(response.header("x-total-count"), "5");

        let body = response.json::<Value>();
        assert_eq!(body["pageCount"], json!(3));
        let ids: Vec<&Value> = body["books"].as_array().unwrap().iter().map(|b| &b["id"]).collect();
        assert_eq!(ids, vec![&json!(3), &json!(4)]);

        let rels: Vec<&str> = body["_links"]
            .as_array()
            .unwrap()
            .iter()
            .map(|link| link["rel"].as_str().unwrap())
            .collect();
        assert_eq!(rels, vec!["first", "prev", "next", "last"]);
        assert_eq!(body["_links"][3]["href"], json!("/books?sort_by=id&page=3&page_size=2"));
    }

    #[tokio::test]
    async fn test_page_size_cap_and_links_prefix() {
        let server = server_with(ApiConfig {
            max_page_size: Some(2),
            links_prefix: "/api".to_string(),
            ..ApiConfig::default()
        });
        let response = server.get("/books").add_query_param("page_size", 50).await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["pageSize"], json!(2));
        assert_eq!(body["books"].as_array().unwrap().len(), 2);
        assert_eq!(body["books"][0]["_links"][0]["href"], json!("/api/books/1"));
        assert_eq!(body["_links"][0]["href"], json!("/api/books?page=1&page_size=2"));
    }

    #[tokio::test]
    async fn test_invalid_filter_value() {
        let server = server();
        let response = server.get("/books").add_query_param("price", "abc").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["successful"], json!(false));
    }

    #[tokio::test]
    async fn test_invalid_page_number() {
        let server = server();
        let response = server.get("/books").add_query_param("page", "two").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_resource() {
        let server = server();
        let response = server.get("/widgets").await;
        response.assert_status_not_found();
        assert_eq!(response.json::<Value>()["errors"][0]["attribute"], json!("resource"));
    }
}

// ============================================================================
// Show
// ============================================================================

mod show_tests {
    use super::*;

    #[tokio::test]
    async fn test_show() {
        let server = server();
        let response = server.get("/books/1").await;
        response.assert_status_ok();

        let book = &response.json::<Value>()["book"];
        assert_eq!(book["title"], json!("Dune"));
        assert_eq!(book["author"], json!({"id": 1, "name": "Frank Herbert"}));
        assert!(book.get("cost").is_none());
    }

    #[tokio::test]
    async fn test_admin_sees_admin_only_attributes() {
        let server = server();
        let mut request = server.get("/books/1");
        for (name, value) in admin_headers() {
            request = request.add_header(name, value);
        }
        let response = request.await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["book"]["cost"], json!(3.5));
    }

    #[tokio::test]
    async fn test_missing_and_soft_deleted_are_not_found() {
        let server = server();
        for path in ["/books/99", "/books/6"] {
            let response = server.get(path).await;
            response.assert_status_not_found();
            let body = response.json::<Value>();
            assert_eq!(body["status"], json!("not_found"));
            assert_eq!(body["statusCode"], json!(404));
            assert_eq!(body["errors"][0]["attribute"], json!("id"));
            assert_eq!(body["errors"][0]["error"], json!("No resource found"));
        }
    }

    #[tokio::test]
    async fn test_show_validator() {
        let server = server();
        let response = server.get("/orders/2").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["errors"][0]["message"],
            json!("order is restricted to administrators")
        );

        let mut request = server.get("/orders/2");
        for (name, value) in admin_headers() {
            request = request.add_header(name, value);
        }
        let response = request.await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["order"]["customer"], json!("restricted"));
    }

    #[tokio::test]
    async fn test_nested_associations_rendered() {
        let server = server();
        let response = server.get("/orders/1").await;
        response.assert_status_ok();

        let order = &response.json::<Value>()["order"];
        assert_eq!(order["items"].as_array().unwrap().len(), 2);
        assert!(order["items"][0].get("orderId").is_none());
        assert_eq!(order["shippingAddress"]["city"], json!("London"));
    }

    #[tokio::test]
    async fn test_invalid_user_header() {
        let server = server();
        let response = server
            .get("/books/1")
            .add_header(HeaderName::from_static("x-user-id"), HeaderValue::from_static("not-a-uuid"))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

// ============================================================================
// Create / update / destroy
// ============================================================================

mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_create() {
        let server = server();
        let response = server
            .post("/books")
            .json(&json!({"title": "Ubik", "price": 6.5, "format": "ebook", "authorId": 3}))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header(LOCATION), "/books/7");

        let body = response.json::<Value>();
        assert_eq!(body["status"], json!("created"));
        assert_eq!(body["book"]["id"], json!(7));
        assert_eq!(body["book"]["author"], json!({"id": 3, "name": "Stanislaw Lem"}));
        assert!(body.get("ignoredFields").is_none());

        server.get("/books/7").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_create_nested() {
        let server = server();
        let response = server
            .post("/orders")
            .json(&json!({
                "customer": "Grace",
                "items": [{"name": "Dune", "qty": 2}],
                "shippingAddress": {"city": "Paris"}
            }))
            .await;
        response.assert_status(StatusCode::CREATED);

        let order = &response.json::<Value>()["order"];
        assert_eq!(order["status"], json!("pending"));
        assert_eq!(order["items"][0]["qty"], json!(2));
        assert_eq!(order["shippingAddress"]["city"], json!("Paris"));
    }

    #[tokio::test]
    async fn test_failed_create_echoes_payload() {
        let server = server();
        let payload = json!({"price": -1, "bogus": true});
        let response = server.post("/books").json(&payload).await;
        response.assert_status(StatusCode::BAD_REQUEST);

        let body = response.json::<Value>();
        assert_eq!(body["successful"], json!(false));
        let messages: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["message"].as_str().unwrap())
            .collect();
        assert_eq!(messages, vec!["title can't be blank", "price must be positive"]);
        assert_eq!(body["book"], payload);
        assert_eq!(body["ignoredFields"], json!([{"bogus": true}]));
    }

    #[tokio::test]
    async fn test_nested_error_paths() {
        let server = server();
        let response = server
            .post("/orders")
            .json(&json!({"customer": "Grace", "items": [{"name": "Dune"}, {"qty": 1}]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["errors"][0]["attribute"],
            json!("items[1].name")
        );
    }

    #[tokio::test]
    async fn test_update_reports_ignored_fields() {
        let server = server();
        let response = server
            .put("/books/1")
            .json(&json!({"title": "Dune (Deluxe)", "bogus": 1, "displayTitle": "X"}))
            .await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["book"]["title"], json!("Dune (Deluxe)"));
        assert_eq!(body["book"]["displayTitle"], json!("DUNE (DELUXE)"));
        assert_eq!(body["ignoredFields"], json!([{"bogus": 1}, {"displayTitle": "X"}]));
        assert!(response.headers().get(LOCATION).is_none());
    }

    #[tokio::test]
    async fn test_patch_nested_child() {
        let server = server();
        let response = server
            .patch("/orders/1")
            .json(&json!({"items": [{"id": 1, "qty": 7}]}))
            .await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["order"]["items"][0]["qty"], json!(7));
        assert_eq!(body["order"]["items"][1]["name"], json!("Solaris"));
        assert_eq!(body["ignoredFields"], json!([{"items[0]": [{"id": 1}]}]));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let server = server();
        let response = server.put("/books/99").json(&json!({"title": "X"})).await;
        response.assert_status_not_found();
    }

    #[tokio::test]
    async fn test_destroy() {
        let server = server();
        let response = server.delete("/books/4").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["book"]["title"], json!("The Dispossessed"));

        server.get("/books/4").await.assert_status_not_found();
        let list = server.get("/books").await;
        assert_eq!(list.header("x-total-count"), "4");
    }

    #[tokio::test]
    async fn test_destroy_validator_blocks() {
        let server = server();
        let response = server.delete("/books/1").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["errors"][0]["message"],
            json!("cannot delete a book that is in print")
        );
        server.get("/books/1").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_successful_writes_render_no_message_lists() {
        let server = server();
        let created = server
            .post("/books")
            .json(&json!({"title": "Ubik", "price": 6.5, "authorId": 3}))
            .await
            .json::<Value>();
        let updated = server
            .patch("/books/7")
            .json(&json!({"price": 7.0}))
            .await
            .json::<Value>();
        let destroyed = server.delete("/books/4").await.json::<Value>();

        for body in [&created, &updated, &destroyed] {
            let keys: Vec<&str> = body
                .as_object()
                .unwrap()
                .keys()
                .map(String::as_str)
                .collect();
            assert_eq!(keys, vec!["successful", "status", "statusCode", "book"]);
        }
    }
}

// ============================================================================
// Payload decoding
// ============================================================================

mod payload_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_body() {
        let server = server();
        let response = server.post("/books").text("").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["errors"][0]["error"],
            json!("Missing/invalid request body (payload)")
        );
    }

    #[tokio::test]
    async fn test_collection_body() {
        let server = server();
        let response = server.post("/books").json(&json!([{"title": "Ubik"}])).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>()["errors"][0]["message"],
            json!("Expected object, but collection provided")
        );
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let server = server();
        let response = server.put("/books/1").text("{\"title\": ").await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }
}
