/// HTTP server factory and configuration.
/// Provides a reusable function to create and configure the HTTP server
/// for use in both the main binary and tests.

use crate::handlers::{
    add_conversation, create_profile, delete_call_entry, get_call_history, get_profile, health,
    list_conversations, list_messages, record_call, remove_conversation, search_users,
    send_message, update_profile,
};
use crate::store::StorePool;
use actix_web::{middleware, web, App, HttpServer};

/// Register every directory route on a service config
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/conversations", web::get().to(list_conversations))
        .route("/conversations", web::post().to(add_conversation))
        .route("/conversations/{id}", web::delete().to(remove_conversation))
        .route("/conversations/{id}/messages", web::get().to(list_messages))
        .route("/conversations/{id}/messages", web::post().to(send_message))
        .route("/calls", web::get().to(get_call_history))
        .route("/calls", web::post().to(record_call))
        .route("/calls/{id}", web::delete().to(delete_call_entry))
        .route("/profiles/{principal}", web::get().to(get_profile))
        .route("/profile", web::post().to(create_profile))
        .route("/profile", web::patch().to(update_profile))
        .route("/users/search", web::get().to(search_users));
}

/// Create a configured HTTP server
///
/// Takes the store pool and bind address, then returns a fully configured
/// `HttpServer` ready to be run.
///
/// # Example
/// ```ignore
/// let pool = web::Data::new(store::create_pool());
/// let server = server::create_http_server(pool, "127.0.0.1:4000")?;
/// server.await?;
/// ```
pub fn create_http_server(
    pool: web::Data<StorePool>,
    bind_addr: &str,
) -> std::io::Result<actix_web::dev::Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .bind(bind_addr)?
    .run();

    Ok(server)
}

/// Create a test HTTP server with an empty in-memory store
///
/// Binds to a random available port.
///
/// # Returns
/// A tuple of (server, bind_address) where bind_address can be used to make requests
#[cfg(any(test, feature = "test_utils"))]
pub fn create_test_http_server() -> std::io::Result<(actix_web::dev::Server, String)> {
    let pool = web::Data::new(crate::store::create_pool());

    let server = HttpServer::new(move || {
        App::new()
            .app_data(pool.clone())
            .wrap(middleware::Logger::default())
            .configure(configure_routes)
    })
    .workers(1)
    .bind("127.0.0.1:0")?;

    // Get the actual bind address (including the assigned port)
    let addr_str = server
        .addrs()
        .first()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "No bind address found"))?
        .to_string();

    Ok((server.run(), addr_str))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::PRINCIPAL_HEADER;
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(crate::store::create_pool()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_health_endpoint() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_missing_principal_is_unauthorized() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/conversations").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Unauthorized"));
    }

    #[actix_web::test]
    async fn test_duplicate_conversation_conflict() {
        let app = test_app!();

        let req = test::TestRequest::post()
            .uri("/conversations")
            .insert_header((PRINCIPAL_HEADER, "p1"))
            .set_json(json!({ "conversation_id": "p1:p2" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri("/conversations")
            .insert_header((PRINCIPAL_HEADER, "p2"))
            .set_json(json!({ "conversation_id": "p1:p2" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Conversation already exists");
    }

    #[actix_web::test]
    async fn test_missing_profile_is_null() {
        let app = test_app!();
        let req = test::TestRequest::get().uri("/profiles/nobody").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let body: Value = test::read_body_json(resp).await;
        assert!(body.is_null());
    }

    #[actix_web::test]
    async fn test_send_and_list_messages() {
        let app = test_app!();

        let req = test::TestRequest::post()
            .uri("/conversations")
            .insert_header((PRINCIPAL_HEADER, "p1"))
            .set_json(json!({ "conversation_id": "p1:p2" }))
            .to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::post()
            .uri("/conversations/p1:p2/messages")
            .insert_header((PRINCIPAL_HEADER, "p2"))
            .set_json(json!({ "sender": "p2", "text": "hello" }))
            .to_request();
        let reply: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(reply["message_id"], 1);

        let req = test::TestRequest::get()
            .uri("/conversations/p1:p2/messages")
            .insert_header((PRINCIPAL_HEADER, "p1"))
            .to_request();
        let messages: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(messages.as_array().unwrap().len(), 1);
        assert_eq!(messages[0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_create_http_server_invalid_address() {
        let pool = web::Data::new(crate::store::create_pool());
        let result = create_http_server(pool, "invalid_address:99999");
        assert!(result.is_err(), "create_http_server should fail with invalid address");
    }

    #[tokio::test]
    async fn test_create_test_http_server() {
        let (_server, addr) = create_test_http_server().expect("server creation should succeed");
        assert!(addr.contains("127.0.0.1:"), "Address should contain 127.0.0.1:");
    }
}
