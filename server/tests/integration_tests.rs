/// Integration tests for the directory store
/// Tests the business rules and the exact rejection messages through
/// direct store calls
use duochat_server::store::models::{CallType, RecordCallRequest};
use duochat_server::store::{create_pool, Directory};
use duochat_server::StoreError;

#[tokio::test]
async fn test_conversation_lifecycle() {
    let pool = create_pool();

    Directory::add_conversation(&pool, "p1", "p1:p2")
        .await
        .expect("Failed to add conversation");

    // The other side sees it too, and re-adding it is rejected
    let err = Directory::add_conversation(&pool, "p2", "p1:p2")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Conversation already exists");

    // Only the originator may remove it
    let err = Directory::remove_conversation(&pool, "p2", "p1:p2")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("started"));

    Directory::remove_conversation(&pool, "p1", "p1:p2")
        .await
        .expect("Originator should remove the conversation");
    assert!(Directory::list_conversations(&pool, "p1")
        .await
        .unwrap()
        .is_empty());
    assert!(Directory::list_conversations(&pool, "p2")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_remove_without_conversations() {
    let pool = create_pool();
    let err = Directory::remove_conversation(&pool, "p1", "p1:p2")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("No conversations"));

    Directory::add_conversation(&pool, "p1", "p1:p3").await.unwrap();
    let err = Directory::remove_conversation(&pool, "p1", "p1:p2")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Conversation not found");
}

#[tokio::test]
async fn test_add_conversation_for_foreign_pairing() {
    let pool = create_pool();
    let err = Directory::add_conversation(&pool, "p9", "p1:p2")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)));
    assert!(err.to_string().starts_with("Unauthorized"));
}

#[tokio::test]
async fn test_message_ids_increase_per_conversation() {
    let pool = create_pool();
    Directory::add_conversation(&pool, "p1", "p1:p2").await.unwrap();
    Directory::add_conversation(&pool, "p1", "p1:p3").await.unwrap();

    let first = Directory::send_message(&pool, "p1", "p1:p2", "p1", "one")
        .await
        .unwrap();
    let second = Directory::send_message(&pool, "p2", "p1:p2", "p2", "two")
        .await
        .unwrap();
    let other = Directory::send_message(&pool, "p1", "p1:p3", "p1", "elsewhere")
        .await
        .unwrap();

    assert_eq!(first.message_id, 1);
    assert_eq!(second.message_id, 2);
    assert_eq!(other.message_id, 1);
    assert!(second.timestamp > first.timestamp);

    let messages = Directory::list_messages(&pool, "p2", "p1:p2").await.unwrap();
    let ids: Vec<u64> = messages.iter().map(|m| m.message_id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_send_message_rejections() {
    let pool = create_pool();

    let err = Directory::send_message(&pool, "p1", "p1:p2", "p1", "hi")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Conversation not found");

    Directory::add_conversation(&pool, "p1", "p1:p2").await.unwrap();
    let err = Directory::send_message(&pool, "p1", "p1:p2", "p2", "spoofed")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)));

    let err = Directory::send_message(&pool, "p1", "p1:p2", "p1", "   ")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Message text cannot be empty");

    let err = Directory::list_messages(&pool, "p3", "p1:p2").await.unwrap_err();
    assert!(matches!(err, StoreError::Unauthorized(_)));
}

#[tokio::test]
async fn test_call_history_workflow() {
    let pool = create_pool();
    let request = RecordCallRequest {
        from_user: Some("alice".to_string()),
        to_user: Some("bob".to_string()),
        call_type: CallType::Webcam,
        duration: 95,
        notes: "standup".to_string(),
    };

    let entry = Directory::record_call(&pool, "p1", &request).await.unwrap();
    Directory::record_call(&pool, "p2", &request).await.unwrap();

    let history = Directory::get_call_history(&pool, "p1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].duration, 95);

    // Another caller cannot delete p1's entry
    let err = Directory::delete_call_entry(&pool, "p2", entry.id)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Call entry not found");

    Directory::delete_call_entry(&pool, "p1", entry.id).await.unwrap();
    assert!(Directory::get_call_history(&pool, "p1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_workflow() {
    let pool = create_pool();

    Directory::create_profile(&pool, "p1", "alice", "Alice")
        .await
        .expect("Failed to create profile");

    let err = Directory::create_profile(&pool, "p1", "alice2", "Alice")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Profile already exists for this caller");

    let err = Directory::create_profile(&pool, "p2", "ALICE", "Other")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Username already exists");

    let err = Directory::update_profile(&pool, "p2", None, Some("Bob"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Profile not found");

    let updated = Directory::update_profile(&pool, "p1", None, Some("  Alice A.  "))
        .await
        .unwrap();
    assert_eq!(updated.username, "alice");
    assert_eq!(updated.display_name, "Alice A.");

    let err = Directory::update_profile(&pool, "p1", None, Some(""))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Display name must be between 1 and 32 characters"
    );

    let fetched = Directory::get_profile(&pool, "p1").await.unwrap().unwrap();
    assert_eq!(fetched.display_name, "Alice A.");
    assert!(Directory::get_profile(&pool, "p2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_search_users() {
    let pool = create_pool();
    Directory::create_profile(&pool, "p1", "alice", "Alice Liddell")
        .await
        .unwrap();
    Directory::create_profile(&pool, "p2", "bob", "Bob Builder")
        .await
        .unwrap();

    let err = Directory::search_users(&pool, " ab ").await.unwrap_err();
    assert_eq!(err.to_string(), "Search text must be at least 3 characters");

    let results = Directory::search_users(&pool, "LID").await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].principal, "p1");

    let results = Directory::search_users(&pool, "zzz").await.unwrap();
    assert!(results.is_empty());
}
