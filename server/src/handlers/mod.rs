/// HTTP handlers module
/// Provides the REST endpoints of the directory

pub mod rest;

pub use rest::{
    add_conversation, create_profile, delete_call_entry, get_call_history, get_profile, health,
    list_conversations, list_messages, record_call, remove_conversation, search_users,
    send_message, update_profile, PRINCIPAL_HEADER,
};
