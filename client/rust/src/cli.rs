//! CLI interface for the duochat client
//!
//! Provides command parsing, display formatting and the interactive loop.
//! Stdin is read on its own task so that the loop can keep rendering
//! freshly pulled messages while waiting for input.

use crate::client::{DirectoryClient, Snapshot};
use crate::error::{ClientError, ErrorKind, Result};
use crate::identity::{ConversationId, ParticipantId};
use crate::models::{nanos_to_datetime, CallLogEntry, Message, MessageId, ProfileUpdate};
use crate::mutation::MutationOutcome;
use crate::preferences::{ColorTheme, PreferenceStore, ThemeMode};
use crate::resource::{ResourceKey, ResourceValue};
use crate::scheduler::Subscription;
use std::collections::HashSet;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

const RENDER_INTERVAL: Duration = Duration::from_millis(500);
const EVICT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chats,
    Open(String),
    /// Remove the named conversation, or the open one
    Remove(Option<String>),
    Calls,
    DeleteCall(u64),
    Search(String),
    /// Show a profile, own profile when no principal is given
    Profile(Option<String>),
    Register { username: String, display_name: String },
    Rename(String),
    Handle(String),
    Theme(String),
    Help,
    Message(String),
    Quit,
}

impl Command {
    /// Parse a command string
    pub fn parse(input: &str) -> std::result::Result<Self, String> {
        let input = input.trim();
        if !input.starts_with('/') {
            return Ok(Command::Message(input.to_string()));
        }

        let (name, rest) = match input.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (input, ""),
        };
        let required = |usage: &str| {
            if rest.is_empty() {
                Err(format!("Usage: {}", usage))
            } else {
                Ok(rest.to_string())
            }
        };

        match name {
            "/quit" | "/exit" => Ok(Command::Quit),
            "/help" => Ok(Command::Help),
            "/chats" | "/list" => Ok(Command::Chats),
            "/calls" => Ok(Command::Calls),
            "/open" => required("/open <participant>").map(Command::Open),
            "/remove" => Ok(Command::Remove((!rest.is_empty()).then(|| rest.to_string()))),
            "/delete-call" => rest
                .parse::<u64>()
                .map(Command::DeleteCall)
                .map_err(|_| "Usage: /delete-call <call id>".to_string()),
            "/search" => required("/search <text>").map(Command::Search),
            "/profile" => Ok(Command::Profile((!rest.is_empty()).then(|| rest.to_string()))),
            "/register" => match rest.split_once(char::is_whitespace) {
                Some((username, display_name)) if !display_name.trim().is_empty() => {
                    Ok(Command::Register {
                        username: username.to_string(),
                        display_name: display_name.trim().to_string(),
                    })
                }
                _ => Err("Usage: /register <username> <display name>".to_string()),
            },
            "/rename" => required("/rename <display name>").map(Command::Rename),
            "/handle" => required("/handle <username>").map(Command::Handle),
            "/theme" => required("/theme <preset|light|dark|system>").map(Command::Theme),
            _ => Err(format!("Unknown command: {}", input)),
        }
    }
}

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    Command::parse(input).map_err(ClientError::InvalidArgument)
}

/// Format a message for display
pub fn format_message(conversation: &str, sender: &str, text: &str) -> String {
    format!("#{} <{}> {}", conversation, sender, text)
}

/// Format a control message for display
pub fn format_control(conversation: &str, action: &str) -> String {
    format!("#{} {}", conversation, action)
}

pub fn format_call(entry: &CallLogEntry) -> String {
    let when = nanos_to_datetime(entry.timestamp_nanos).format("%Y-%m-%d %H:%M");
    let peer = entry
        .to_user
        .as_deref()
        .or(entry.from_user.as_deref())
        .unwrap_or("unknown");
    format!(
        "[{}] {} {:?} call with {} ({})",
        entry.id,
        when,
        entry.call_type,
        peer,
        entry.duration_label()
    )
}

/// Describe a failure the way the loop shows it
pub fn format_error(err: &ClientError) -> String {
    match err.kind() {
        ErrorKind::Contention => format!("(still working on it) {}", err),
        ErrorKind::Transport => format!("Network problem, will retry: {}", err),
        _ => format!("Error: {}", err),
    }
}

/// Conversation currently shown, with the messages already printed
struct OpenConversation {
    id: ConversationId,
    label: String,
    _subscription: Subscription,
    printed: HashSet<MessageId>,
}

impl OpenConversation {
    fn render_new(&mut self, client: &DirectoryClient) {
        let key = ResourceKey::Messages(self.id.clone());
        let Snapshot::Ready(ResourceValue::Messages(messages)) = client.current_value(&key) else {
            return;
        };
        for message in messages.iter().filter(|m| !m.is_provisional()) {
            if self.printed.insert(message.id) {
                println!("{}", render_message(&self.label, message));
            }
        }
    }
}

fn render_message(label: &str, message: &Message) -> String {
    format_message(label, &message.sender_id.short_label(), &message.text)
}

/// Spawn the stdin reader; the channel closes on EOF
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::error!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Run the interactive loop until `/quit` or EOF
pub async fn run_client_loop(client: &DirectoryClient, preferences: &PreferenceStore) -> Result<()> {
    let _conversations = client.conversations();
    let _own_profile = client.profile(client.principal());
    let mut open: Option<OpenConversation> = None;

    let mut input = spawn_stdin_reader();
    let mut ticker = tokio::time::interval(RENDER_INTERVAL);
    let mut eviction = tokio::time::interval(EVICT_INTERVAL);

    println!("Type /help for commands");
    prompt();
    loop {
        tokio::select! {
            line = input.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    prompt();
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = handle_command(client, preferences, &mut open, command).await {
                            println!("{}", format_error(&e));
                        }
                    }
                    Err(e) => println!("{}", format_error(&e)),
                }
                prompt();
            }
            _ = ticker.tick() => {
                if let Some(conversation) = open.as_mut() {
                    conversation.render_new(client);
                }
            }
            _ = eviction.tick() => {
                // Search results and one-off lookups are dropped once unwatched
                client.evict_unobserved();
            }
        }
    }

    log::info!("Leaving duochat");
    Ok(())
}

async fn handle_command(
    client: &DirectoryClient,
    preferences: &PreferenceStore,
    open: &mut Option<OpenConversation>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Help => print_help(),
        Command::Chats => {
            let list = client.conversation_list();
            if list.is_empty() {
                println!("No conversations yet. Use /open <participant>");
            }
            for summary in list {
                let preview = summary
                    .last_message_preview
                    .map(|p| format!(" - {}", p.text))
                    .unwrap_or_default();
                println!("{} {}{}", summary.id, summary.other_participant.display_handle, preview);
            }
        }
        Command::Open(other) => {
            let other = ParticipantId::new(other)?;
            let (id, outcome) = client.start_conversation(&other).await?;
            if let MutationOutcome::AlreadySatisfied(_) = outcome {
                log::debug!("Conversation {} already existed", id);
            }
            let label = other.short_label();
            println!("{}", format_control(&label, "opened"));
            *open = Some(OpenConversation {
                _subscription: client.messages(&id),
                id,
                label,
                printed: HashSet::new(),
            });
        }
        Command::Remove(target) => {
            let id = match (target, open.as_ref()) {
                (Some(text), _) => ConversationId::parse(&text)?,
                (None, Some(conversation)) => conversation.id.clone(),
                (None, None) => {
                    return Err(ClientError::InvalidArgument(
                        "no conversation is open".to_string(),
                    ))
                }
            };
            client.remove_conversation(&id).await?;
            if open.as_ref().is_some_and(|c| c.id == id) {
                *open = None;
            }
            println!("{}", format_control(&id.display_label("chat"), "removed"));
        }
        Command::Calls => {
            let mut subscription = client.call_history();
            let key = ResourceKey::CallHistory;
            let snapshot = wait_for_value(client, &key).await;
            subscription.unsubscribe();
            match snapshot {
                Snapshot::Ready(ResourceValue::CallHistory(calls)) if calls.is_empty() => {
                    println!("No calls yet")
                }
                Snapshot::Ready(ResourceValue::CallHistory(calls)) => {
                    for call in calls.iter().rev() {
                        println!("{}", format_call(call));
                    }
                }
                Snapshot::Failed(e) => println!("Could not load call history: {}", e),
                _ => println!("Call history is still loading"),
            }
        }
        Command::DeleteCall(call_id) => {
            client.delete_call_entry(call_id).await?;
            println!("Call {} deleted", call_id);
        }
        Command::Search(text) => {
            let mut subscription = client.search_users(&text)?;
            let key = subscription.key().clone();
            let snapshot = wait_for_value(client, &key).await;
            subscription.unsubscribe();
            match snapshot {
                Snapshot::Ready(ResourceValue::UserSearch(results)) if results.is_empty() => {
                    println!("Nobody matches {:?}", text.trim())
                }
                Snapshot::Ready(ResourceValue::UserSearch(results)) => {
                    for profile in results {
                        println!("{} {} ({})", profile.handle(), profile.display_name, profile.principal);
                    }
                }
                Snapshot::Failed(e) => println!("Search failed: {}", e),
                _ => println!("Search is still running"),
            }
        }
        Command::Profile(principal) => {
            let principal = match principal {
                Some(text) => ParticipantId::new(text)?,
                None => client.principal().clone(),
            };
            let subscription = client.profile(&principal);
            let snapshot = wait_for_value(client, subscription.key()).await;
            match snapshot {
                Snapshot::Ready(ResourceValue::Profile(Some(profile))) => {
                    println!("{} {} ({})", profile.handle(), profile.display_name, profile.principal)
                }
                Snapshot::Ready(_) => println!("{} has no profile yet", principal.short_label()),
                Snapshot::Failed(e) => println!("Could not load profile: {}", e),
                Snapshot::Loading => println!("Profile is still loading"),
            }
        }
        Command::Register {
            username,
            display_name,
        } => {
            client.create_profile(&username, &display_name).await?;
            println!("Registered as @{}", username);
        }
        Command::Rename(display_name) => {
            client
                .update_profile(ProfileUpdate {
                    display_name: Some(display_name),
                    ..Default::default()
                })
                .await?;
            println!("Display name updated");
        }
        Command::Handle(username) => {
            client
                .update_profile(ProfileUpdate {
                    username: Some(username.clone()),
                    ..Default::default()
                })
                .await?;
            println!("Username changed to @{}", username);
        }
        Command::Theme(choice) => {
            let mut preference = preferences.load(client.principal());
            if let Ok(mode) = choice.parse::<ThemeMode>() {
                preference.mode = mode;
            } else {
                preference.color_theme = choice
                    .parse::<ColorTheme>()
                    .map_err(ClientError::InvalidArgument)?;
            }
            preferences.save(client.principal(), &preference)?;
            println!(
                "Theme: {} ({:?})",
                preference.color_theme.display_name(),
                preference.mode
            );
        }
        Command::Message(text) => {
            let Some(conversation) = open.as_mut() else {
                return Err(ClientError::InvalidArgument(
                    "open a conversation first with /open <participant>".to_string(),
                ));
            };
            if let MutationOutcome::Sent(message) = client.send_message(&conversation.id, &text).await? {
                if conversation.printed.insert(message.id) {
                    println!("{}", render_message(&conversation.label, &message));
                }
            }
        }
        Command::Quit => {}
    }
    Ok(())
}

/// Wait briefly for the first pull of a freshly subscribed key
async fn wait_for_value(client: &DirectoryClient, key: &ResourceKey) -> Snapshot {
    for _ in 0..20 {
        let snapshot = client.current_value(key);
        if !snapshot.is_loading() {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    client.current_value(key)
}

fn print_help() {
    println!("/chats                         list conversations");
    println!("/open <participant>            open (or start) a conversation");
    println!("/remove [conversation id]      remove a conversation you started");
    println!("/calls                         show call history");
    println!("/delete-call <id>              delete a call history entry");
    println!("/search <text>                 find people (3+ characters)");
    println!("/profile [participant]         show a profile");
    println!("/register <username> <name>    create your profile");
    println!("/rename <display name>         change your display name");
    println!("/handle <username>             change your username");
    println!("/theme <preset|mode>           set colour preset or light/dark/system");
    println!("/quit                          leave");
}
