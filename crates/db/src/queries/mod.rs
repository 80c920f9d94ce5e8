pub mod heartbeat;
pub mod search;
pub mod sessions;

pub(crate) fn role_to_str(role: claude_history_types::Role) -> &'static str {
    match role {
        claude_history_types::Role::User => "user",
        claude_history_types::Role::Assistant => "assistant",
    }
}

pub(crate) fn role_from_str(s: &str) -> claude_history_types::Role {
    match s {
        "assistant" => claude_history_types::Role::Assistant,
        _ => claude_history_types::Role::User,
    }
}
