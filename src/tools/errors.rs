use rmcp::ErrorData as McpError;

use crate::multiquery::MultiQueryError;
use crate::openai::client::ChatError;

pub(super) fn retriable_error(e: &impl std::fmt::Display) -> McpError {
    McpError::internal_error(format!("{e} (retriable)"), None)
}

pub(super) fn chat_to_mcp_error(e: ChatError) -> McpError {
    match &e {
        ChatError::ApiKeyNotSet => McpError::invalid_params(e.to_string(), None),
        ChatError::RateLimited | ChatError::Timeout(_) => retriable_error(&e),
        ChatError::QuotaExhausted(_) => McpError::invalid_params(
            format!("{e} — check your billing at https://platform.openai.com/usage"),
            None,
        ),
        _ => McpError::internal_error(e.to_string(), None),
    }
}

pub(super) fn multiquery_to_mcp_error(e: MultiQueryError) -> McpError {
    match e {
        MultiQueryError::EmptyInput => McpError::invalid_params(e.to_string(), None),
        MultiQueryError::Chat(chat) => chat_to_mcp_error(chat),
        MultiQueryError::MalformedOutput { .. } => McpError::internal_error(e.to_string(), None),
    }
}
