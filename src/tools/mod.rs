mod errors;
mod params;

pub use params::{DecomposeParams, ExpandParams};

use std::time::Duration;

use reqwest::Client;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::{Parameters, ToolRouter},
    model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

use tracing::{info, warn};

use errors::{chat_to_mcp_error, multiquery_to_mcp_error};

use crate::multiquery::schema::AspectQueries;
use crate::multiquery::workflow::{self, format_report};
use crate::openai::client::{ChatError, OpenAiClient};

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout; per-call model timeouts are tighter and
/// configured on the OpenAI client.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// MCP server handler providing query expansion tools.
///
/// Configuration via environment variables:
/// - `OPENAI_API_KEY`: enables the expansion tools (required for use)
/// - `OPENAI_MODEL`: chat model (default: gpt-4.1)
/// - `OPENAI_TIMEOUT_SECS`: per-call model timeout (default: 20)
#[derive(Clone)]
pub struct Refract {
    chat: Option<OpenAiClient>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl Refract {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        let chat = OpenAiClient::from_env(http)
            .inspect_err(|e| warn!("OpenAI client not available: {e}"))
            .ok();
        Ok(Self {
            chat,
            tool_router: Self::tool_router(),
        })
    }

    fn chat(&self) -> Result<&OpenAiClient, McpError> {
        self.chat
            .as_ref()
            .ok_or_else(|| chat_to_mcp_error(ChatError::ApiKeyNotSet))
    }

    #[tool(
        name = "expand_query",
        description = "Expand one question into up to 10 retrieval queries for multi-hop RAG search. Decomposes the question into four aspects (technical, safety, contractual, schedule), generates 2-4 sub-queries per aspect in parallel, then combines and deduplicates them. Use this before searching a document index when a single query would miss relevant angles."
    )]
    async fn expand_query(
        &self,
        Parameters(params): Parameters<ExpandParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.question.trim().is_empty() {
            return Err(McpError::invalid_params("question must not be empty", None));
        }

        info!(question = %params.question, "tool:expand_query");

        let chat = self.chat()?;

        let report = workflow::expand(chat, &params.question)
            .await
            .map_err(multiquery_to_mcp_error)?;

        info!(
            queries = report.queries.len(),
            failed = report.failed_aspects.len(),
            "expand_query complete"
        );

        Ok(CallToolResult::success(vec![Content::text(format_report(
            &report,
        ))]))
    }

    #[tool(
        name = "decompose",
        description = "Decompose one question into exactly four labeled aspect queries (technical, safety, contractual, schedule) without generating sub-queries. Use this when you want to inspect or hand-pick the decomposition before expanding."
    )]
    async fn decompose(
        &self,
        Parameters(params): Parameters<DecomposeParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.question.trim().is_empty() {
            return Err(McpError::invalid_params("question must not be empty", None));
        }

        info!(question = %params.question, "tool:decompose");

        let chat = self.chat()?;

        let aspects = workflow::decompose(chat, params.question.trim())
            .await
            .map_err(multiquery_to_mcp_error)?;

        let mut output = String::from("## Aspect Queries\n\n");
        for (label, aspect) in AspectQueries::LABELS.iter().zip(&aspects) {
            output.push_str(&format!("- **{label}**: {aspect}\n"));
        }

        info!(aspects = aspects.len(), "decompose complete");
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_handler]
impl ServerHandler for Refract {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "refract".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(
                "refract expands a question into a set of retrieval queries for multi-hop RAG: decompose breaks it into four aspect queries, expand_query runs the full decompose → per-aspect sub-query generation → combine pipeline."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
