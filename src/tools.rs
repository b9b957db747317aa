use anyhow::{Context, Result};
use serde_json::json;

use crate::comment::IntentQuery;
use crate::llm::{ChatMessage, FunctionDefinition, ToolDefinition};

pub const SEARCH_AFFILIATE_LINK: &str = "searchAffiliateLink";

/// The single tool offered to the model during intent extraction.
pub fn affiliate_tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: SEARCH_AFFILIATE_LINK.to_string(),
            description: "Find relevant affiliate link for a product query.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Product to search affiliate link for"
                    }
                },
                "required": ["query"]
            }),
        },
    }]
}

/// Pull the search query out of the model's tool call.
///
/// The model must answer with a `searchAffiliateLink` call whose arguments
/// are a JSON object holding a string `query`; anything else is an error.
pub fn parse_affiliate_call(message: &ChatMessage) -> Result<IntentQuery> {
    let call = message
        .tool_calls
        .as_deref()
        .and_then(|calls| calls.first())
        .context("Model did not request an affiliate link search")?;

    if call.function.name != SEARCH_AFFILIATE_LINK {
        anyhow::bail!("Model called unknown tool: {}", call.function.name);
    }

    let intent: IntentQuery = serde_json::from_str(&call.function.arguments)
        .with_context(|| {
            format!(
                "Invalid arguments for {}: {}",
                SEARCH_AFFILIATE_LINK, call.function.arguments
            )
        })?;

    Ok(intent)
}
