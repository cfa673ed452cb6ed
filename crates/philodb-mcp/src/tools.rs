//! Tool manifest and dispatch onto a [`RetrievalBackend`].

use serde::Deserialize;
use serde_json::{json, Value};

use philodb_core::error::Error;
use philodb_core::traits::RetrievalBackend;
use philodb_core::types::{EntryContent, EntrySummary, SearchResult, StoreStats};

use crate::protocol::McpTool;

pub const DEFAULT_LIST_LIMIT: usize = 100;
const PREVIEW_CHARS: usize = 300;

/// Why a tool call produced no result.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolError {
    /// No tool with that name.
    NotFound(String),
    InvalidParams(String),
    /// Store or model failure; the message is safe to show to the caller.
    Internal(String),
}

impl From<Error> for ToolError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(msg) => ToolError::InvalidParams(msg),
            Error::NotFound(what) => ToolError::NotFound(what),
            other => {
                tracing::error!(error = %other, "tool call failed");
                ToolError::Internal(match other {
                    Error::StoreUnavailable(_) => "vector store unavailable".to_string(),
                    Error::Embedding { .. } => "embedding model failure".to_string(),
                    _ => "internal error while querying the vector store".to_string(),
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    k: Option<usize>,
    /// Older clients send `max_results`.
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default)]
    entry_filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ListArgs {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EntryArgs {
    entry_name: String,
}

pub fn manifest(max_k: usize, default_k: usize) -> Vec<McpTool> {
    vec![
        McpTool {
            name: "search",
            description: "Semantic search over the philosophy encyclopedia; returns the most relevant passages",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Natural-language search query" },
                    "k": {
                        "type": "integer",
                        "description": "Number of passages to return",
                        "default": default_k,
                        "minimum": 1,
                        "maximum": max_k
                    },
                    "entry_filter": { "type": "string", "description": "Only search within this entry (e.g. 'free-will')" }
                },
                "required": ["query"]
            }),
        },
        McpTool {
            name: "stats",
            description: "Statistics about the indexed philosophy database",
            input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
        },
        McpTool {
            name: "list",
            description: "List indexed philosophy entries by name",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Maximum entries to return", "default": DEFAULT_LIST_LIMIT, "minimum": 1 }
                },
                "required": []
            }),
        },
        McpTool {
            name: "get_entry",
            description: "Full text of one philosophy entry, reassembled from its chunks",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "entry_name": { "type": "string", "description": "Entry name, e.g. 'consciousness' or 'free-will'" }
                },
                "required": ["entry_name"]
            }),
        },
    ]
}

/// Text plus machine-readable payload of a successful call.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub text: String,
    pub structured: Value,
}

impl ToolOutput {
    pub fn into_result(self) -> Value {
        json!({
            "content": [{ "type": "text", "text": self.text }],
            "structuredContent": self.structured,
            "isError": false
        })
    }
}

pub async fn call_tool<B: RetrievalBackend + ?Sized>(backend: &B, name: &str, arguments: Value) -> Result<ToolOutput, ToolError> {
    match name {
        "search" | "search_philosophy" => {
            let args: SearchArgs = parse_args(arguments)?;
            let k = args.k.or(args.max_results).unwrap_or_else(|| backend.default_k());
            let results = backend.search(&args.query, k, args.entry_filter.as_deref()).await?;
            Ok(ToolOutput { text: format_search(&args.query, &results), structured: json!({ "results": results }) })
        }
        "stats" | "get_philosophy_stats" => {
            let stats = backend.stats().await?;
            Ok(ToolOutput { text: format_stats(&stats), structured: json!(stats) })
        }
        "list" | "list_philosophy_entries" => {
            let args: ListArgs = if arguments.is_null() { ListArgs::default() } else { parse_args(arguments)? };
            let entries = backend.list(args.limit.unwrap_or(DEFAULT_LIST_LIMIT)).await?;
            Ok(ToolOutput { text: format_list(&entries), structured: json!({ "total": entries.len(), "entries": entries }) })
        }
        "get_entry" | "get_philosophy_entry" => {
            let args: EntryArgs = parse_args(arguments)?;
            match backend.get_entry(&args.entry_name).await? {
                Some(entry) => {
                    let text = format_entry(&entry);
                    let structured = json!({ "found": true, "entry_name": entry.entry_name, "title": entry.title, "total_chunks": entry.chunks.len(), "chunks": entry.chunks });
                    Ok(ToolOutput { text, structured })
                }
                None => Ok(ToolOutput {
                    text: format!("Entry '{}' not found in the database", args.entry_name),
                    structured: json!({ "found": false, "entry_name": args.entry_name }),
                }),
            }
        }
        other => Err(ToolError::NotFound(format!("Unknown tool: {}", other))),
    }
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidParams(format!("Invalid arguments: {}", e)))
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn format_search(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for query: '{}'", query);
    }
    let mut out = format!("Found {} results for '{}':\n\n", results.len(), query);
    for (i, r) in results.iter().enumerate() {
        out.push_str(&format!(
            "**{}. {} - {}** (relevance: {:.3})\n{}\n\n",
            i + 1,
            r.metadata.title,
            r.metadata.entry_name,
            r.score,
            preview(&r.text)
        ));
    }
    out
}

pub fn format_entry(entry: &EntryContent) -> String {
    format!(
        "**{}**\n\nEntry: {}\nTotal chunks: {}\n\n{}",
        entry.title,
        entry.entry_name,
        entry.chunks.len(),
        entry.full_text()
    )
}

pub fn format_list(entries: &[EntrySummary]) -> String {
    let mut out = format!("**Philosophy Database Entries** ({} entries)\n\n", entries.len());
    for e in entries {
        out.push_str(&format!("• **{}**: {} ({} chunks)\n", e.name, e.title, e.chunks));
    }
    out
}

pub fn format_stats(stats: &StoreStats) -> String {
    format!(
        "**Philosophy Database Statistics**\n\n\
         • Total entries: {}\n\
         • Total text chunks: {}\n\
         • Embedding model: {}\n\
         • Database path: {}\n\
         • Collection name: {}\n",
        stats.entry_count, stats.chunk_count, stats.embedding_model, stats.store_path, stats.table
    )
}
