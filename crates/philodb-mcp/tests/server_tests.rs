use serde_json::{json, Value};

use philodb_core::error::{Error, Result};
use philodb_core::traits::RetrievalBackend;
use philodb_core::types::{ChunkMetadata, EntryChunk, EntryContent, EntrySummary, SearchResult, StoreStats};
use philodb_mcp::{McpServer, ServerState};

struct FakeBackend;

fn hit(entry: &str, score: f32) -> SearchResult {
    SearchResult {
        id: format!("{entry}_chunk_0"),
        text: format!("Passage about {entry}."),
        score,
        metadata: ChunkMetadata {
            entry_name: entry.to_string(),
            title: entry.to_uppercase(),
            filename: format!("{entry}.html"),
            chunk_index: 0,
            total_chunks: 1,
        },
    }
}

#[async_trait::async_trait]
impl RetrievalBackend for FakeBackend {
    async fn search(&self, query: &str, k: usize, entry_filter: Option<&str>) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() || k == 0 || k > 20 {
            return Err(Error::invalid_argument("bad query or k"));
        }
        if query == "explode" {
            return Err(Error::Store("disk on fire at /var/secret".into()));
        }
        let mut hits = vec![hit("consciousness", 0.9), hit("personal-identity", 0.4), hit("volcanoes", 0.1)];
        if let Some(entry) = entry_filter {
            hits.retain(|h| h.metadata.entry_name == entry);
        }
        hits.truncate(k);
        Ok(hits)
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            entry_count: 3,
            chunk_count: 3,
            embedding_model: "fake".into(),
            store_path: "/tmp/db".into(),
            table: "philosophy_entries".into(),
        })
    }

    async fn list(&self, limit: usize) -> Result<Vec<EntrySummary>> {
        if limit == 0 {
            return Err(Error::invalid_argument("limit must be at least 1"));
        }
        let all = ["consciousness", "personal-identity", "volcanoes"];
        Ok(all.iter().take(limit).map(|n| EntrySummary { name: n.to_string(), title: n.to_uppercase(), chunks: 1 }).collect())
    }

    async fn get_entry(&self, entry_name: &str) -> Result<Option<EntryContent>> {
        if entry_name != "consciousness" {
            return Ok(None);
        }
        Ok(Some(EntryContent {
            entry_name: entry_name.into(),
            title: "Consciousness".into(),
            chunks: vec![
                EntryChunk { id: "consciousness_chunk_0".into(), text: "First.".into(), chunk_index: 0 },
                EntryChunk { id: "consciousness_chunk_1".into(), text: "Second.".into(), chunk_index: 1 },
            ],
        }))
    }

    fn default_k(&self) -> usize { 5 }
}

async fn send(server: &mut McpServer<FakeBackend>, msg: Value) -> Option<Value> {
    server.handle_line(&msg.to_string()).await.map(|r| serde_json::to_value(r).unwrap())
}

async fn ready_server() -> McpServer<FakeBackend> {
    let mut server = McpServer::new(FakeBackend, 20);
    send(&mut server, json!({"jsonrpc": "2.0", "id": 0, "method": "initialize", "params": {}})).await;
    send(&mut server, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
    server
}

fn call(id: i64, name: &str, arguments: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": "tools/call", "params": {"name": name, "arguments": arguments}})
}

#[tokio::test]
async fn initialize_handshake() {
    let mut server = McpServer::new(FakeBackend, 20);
    assert_eq!(server.state(), ServerState::Idle);
    let resp = send(&mut server, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await.unwrap();
    assert_eq!(resp["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(resp["result"]["serverInfo"]["name"], "philodb-mcp-server");
    assert!(resp["result"]["capabilities"]["tools"].is_object());
    assert_eq!(server.state(), ServerState::Initialized);

    let none = send(&mut server, json!({"jsonrpc": "2.0", "method": "notifications/initialized"})).await;
    assert!(none.is_none(), "notifications get no response");
    assert_eq!(server.state(), ServerState::Serving);
}

#[tokio::test]
async fn requests_before_initialize_are_rejected() {
    let mut server = McpServer::new(FakeBackend, 20);
    let resp = send(&mut server, json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await.unwrap();
    assert_eq!(resp["error"]["code"], -32002);
    let ping = send(&mut server, json!({"jsonrpc": "2.0", "id": 2, "method": "ping"})).await.unwrap();
    assert!(ping["result"].is_object());
    assert_eq!(server.state(), ServerState::Idle);
}

#[tokio::test]
async fn tools_list_returns_manifest() {
    let mut server = ready_server().await;
    let resp = send(&mut server, json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"})).await.unwrap();
    let tools = resp["result"]["tools"].as_array().unwrap();
    let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["search", "stats", "list", "get_entry"]);
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["query"]));
    assert_eq!(tools[0]["inputSchema"]["properties"]["k"]["maximum"], 20);
}

#[tokio::test]
async fn tools_call_before_initialized_notification_moves_to_serving() {
    let mut server = McpServer::new(FakeBackend, 20);
    send(&mut server, json!({"jsonrpc": "2.0", "id": 0, "method": "initialize"})).await;
    let resp = send(&mut server, call(1, "stats", json!({}))).await.unwrap();
    assert_eq!(resp["result"]["structuredContent"]["chunk_count"], 3);
    assert_eq!(server.state(), ServerState::Serving);
}

#[tokio::test]
async fn search_tool_returns_text_and_structured_results() {
    let mut server = ready_server().await;
    let resp = send(&mut server, call(4, "search", json!({"query": "consciousness", "k": 2}))).await.unwrap();
    let result = &resp["result"];
    assert_eq!(result["isError"], false);
    assert_eq!(result["content"][0]["type"], "text");
    let text = result["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("Found 2 results for 'consciousness':"));
    assert!(text.contains("(relevance: 0.900)"));
    let hits = result["structuredContent"]["results"].as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["metadata"]["entry_name"], "consciousness");

    let legacy = send(&mut server, call(5, "search_philosophy", json!({"query": "mind", "max_results": 1, "entry_filter": "volcanoes"}))).await.unwrap();
    let hits = legacy["result"]["structuredContent"]["results"].as_array().unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["id"], "volcanoes_chunk_0");
}

#[tokio::test]
async fn unknown_tool_is_not_found_and_server_keeps_serving() {
    let mut server = ready_server().await;
    let resp = send(&mut server, call(6, "summon_kant", json!({}))).await.unwrap();
    assert_eq!(resp["error"]["code"], -32601);
    assert_eq!(resp["id"], 6);
    assert_eq!(server.state(), ServerState::Serving);

    let next = send(&mut server, call(7, "list", json!({}))).await.unwrap();
    assert_eq!(next["result"]["structuredContent"]["total"], 3);
}

#[tokio::test]
async fn bad_arguments_are_invalid_params() {
    let mut server = ready_server().await;
    let missing = send(&mut server, call(8, "search", json!({"k": 3}))).await.unwrap();
    assert_eq!(missing["error"]["code"], -32602);
    let zero_k = send(&mut server, call(9, "search", json!({"query": "mind", "k": 0}))).await.unwrap();
    assert_eq!(zero_k["error"]["code"], -32602);
    let negative = send(&mut server, call(10, "search", json!({"query": "mind", "k": -1}))).await.unwrap();
    assert_eq!(negative["error"]["code"], -32602);
    let no_name = send(&mut server, json!({"jsonrpc": "2.0", "id": 11, "method": "tools/call", "params": {}})).await.unwrap();
    assert_eq!(no_name["error"]["code"], -32602);
}

#[tokio::test]
async fn internal_errors_are_sanitized() {
    let mut server = ready_server().await;
    let resp = send(&mut server, call(12, "search", json!({"query": "explode"}))).await.unwrap();
    assert_eq!(resp["error"]["code"], -32603);
    assert!(!resp["error"]["message"].as_str().unwrap().contains("/var/secret"));
}

#[tokio::test]
async fn get_entry_found_and_missing() {
    let mut server = ready_server().await;
    let found = send(&mut server, call(13, "get_entry", json!({"entry_name": "consciousness"}))).await.unwrap();
    let text = found["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.starts_with("**Consciousness**"));
    assert!(text.ends_with("First.\n\nSecond."));
    assert_eq!(found["result"]["structuredContent"]["total_chunks"], 2);

    let missing = send(&mut server, call(14, "get_entry", json!({"entry_name": "qualia"}))).await.unwrap();
    assert_eq!(missing["result"]["structuredContent"]["found"], false);
    assert_eq!(missing["result"]["isError"], false);
}

#[tokio::test]
async fn parse_errors_use_null_id() {
    let mut server = ready_server().await;
    let resp = server.handle_line("{not json").await.unwrap();
    let resp = serde_json::to_value(resp).unwrap();
    assert_eq!(resp["error"]["code"], -32700);
    assert!(resp["id"].is_null());

    let invalid = send(&mut server, json!({"jsonrpc": "2.0", "id": 15})).await.unwrap();
    assert_eq!(invalid["error"]["code"], -32600);
    assert_eq!(invalid["id"], 15);
    assert_eq!(server.state(), ServerState::Serving);
}

#[tokio::test]
async fn serve_answers_in_order_and_stops_at_eof() {
    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string(),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
        String::new(),
        call(2, "search", json!({"query": "consciousness"})).to_string(),
        "garbage".to_string(),
        call(3, "stats", json!({})).to_string(),
    ]
    .join("\n");
    let mut output = Vec::new();
    let server = McpServer::new(FakeBackend, 20);
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    let replies: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 4);
    assert_eq!(replies[0]["id"], 1);
    assert_eq!(replies[1]["id"], 2);
    assert_eq!(replies[1]["result"]["structuredContent"]["results"].as_array().unwrap().len(), 3);
    assert_eq!(replies[2]["error"]["code"], -32700);
    assert_eq!(replies[3]["id"], 3);
}

#[tokio::test]
async fn invalid_utf8_line_is_a_parse_error_not_fatal() {
    let mut input = Vec::new();
    input.extend_from_slice(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string().as_bytes());
    input.push(b'\n');
    input.extend_from_slice(&[0xff, 0xfe, b' ', b'x', b'\n']);
    input.extend_from_slice(call(2, "stats", json!({})).to_string().as_bytes());
    input.push(b'\n');

    let mut output = Vec::new();
    let server = McpServer::new(FakeBackend, 20);
    server.serve(input.as_slice(), &mut output).await.unwrap();

    let replies: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[1]["error"]["code"], -32700);
    assert!(replies[1]["id"].is_null());
    assert_eq!(replies[2]["id"], 2);
    assert_eq!(replies[2]["result"]["structuredContent"]["chunk_count"], 3);
}

#[tokio::test]
async fn shutdown_stops_the_loop() {
    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string(),
        json!({"jsonrpc": "2.0", "id": 2, "method": "shutdown"}).to_string(),
        call(3, "stats", json!({})).to_string(),
    ]
    .join("\n");
    let mut output = Vec::new();
    McpServer::new(FakeBackend, 20).serve(input.as_bytes(), &mut output).await.unwrap();
    let text = String::from_utf8(output).unwrap();
    assert_eq!(text.lines().count(), 2, "nothing is answered after shutdown");
}
