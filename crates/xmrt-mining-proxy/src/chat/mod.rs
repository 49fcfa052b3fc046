//! Pass-through to a hosted LLM gateway with a small tool dispatch table.

pub mod gateway;
pub mod prompt;
pub mod tools;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

pub use gateway::{
    AssistantMessage, ChatCompletionRequest, ChatCompletionResponse, ChatGateway, ChatMessage,
    FunctionCall, HttpChatGateway, ToolCall, ToolDefinition,
};
pub use prompt::build_system_prompt;
pub use tools::{InMemoryTaskStore, Task, TaskStatus, TaskStore, ToolDispatcher};

use crate::activity::ActivityLog;
use crate::cache::SnapshotCache;
use crate::config::GatewayConfig;
use crate::error::Result;

pub const FALLBACK_REPLY: &str = "I apologize, but I could not generate a response.";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub context: Option<ChatContext>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    #[serde(default)]
    pub user_context: Option<UserContext>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    #[serde(default)]
    pub is_founder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub model: String,
    pub success: bool,
}

pub struct ChatService {
    gateway: Arc<dyn ChatGateway>,
    tools: ToolDispatcher,
    cache: Arc<SnapshotCache>,
    activity: Arc<ActivityLog>,
    config: GatewayConfig,
}

impl ChatService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        tools: ToolDispatcher,
        cache: Arc<SnapshotCache>,
        activity: Arc<ActivityLog>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            gateway,
            tools,
            cache,
            activity,
            config,
        }
    }

    /// One gateway round trip. Tool calls in the answer are run locally and
    /// their output is appended to the reply; the gateway is not called again.
    pub async fn respond(&self, request: ChatRequest) -> Result<ChatReply> {
        let model = request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.model.clone());
        let is_founder = request
            .context
            .and_then(|c| c.user_context)
            .is_some_and(|u| u.is_founder);

        // Latest cached numbers only; a chat turn never waits on the pool.
        let mining = self.cache.peek();
        let mut messages = vec![ChatMessage::system(build_system_prompt(mining.as_deref(), is_founder))];
        messages.extend(request.messages);

        let completion = ChatCompletionRequest {
            model: model.clone(),
            messages,
            tools: Some(tools::tool_definitions()),
            tool_choice: Some("auto".to_string()),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        info!("Calling LLM gateway with model {}", model);
        let response = self.gateway.complete(&completion).await?;

        let mut parts = Vec::new();
        if let Some(message) = response.first_message() {
            if let Some(content) = message.content.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                parts.push(content.to_string());
            }
            for call in message.tool_calls.iter().flatten() {
                parts.push(self.tools.dispatch(call).await);
            }
        }

        let response = if parts.is_empty() {
            FALLBACK_REPLY.to_string()
        } else {
            parts.join("\n\n")
        };
        self.activity.record("chat", "reply", format!("model {model}"));

        Ok(ChatReply {
            response,
            model,
            success: true,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeGateway, GatewayReply};
    use super::*;
    use crate::aggregator::MiningAggregator;
    use crate::config::ProxyConfig;
    use crate::error::ProxyError;
    use crate::fetch::testing::{Reply, ScriptedTransport};
    use crate::snapshot::{Enrichment, MinerSnapshot, RetrievalResult, SourceStatus};
    use serde_json::json;

    fn service(gateway: Arc<FakeGateway>) -> (ChatService, Arc<SnapshotCache>) {
        let transport = ScriptedTransport::new(|_| Reply::Json(json!({ "hash": 1000, "validShares": 1 })));
        let aggregator = Arc::new(MiningAggregator::new(&ProxyConfig::default(), transport));
        let cache = Arc::new(SnapshotCache::default());
        let tools = ToolDispatcher::new(Arc::new(InMemoryTaskStore::new()), cache.clone(), aggregator.clone());
        let service = ChatService::new(gateway, tools, cache.clone(), aggregator.activity_log(), GatewayConfig::default());
        (service, cache)
    }

    fn ask(text: &str) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::user(text)],
            ..ChatRequest::default()
        }
    }

    #[tokio::test]
    async fn plain_answer_passes_through() {
        let gateway = FakeGateway::text("Mobile mining uses idle phone cycles.");
        let (chat, _) = service(gateway.clone());

        let reply = chat.respond(ask("what is mobile mining?")).await.unwrap();

        assert_eq!(reply.response, "Mobile mining uses idle phone cycles.");
        assert_eq!(reply.model, "google/gemini-2.5-flash");
        assert!(reply.success);

        let requests = gateway.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.messages[0].role, "system");
        assert_eq!(sent.messages[1].content.as_deref(), Some("what is mobile mining?"));
        assert_eq!(sent.tools.as_ref().unwrap().len(), 5);
        assert_eq!(sent.temperature, 0.8);
    }

    #[tokio::test]
    async fn tool_results_follow_the_content() {
        let gateway = FakeGateway::new(|| {
            GatewayReply::Message(AssistantMessage {
                content: Some("On it.".into()),
                tool_calls: Some(vec![
                    ToolCall {
                        id: Some("a".into()),
                        function: FunctionCall {
                            name: "create_task".into(),
                            arguments: r#"{"title":"Audit relays"}"#.into(),
                        },
                    },
                    ToolCall {
                        id: Some("b".into()),
                        function: FunctionCall {
                            name: "no_such_tool".into(),
                            arguments: "{}".into(),
                        },
                    },
                ]),
            })
        });
        let (chat, _) = service(gateway);

        let reply = chat.respond(ask("make a task")).await.unwrap();
        let parts: Vec<&str> = reply.response.split("\n\n").collect();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "On it.");
        assert!(parts[1].starts_with("Created task \"Audit relays\""));
        assert!(parts[2].starts_with("Error running no_such_tool"));
    }

    #[tokio::test]
    async fn empty_answer_uses_the_apology() {
        let gateway = FakeGateway::new(|| GatewayReply::Message(AssistantMessage::default()));
        let (chat, _) = service(gateway);

        let reply = chat.respond(ask("hello?")).await.unwrap();
        assert_eq!(reply.response, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn cached_stats_and_founder_flag_reach_the_prompt() {
        let gateway = FakeGateway::text("ok");
        let (chat, cache) = service(gateway.clone());
        let miner = MinerSnapshot {
            hash_rate: 2_750.0,
            last_activity_epoch_seconds: 1,
            total_hashes_lifetime: 10,
            valid_share_count: 42,
            invalid_share_count: 0,
            amount_due_atomic_units: 0,
            amount_paid_atomic_units: 0,
            payment_count: 0,
            source_status: SourceStatus::Live,
            demo_note: None,
        };
        cache.put(Arc::new(RetrievalResult::succeeded(miner, Enrichment::default(), String::new(), 0)));

        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [{ "role": "user", "content": "how am I doing?" }],
            "context": { "userContext": { "isFounder": true } },
            "model": "openai/gpt-5-mini"
        }))
        .unwrap();
        let reply = chat.respond(request).await.unwrap();
        assert_eq!(reply.model, "openai/gpt-5-mini");

        let system = gateway.requests.lock().unwrap()[0].messages[0].content.clone().unwrap();
        assert!(system.contains("- Hashrate: 2.75 KH/s"));
        assert!(system.contains("- Valid Shares: 42"));
        assert!(system.ends_with(prompt::FOUNDER_NOTE));
    }

    #[tokio::test]
    async fn tool_call_history_is_forwarded() {
        let gateway = FakeGateway::text("ok");
        let (chat, _) = service(gateway.clone());
        let request: ChatRequest = serde_json::from_value(json!({
            "messages": [
                { "role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1", "type": "function",
                    "function": { "name": "list_tasks", "arguments": "{}" }
                }] },
                { "role": "tool", "tool_call_id": "call_1", "content": "No tasks." }
            ]
        }))
        .unwrap();

        chat.respond(request).await.unwrap();

        let requests = gateway.requests.lock().unwrap();
        let wire = serde_json::to_value(&requests[0].messages[1..]).unwrap();
        assert!(wire[0]["content"].is_null());
        assert_eq!(wire[0]["tool_calls"][0]["id"], "call_1");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
        assert!(wire[1].get("tool_calls").is_none());
    }

    #[tokio::test]
    async fn gateway_errors_propagate() {
        let (chat, _) = service(FakeGateway::new(|| GatewayReply::RateLimited));
        assert!(matches!(chat.respond(ask("hi")).await, Err(ProxyError::RateLimited)));

        let (chat, _) = service(FakeGateway::new(|| GatewayReply::Status(500)));
        assert!(matches!(
            chat.respond(ask("hi")).await,
            Err(ProxyError::Gateway { status: 500, .. })
        ));
    }
}
