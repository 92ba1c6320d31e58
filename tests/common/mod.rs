//! Shared test helpers: scripted provider, fake tool servers, service wiring.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use aibox::agent_loop::{RunEvent, RunStream};
use aibox::config::{AiboxConfig, ToolServerConfig};
use aibox::error::{AiboxError, Result};
use aibox::mcp::{ToolServerConnection, ToolServerConnector, ToolServerPool};
use aibox::provider::{
    ModelProvider, ProviderDelta, ProviderFactory, ProviderRegistry, ProviderRequest,
    SharedProvider,
};
use aibox::server::AgentService;
use aibox::session::{InMemorySessionStore, SessionAgentCache};
use aibox::tools::{
    AgentTool, AgentToolParameters, DynamicTool, LegacyToolRegistry, Tool, ToolResolver,
};

pub const MODEL: &str = "scripted:fast";
pub const OTHER_MODEL: &str = "scripted:smart";
/// Model id whose provider construction fails.
pub const BROKEN_MODEL: &str = "scripted:broken";

/// One step of a scripted model turn.
#[derive(Debug, Clone)]
pub enum Step {
    Delta(ProviderDelta),
    Fail(String),
    Pause(Duration),
    /// Never yields again.
    Hang,
}

pub fn text(delta: &str) -> Step {
    Step::Delta(ProviderDelta::Text(delta.into()))
}

pub fn reasoning(delta: &str) -> Step {
    Step::Delta(ProviderDelta::Reasoning(delta.into()))
}

pub fn call_start(id: &str, name: &str) -> Step {
    Step::Delta(ProviderDelta::ToolCallStart {
        id: id.into(),
        name: name.into(),
    })
}

pub fn call_args(id: &str, delta: &str) -> Step {
    Step::Delta(ProviderDelta::ToolCallArgs {
        id: id.into(),
        delta: delta.into(),
    })
}

pub fn call_end(id: &str) -> Step {
    Step::Delta(ProviderDelta::ToolCallEnd { id: id.into() })
}

/// A complete tool call in one turn: start, one args chunk, end.
pub fn tool_call(id: &str, name: &str, args: &str) -> Vec<Step> {
    vec![call_start(id, name), call_args(id, args), call_end(id)]
}

/// Turns shared by every provider a [`ScriptedFactory`] creates.
///
/// Each `stream_turn` pops the next queued turn; an exhausted script answers
/// with an empty turn.
#[derive(Debug, Default)]
pub struct Script {
    turns: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    created: AtomicUsize,
}

impl Script {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_turn(&self, steps: Vec<Step>) {
        self.turns.lock().expect("script lock").push_back(steps);
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().expect("script lock").clone()
    }

    /// Number of provider instances created so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    fn next_turn(&self, request: &ProviderRequest) -> Vec<Step> {
        self.requests
            .lock()
            .expect("script lock")
            .push(request.clone());
        self.turns
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_default()
    }
}

pub struct ScriptedProvider {
    model_id: String,
    script: Arc<Script>,
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn stream_turn(
        &self,
        request: &ProviderRequest,
    ) -> Result<BoxStream<'static, Result<ProviderDelta>>> {
        let steps = self.script.next_turn(request);
        Ok(Box::pin(async_stream::stream! {
            for step in steps {
                match step {
                    Step::Delta(delta) => yield Ok(delta),
                    Step::Fail(message) => {
                        yield Err(AiboxError::provider("scripted", message));
                        return;
                    }
                    Step::Pause(duration) => tokio::time::sleep(duration).await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        }))
    }
}

pub struct ScriptedFactory {
    script: Arc<Script>,
}

impl ScriptedFactory {
    pub fn new(script: Arc<Script>) -> Self {
        Self { script }
    }
}

impl ProviderFactory for ScriptedFactory {
    fn provider_keys(&self) -> &[&str] {
        &["scripted"]
    }

    fn create(
        &self,
        _config: &AiboxConfig,
        _provider_key: &str,
        model_id: &str,
    ) -> Result<SharedProvider> {
        if model_id == "broken" {
            return Err(AiboxError::Configuration("missing credentials".into()));
        }
        self.script.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedProvider {
            model_id: model_id.to_string(),
            script: self.script.clone(),
        }))
    }
}

pub fn registry(script: &Arc<Script>) -> Arc<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(ScriptedFactory::new(script.clone())));
    Arc::new(registry)
}

/// Legacy `get_weather(city)` tool with a fixed forecast.
pub fn weather_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "get_weather",
        "Current weather for a city",
        AgentToolParameters::object()
            .string("city", "City name", true)
            .build(),
        |args, _ctx| async move {
            let city = args.get_str("city")?.to_string();
            Ok(serde_json::json!({
                "city": city,
                "temperature_c": 21,
                "conditions": "sunny",
            }))
        },
    ))
}

/// Legacy tool that sleeps before answering.
pub fn slow_tool(delay: Duration) -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "slow",
        "Answers after a delay",
        AgentToolParameters::empty(),
        move |_args, _ctx| async move {
            tokio::time::sleep(delay).await;
            Ok(serde_json::json!("done"))
        },
    ))
}

/// Legacy tool that always fails.
pub fn failing_tool() -> Arc<dyn Tool> {
    Arc::new(AgentTool::new(
        "explode",
        "Always fails",
        AgentToolParameters::empty(),
        |_args, ctx| async move { Err(AiboxError::tool("explode", format!("boom in {}", ctx.tool_call_id))) },
    ))
}

pub fn legacy_tools() -> LegacyToolRegistry {
    LegacyToolRegistry::new()
        .with_tool(weather_tool())
        .with_tool(slow_tool(Duration::from_millis(50)))
        .with_tool(failing_tool())
}

/// Connector counting opened and closed connections.
///
/// Every server exposes a single `search` tool. Connecting to a server named
/// in `unreachable` fails.
#[derive(Default)]
pub struct FakeConnector {
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    unreachable: HashSet<String>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_unreachable(servers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            unreachable: servers.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        })
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServerConnector for FakeConnector {
    async fn connect(
        &self,
        server: &str,
        _config: &ToolServerConfig,
    ) -> Result<Arc<dyn ToolServerConnection>> {
        if self.unreachable.contains(server) {
            return Err(AiboxError::tool_server(server, "connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeServer {
            server: server.to_string(),
            closes: self.closes.clone(),
        }))
    }
}

struct FakeServer {
    server: String,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ToolServerConnection for FakeServer {
    async fn list_tools(&self) -> Result<Vec<DynamicTool>> {
        Ok(vec![DynamicTool {
            name: "search".into(),
            description: format!("Search via {}", self.server),
            parameters: AgentToolParameters::object()
                .string("query", "Search query", true)
                .build(),
        }])
    }

    async fn call_tool(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "server": self.server,
            "tool": name,
            "query": arguments.get("query").cloned().unwrap_or_default(),
        }))
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn search_server() -> ToolServerConfig {
    ToolServerConfig::http("http://localhost:7001/mcp")
}

pub fn test_config() -> AiboxConfig {
    AiboxConfig::default()
        .with_default_model(MODEL)
        .with_session_ttl(Duration::from_secs(2 * 60 * 60))
}

pub fn resolver(connector: Arc<FakeConnector>, servers: BTreeMap<String, ToolServerConfig>) -> ToolResolver {
    ToolResolver::new(Arc::new(ToolServerPool::new(connector)))
        .with_legacy(legacy_tools())
        .with_servers(servers)
}

pub fn cache(script: &Arc<Script>, config: AiboxConfig) -> SessionAgentCache {
    let servers = config.mcp_servers.clone();
    SessionAgentCache::new(
        registry(script),
        Arc::new(resolver(FakeConnector::new(), servers)),
        config,
    )
}

pub fn service(script: &Arc<Script>) -> AgentService {
    AgentService::new(
        test_config(),
        registry(script),
        Arc::new(resolver(FakeConnector::new(), BTreeMap::new())),
        Arc::new(InMemorySessionStore::new()),
    )
}

/// Drain a run to the end of its stream.
pub async fn collect(run: &mut RunStream) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Some(event) = run.next().await {
        events.push(event);
    }
    events
}

/// Compact event names for order assertions.
pub fn kinds(events: &[RunEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| match event {
            RunEvent::RunStarted { .. } => "run_started".to_string(),
            RunEvent::TextMessageStart { .. } => "text_start".to_string(),
            RunEvent::TextDelta { delta, .. } => format!("text:{delta}"),
            RunEvent::TextMessageEnd { .. } => "text_end".to_string(),
            RunEvent::ReasoningMessageStart { .. } => "reasoning_start".to_string(),
            RunEvent::ReasoningDelta { delta, .. } => format!("reasoning:{delta}"),
            RunEvent::ReasoningMessageEnd { .. } => "reasoning_end".to_string(),
            RunEvent::ToolCallStart { tool_call_id, .. } => format!("tool_start:{tool_call_id}"),
            RunEvent::ToolCallArgsDelta { tool_call_id, .. } => format!("tool_args:{tool_call_id}"),
            RunEvent::ToolCallEnd { tool_call_id } => format!("tool_end:{tool_call_id}"),
            RunEvent::ToolCallResult { tool_call_id, .. } => format!("tool_result:{tool_call_id}"),
            RunEvent::RunError { .. } => "run_error".to_string(),
            RunEvent::RunFinished => "run_finished".to_string(),
        })
        .collect()
}
