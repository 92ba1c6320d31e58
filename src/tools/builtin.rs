//! Built-in tools, available whenever the built-in tier is enabled.
//!
//! Provides `current_time`, `sleep`, and `http_request`. Each tool is
//! constructed via [`AgentTool::new`] and returned as `Arc<dyn Tool>`.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AiboxError;
use crate::tools::tool::{AgentTool, Tool, ToolExecutionContext};
use crate::tools::types::{AgentToolParameters, ToolTier};

const HTTP_BODY_MAX_BYTES: usize = 32_768;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const SLEEP_MAX_SECONDS: f64 = 300.0;

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }

    let mut cutoff = max_bytes;
    while cutoff > 0 && !s.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    s[..cutoff].to_string()
}

/// Create the `current_time` tool, which reports the current UTC time.
pub fn current_time_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "current_time",
            "Get the current date and time in UTC (ISO 8601)",
            AgentToolParameters::empty(),
            |_args, _ctx: ToolExecutionContext| async move {
                let now = chrono::Utc::now();
                Ok(serde_json::json!({
                    "iso8601": now.to_rfc3339(),
                    "unix": now.timestamp(),
                }))
            },
        )
        .with_tier(ToolTier::Builtin),
    )
}

/// Create the `sleep` tool, which pauses for a number of seconds (max 300).
pub fn sleep_tool() -> Arc<dyn Tool> {
    Arc::new(
        AgentTool::new(
            "sleep",
            "Pause execution for the given number of seconds",
            AgentToolParameters::object()
                .number("seconds", "Seconds to sleep (0-300)", true)
                .build(),
            |args, _ctx: ToolExecutionContext| async move {
                let seconds = args.get_f64("seconds")?;
                if !(0.0..=SLEEP_MAX_SECONDS).contains(&seconds) {
                    return Err(AiboxError::tool(
                        "sleep",
                        format!("seconds must be between 0 and {SLEEP_MAX_SECONDS}"),
                    ));
                }
                tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
                Ok(serde_json::json!({ "slept_seconds": seconds }))
            },
        )
        .with_tier(ToolTier::Builtin),
    )
}

/// Create the `http_request` tool, which performs a GET and returns the body.
///
/// Bodies beyond 32 KB are truncated with a flag in the response.
pub fn http_request_tool() -> Arc<dyn Tool> {
    let client = reqwest::Client::new();
    Arc::new(
        AgentTool::new(
            "http_request",
            "Fetch a URL with an HTTP GET request and return the response body",
            AgentToolParameters::object()
                .string("url", "Absolute http(s) URL to fetch", true)
                .build(),
            move |args, _ctx: ToolExecutionContext| {
                let client = client.clone();
                async move {
                    let url = args.get_str("url")?.to_string();
                    if !(url.starts_with("http://") || url.starts_with("https://")) {
                        return Err(AiboxError::tool("http_request", format!("unsupported url: {url}")));
                    }

                    let response = client
                        .get(&url)
                        .timeout(HTTP_TIMEOUT)
                        .send()
                        .await
                        .map_err(|e| AiboxError::tool("http_request", e.to_string()))?;
                    let status = response.status().as_u16();
                    let body = response
                        .text()
                        .await
                        .map_err(|e| AiboxError::tool("http_request", e.to_string()))?;

                    let truncated = body.len() > HTTP_BODY_MAX_BYTES;
                    let body = if truncated {
                        truncate_utf8(&body, HTTP_BODY_MAX_BYTES)
                    } else {
                        body
                    };

                    Ok(serde_json::json!({
                        "status": status,
                        "body": body,
                        "truncated": truncated,
                    }))
                }
            },
        )
        .with_tier(ToolTier::Builtin),
    )
}

/// All built-in tools in their advertised order.
pub fn all_tools() -> Vec<Arc<dyn Tool>> {
    vec![current_time_tool(), sleep_tool(), http_request_tool()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::arguments::ToolArguments;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn default_ctx() -> ToolExecutionContext {
        ToolExecutionContext::default()
    }

    fn args(json: serde_json::Value) -> ToolArguments {
        ToolArguments::new(json)
    }

    #[test]
    fn all_tools_are_builtin_tier() {
        let tools = all_tools();
        let names: Vec<_> = tools.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["current_time", "sleep", "http_request"]);
        assert!(tools.iter().all(|t| t.tier() == ToolTier::Builtin));
    }

    #[tokio::test]
    async fn current_time_returns_rfc3339() {
        let result = current_time_tool()
            .execute(&args(serde_json::json!({})), &default_ctx())
            .await
            .expect("current_time should succeed");
        let iso = result["iso8601"].as_str().expect("iso string");
        assert!(chrono::DateTime::parse_from_rfc3339(iso).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_waits_for_requested_duration() {
        let start = tokio::time::Instant::now();
        sleep_tool()
            .execute(&args(serde_json::json!({"seconds": 5})), &default_ctx())
            .await
            .expect("sleep should succeed");
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn sleep_rejects_out_of_range() {
        let err = sleep_tool()
            .execute(&args(serde_json::json!({"seconds": 9000})), &default_ctx())
            .await
            .expect_err("too long");
        assert!(matches!(err, AiboxError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn http_request_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_string("sunny"))
            .mount(&server)
            .await;

        let result = http_request_tool()
            .execute(
                &args(serde_json::json!({"url": format!("{}/forecast", server.uri())})),
                &default_ctx(),
            )
            .await
            .expect("request should succeed");

        assert_eq!(result["status"], 200);
        assert_eq!(result["body"], "sunny");
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn http_request_truncates_large_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(40_000)))
            .mount(&server)
            .await;

        let result = http_request_tool()
            .execute(&args(serde_json::json!({"url": server.uri()})), &default_ctx())
            .await
            .expect("request should succeed");

        assert_eq!(result["truncated"], true);
        assert_eq!(result["body"].as_str().map(str::len), Some(HTTP_BODY_MAX_BYTES));
    }

    #[tokio::test]
    async fn http_request_rejects_non_http_urls() {
        let err = http_request_tool()
            .execute(&args(serde_json::json!({"url": "file:///etc/passwd"})), &default_ctx())
            .await
            .expect_err("file urls are rejected");
        assert!(err.to_string().contains("unsupported url"));
    }

    #[test]
    fn truncate_utf8_never_splits_codepoints() {
        let s = "aé";
        assert_eq!(truncate_utf8(s, 2), "a");
    }
}
