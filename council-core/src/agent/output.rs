//! Output streaming and parsing for the Claude Code stream-json format

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::budget::Usage;
use crate::{Error, Result};

/// A message from the Claude Code stream-json output
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// System message at the start
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Assistant text output
    Assistant {
        #[serde(default)]
        message: AssistantMessage,
    },

    /// Tool usage by the assistant
    ToolUse {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    /// Result from tool execution
    ToolResult {
        #[serde(default)]
        output: String,
        #[serde(default)]
        is_error: bool,
    },

    /// Final result with usage information
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default, alias = "cost")]
        usage: Option<CostInfo>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        duration_api_ms: Option<u64>,
    },

    /// Any message type we do not act on (e.g. echoed `user` turns)
    #[serde(other)]
    Other,
}

/// Assistant message content: either a plain string or a list of blocks
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl MessageContent {
    /// Concatenated text of every text block
    pub fn text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Token counts reported in the final result
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CostInfo {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, alias = "cache_read_input_tokens")]
    pub cache_read_tokens: Option<u64>,
    #[serde(default, alias = "cache_creation_input_tokens")]
    pub cache_write_tokens: Option<u64>,
}

/// What the terminal `result` message carried
#[derive(Debug, Clone, Default)]
pub struct ResultSummary {
    pub result: Option<String>,
    pub is_error: bool,
    pub usage: Option<Usage>,
}

impl ResultSummary {
    fn from_parts(
        result: Option<String>,
        is_error: bool,
        cost: Option<CostInfo>,
        total_cost_usd: Option<f64>,
        duration_ms: Option<u64>,
    ) -> Self {
        let usage = cost.map(|c| Usage {
            input_units: c.input_tokens,
            output_units: c.output_tokens,
            cached_units: c.cache_read_tokens.unwrap_or(0),
            cost: total_cost_usd.unwrap_or(0.0),
            duration_ms: duration_ms.unwrap_or(0),
        });
        Self {
            result,
            is_error,
            usage,
        }
    }
}

/// Handler for processing stream messages
pub trait StreamHandler: Send {
    /// Called when a system message is received
    fn on_system(&mut self, _subtype: Option<&str>, _session_id: Option<&str>) {}

    /// Called when assistant text is received
    fn on_assistant_text(&mut self, text: &str);

    /// Called when the assistant uses a tool
    fn on_tool_use(&mut self, _tool: &str, _input: &serde_json::Value) {}

    /// Called when a tool returns a result
    fn on_tool_result(&mut self, _output: &str, _is_error: bool) {}

    /// Called when the stream completes
    fn on_complete(&mut self, _summary: &ResultSummary) {}

    /// Called for lines that are not stream-json (allows handler to keep or skip them)
    fn on_parse_error(&mut self, _line: &str, _error: &serde_json::Error) {}
}

/// Handler that accumulates everything a run produced
#[derive(Debug, Default)]
pub struct CollectingHandler {
    assistant_text: String,
    raw_text: String,
    summary: Option<ResultSummary>,
    tool_calls: usize,
}

impl CollectingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The final reply: the result text if present, else the streamed
    /// assistant text, else any non-JSON output
    pub fn text(&self) -> String {
        if let Some(result) = self.summary.as_ref().and_then(|s| s.result.as_ref()) {
            if !result.trim().is_empty() {
                return result.clone();
            }
        }
        if !self.assistant_text.trim().is_empty() {
            return self.assistant_text.clone();
        }
        self.raw_text.clone()
    }

    pub fn usage(&self) -> Option<Usage> {
        self.summary.as_ref().and_then(|s| s.usage)
    }

    pub fn is_error(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| s.is_error)
    }

    pub fn tool_calls(&self) -> usize {
        self.tool_calls
    }
}

impl StreamHandler for CollectingHandler {
    fn on_assistant_text(&mut self, text: &str) {
        self.assistant_text.push_str(text);
    }

    fn on_tool_use(&mut self, tool: &str, _input: &serde_json::Value) {
        tracing::debug!(tool, "Collaborator tool call");
        self.tool_calls += 1;
    }

    fn on_complete(&mut self, summary: &ResultSummary) {
        self.summary = Some(summary.clone());
    }

    fn on_parse_error(&mut self, line: &str, _error: &serde_json::Error) {
        self.raw_text.push_str(line);
        self.raw_text.push('\n');
    }
}

/// Stream line-delimited JSON output from a collaborator process
pub struct OutputStreamer<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> OutputStreamer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Stream output, calling the handler for each message
    ///
    /// Returns when the stream ends (process closes stdout)
    pub async fn stream<H: StreamHandler>(&mut self, handler: &mut H) -> Result<()> {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await.map_err(Error::Io)?;

            if bytes_read == 0 {
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<StreamMessage>(trimmed) {
                Ok(msg) => Self::dispatch_message(handler, msg),
                Err(e) => handler.on_parse_error(trimmed, &e),
            }
        }

        Ok(())
    }

    fn dispatch_message<H: StreamHandler>(handler: &mut H, msg: StreamMessage) {
        match msg {
            StreamMessage::System {
                subtype,
                session_id,
            } => {
                handler.on_system(subtype.as_deref(), session_id.as_deref());
            }
            StreamMessage::Assistant { message } => {
                handler.on_assistant_text(&message.content.text());
            }
            StreamMessage::ToolUse { tool, input } => {
                handler.on_tool_use(&tool, &input);
            }
            StreamMessage::ToolResult { output, is_error } => {
                handler.on_tool_result(&output, is_error);
            }
            StreamMessage::Result {
                result,
                is_error,
                usage,
                total_cost_usd,
                duration_ms,
                ..
            } => {
                let summary =
                    ResultSummary::from_parts(result, is_error, usage, total_cost_usd, duration_ms);
                handler.on_complete(&summary);
            }
            StreamMessage::Other => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assistant_string_content() {
        let json = r#"{"type":"assistant","message":{"content":"Hello world"}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Assistant { message } => {
                assert_eq!(message.content.text(), "Hello world");
            }
            _ => panic!("Expected Assistant message"),
        }
    }

    #[test]
    fn test_parse_assistant_blocks() {
        let json = r#"{"type":"assistant","message":{"id":"m1","content":[{"type":"text","text":"a"},{"type":"tool_use","name":"Read"},{"type":"text","text":"b"}]}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Assistant { message } => assert_eq!(message.content.text(), "ab"),
            _ => panic!("Expected Assistant message"),
        }
    }

    #[test]
    fn test_parse_result_with_usage() {
        let json = r#"{"type":"result","subtype":"success","is_error":false,"result":"done","total_cost_usd":0.12,"duration_ms":1234,"usage":{"input_tokens":100,"output_tokens":50,"cache_read_input_tokens":7}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        match msg {
            StreamMessage::Result {
                result,
                usage,
                total_cost_usd,
                duration_ms,
                ..
            } => {
                let summary =
                    ResultSummary::from_parts(result, false, usage, total_cost_usd, duration_ms);
                let usage = summary.usage.unwrap();
                assert_eq!(usage.input_units, 100);
                assert_eq!(usage.output_units, 50);
                assert_eq!(usage.cached_units, 7);
                assert_eq!(usage.duration_ms, 1234);
                assert_eq!(summary.result.as_deref(), Some("done"));
            }
            _ => panic!("Expected Result message"),
        }
    }

    #[test]
    fn test_unknown_type_is_other() {
        let json = r#"{"type":"user","message":{"content":[]}}"#;
        let msg: StreamMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, StreamMessage::Other));
    }

    #[tokio::test]
    async fn test_collecting_handler_prefers_result() {
        let input = concat!(
            r#"{"type":"system","subtype":"init","session_id":"abc"}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"thinking"}]}}"#,
            "\n\n",
            r#"{"type":"result","is_error":false,"result":"final","usage":{"input_tokens":3,"output_tokens":4}}"#,
            "\n"
        );
        let mut handler = CollectingHandler::new();
        OutputStreamer::new(input.as_bytes())
            .stream(&mut handler)
            .await
            .unwrap();

        assert_eq!(handler.text(), "final");
        assert_eq!(handler.usage().unwrap().total_units(), 7);
        assert!(!handler.is_error());
    }

    #[tokio::test]
    async fn test_collecting_handler_keeps_plain_text() {
        let input = "not json\nNO ISSUES FOUND\n";
        let mut handler = CollectingHandler::new();
        OutputStreamer::new(input.as_bytes())
            .stream(&mut handler)
            .await
            .unwrap();

        assert_eq!(handler.text(), "not json\nNO ISSUES FOUND\n");
        assert!(handler.usage().is_none());
    }
}
