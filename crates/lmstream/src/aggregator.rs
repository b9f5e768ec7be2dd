//! Incremental aggregation of streamed completion chunks.
//!
//! The aggregator consumes chunks one at a time and classifies every piece of text as
//! reasoning or answer, emitting events as soon as a chunk is processed. Tool call fragments
//! are buffered silently and only parsed once the stream has ended.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::models::chunk::{ChatChunk, ToolCallDelta};
use crate::models::event::{Answer, StreamEvent};
use crate::models::tool::ToolCall;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Key under which unparseable tool arguments are preserved.
pub const RAW_ARGUMENTS_KEY: &str = "_raw";

/// How reasoning markers inside content fragments are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkTagMode {
    /// Split fragments at each marker; a marker cut across chunks is still recognised.
    #[default]
    Split,
    /// Strip every marker from a fragment and attribute the whole remainder to the span
    /// that is active once all markers have been applied.
    WholeFragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanState {
    #[default]
    OutsideThink,
    InsideThink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Reasoning,
    Answer,
}

/// Reasoning span tracking plus the reasoning and answer accumulators of one request.
#[derive(Debug, Default)]
pub struct ThinkingState {
    span: SpanState,
    reasoning: String,
    answer: String,
    // Tail of the last fragment that could be the start of a marker
    carry: String,
}

impl ThinkingState {
    pub fn span(&self) -> SpanState {
        self.span
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    fn channel(&self) -> Channel {
        match self.span {
            SpanState::InsideThink => Channel::Reasoning,
            SpanState::OutsideThink => Channel::Answer,
        }
    }

    fn append(&mut self, channel: Channel, text: &str) {
        match channel {
            Channel::Reasoning => self.reasoning.push_str(text),
            Channel::Answer => self.answer.push_str(text),
        }
    }

    /// Classify a content fragment, updating the span state and accumulators.
    fn push_content(&mut self, fragment: &str, mode: ThinkTagMode) -> Vec<(Channel, String)> {
        let segments = match mode {
            ThinkTagMode::Split => self.split_fragment(fragment),
            ThinkTagMode::WholeFragment => self.whole_fragment(fragment),
        };
        for (channel, text) in &segments {
            self.append(*channel, text);
        }
        segments
    }

    fn split_fragment(&mut self, fragment: &str) -> Vec<(Channel, String)> {
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.push_str(fragment);

        let mut segments = Vec::new();
        let mut rest = buffer.as_str();
        loop {
            match next_marker(rest) {
                Some((at, marker, span)) => {
                    push_segment(&mut segments, self.channel(), &rest[..at]);
                    self.span = span;
                    rest = &rest[at + marker.len()..];
                }
                None => {
                    let split = rest.len() - partial_marker_len(rest);
                    push_segment(&mut segments, self.channel(), &rest[..split]);
                    self.carry = rest[split..].to_string();
                    break;
                }
            }
        }
        segments
    }

    fn whole_fragment(&mut self, fragment: &str) -> Vec<(Channel, String)> {
        let mut text = fragment.to_string();
        if text.contains(THINK_OPEN) {
            self.span = SpanState::InsideThink;
            text = text.replace(THINK_OPEN, "");
        }
        if text.contains(THINK_CLOSE) {
            self.span = SpanState::OutsideThink;
            text = text.replace(THINK_CLOSE, "");
        }

        let mut segments = Vec::new();
        push_segment(&mut segments, self.channel(), &text);
        segments
    }

    /// Release a held-back partial marker as ordinary text
    fn flush(&mut self) -> Option<(Channel, String)> {
        if self.carry.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.carry);
        let channel = self.channel();
        self.append(channel, &text);
        Some((channel, text))
    }
}

fn next_marker(text: &str) -> Option<(usize, &'static str, SpanState)> {
    let open = text
        .find(THINK_OPEN)
        .map(|at| (at, THINK_OPEN, SpanState::InsideThink));
    let close = text
        .find(THINK_CLOSE)
        .map(|at| (at, THINK_CLOSE, SpanState::OutsideThink));
    match (open, close) {
        (Some(open), Some(close)) => Some(if open.0 < close.0 { open } else { close }),
        (open, close) => open.or(close),
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of a marker
fn partial_marker_len(text: &str) -> usize {
    [THINK_OPEN, THINK_CLOSE]
        .iter()
        .filter_map(|marker| (1..marker.len()).rev().find(|&n| text.ends_with(&marker[..n])))
        .max()
        .unwrap_or(0)
}

fn push_segment(segments: &mut Vec<(Channel, String)>, channel: Channel, text: &str) {
    if text.is_empty() {
        return;
    }
    match segments.last_mut() {
        Some((last, buffered)) if *last == channel => buffered.push_str(text),
        _ => segments.push((channel, text.to_string())),
    }
}

#[derive(Debug, Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Tool call fragments grouped by call id, in first-seen order.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: Vec<PendingCall>,
    positions: HashMap<String, usize>,
    ids_by_index: HashMap<u32, String>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, fragment: &ToolCallDelta) {
        let id = self.resolve_id(fragment);
        let position = match self.positions.get(&id) {
            Some(position) => *position,
            None => {
                self.calls.push(PendingCall {
                    id: id.clone(),
                    ..Default::default()
                });
                self.positions.insert(id, self.calls.len() - 1);
                self.calls.len() - 1
            }
        };

        let call = &mut self.calls[position];
        if let Some(function) = &fragment.function {
            if let Some(name) = function.name.as_deref().filter(|name| !name.is_empty()) {
                call.name = name.to_string();
            }
            if let Some(arguments) = &function.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Parse the buffered arguments of every call. Unparseable text is kept under
    /// [`RAW_ARGUMENTS_KEY`].
    pub fn finalize(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    json!({})
                } else {
                    serde_json::from_str::<Value>(&call.arguments).unwrap_or_else(|e| {
                        tracing::debug!("Unparseable arguments for tool call {}: {}", call.id, e);
                        json!({ RAW_ARGUMENTS_KEY: call.arguments })
                    })
                };
                ToolCall::new(call.id, call.name, arguments)
            })
            .collect()
    }

    // Servers usually send the id only on the first fragment of a call; later fragments
    // carry just the index.
    fn resolve_id(&mut self, fragment: &ToolCallDelta) -> String {
        match fragment.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => {
                if let Some(index) = fragment.index {
                    self.ids_by_index.insert(index, id.to_string());
                }
                id.to_string()
            }
            None => {
                let index = fragment.index.unwrap_or(0);
                self.ids_by_index
                    .get(&index)
                    .cloned()
                    .unwrap_or_else(|| index.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregatorOptions {
    pub think_mode: ThinkTagMode,
    /// Suppress reasoning events
    pub hide_thinking: bool,
    /// Withhold answer events; the full text is decoded once the stream ends
    pub structured: bool,
}

/// What a finished stream accumulated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    pub reasoning: String,
    pub answer: String,
    pub tool_calls: Vec<ToolCall>,
}

/// The per-request stream state machine.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    options: AggregatorOptions,
    thinking: ThinkingState,
    tool_calls: ToolCallAccumulator,
}

impl StreamAggregator {
    pub fn new(options: AggregatorOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn thinking(&self) -> &ThinkingState {
        &self.thinking
    }

    /// Process one raw chunk payload. Payloads that do not have the shape of a chunk are
    /// skipped.
    pub fn push_value(&mut self, value: Value) -> Vec<StreamEvent> {
        match serde_json::from_value::<ChatChunk>(value) {
            Ok(chunk) => self.push_chunk(&chunk),
            Err(e) => {
                tracing::debug!("Skipping malformed chunk: {}", e);
                Vec::new()
            }
        }
    }

    /// Process one chunk, returning the events it produced in classification order.
    pub fn push_chunk(&mut self, chunk: &ChatChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let Some(delta) = chunk.delta() else {
            return events;
        };

        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            for (channel, text) in self.thinking.push_content(content, self.options.think_mode) {
                self.emit(&mut events, channel, text);
            }
        }

        if let Some(reasoning) = delta.reasoning_text().filter(|r| !r.is_empty()) {
            self.thinking.append(Channel::Reasoning, reasoning);
            self.emit(&mut events, Channel::Reasoning, reasoning.to_string());
        }

        if let Some(tool_calls) = &delta.tool_calls {
            for fragment in tool_calls {
                self.tool_calls.push(fragment);
            }
        }

        events
    }

    /// End of stream: flush held-back text and finalize the tool calls.
    pub fn finish(mut self) -> (Vec<StreamEvent>, Aggregate) {
        let mut events = Vec::new();
        if let Some((channel, text)) = self.thinking.flush() {
            self.emit(&mut events, channel, text);
        }

        let aggregate = Aggregate {
            reasoning: self.thinking.reasoning,
            answer: self.thinking.answer,
            tool_calls: self.tool_calls.finalize(),
        };
        (events, aggregate)
    }

    fn emit(&self, events: &mut Vec<StreamEvent>, channel: Channel, text: String) {
        match channel {
            Channel::Reasoning if !self.options.hide_thinking => {
                events.push(StreamEvent::Reasoning(text))
            }
            Channel::Answer if !self.options.structured => {
                events.push(StreamEvent::Answer(Answer::Text(text)))
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chunk::{Delta, FunctionDelta};

    fn content(text: &str) -> ChatChunk {
        serde_json::from_value(json!({"choices": [{"delta": {"content": text}}]})).unwrap()
    }

    fn reasoning(text: &str) -> ChatChunk {
        serde_json::from_value(json!({"choices": [{"delta": {"reasoning": text}}]})).unwrap()
    }

    fn tool_fragment(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> ToolCallDelta {
        ToolCallDelta {
            index: Some(index),
            id: id.map(String::from),
            function: Some(FunctionDelta {
                name: name.map(String::from),
                arguments: Some(args.to_string()),
            }),
        }
    }

    fn tool_chunk(fragments: Vec<ToolCallDelta>) -> ChatChunk {
        ChatChunk {
            choices: vec![crate::models::chunk::ChunkChoice {
                delta: Some(Delta {
                    tool_calls: Some(fragments),
                    ..Default::default()
                }),
            }],
        }
    }

    fn run(options: AggregatorOptions, chunks: &[ChatChunk]) -> (Vec<StreamEvent>, Aggregate) {
        let mut aggregator = StreamAggregator::new(options);
        let mut events: Vec<StreamEvent> = chunks
            .iter()
            .flat_map(|chunk| aggregator.push_chunk(chunk))
            .collect();
        let (tail, aggregate) = aggregator.finish();
        events.extend(tail);
        (events, aggregate)
    }

    fn answer(text: &str) -> StreamEvent {
        StreamEvent::Answer(Answer::Text(text.to_string()))
    }

    fn thought(text: &str) -> StreamEvent {
        StreamEvent::Reasoning(text.to_string())
    }

    #[test]
    fn test_plain_text_is_answer() {
        let options = AggregatorOptions {
            hide_thinking: true,
            ..Default::default()
        };
        let (events, aggregate) = run(options, &[content("Hello"), content(", world")]);

        assert_eq!(events, vec![answer("Hello"), answer(", world")]);
        assert_eq!(aggregate.answer, "Hello, world");
        assert_eq!(aggregate.reasoning, "");
    }

    #[test]
    fn test_markers_in_one_fragment_split() {
        let (events, aggregate) = run(
            AggregatorOptions::default(),
            &[content("<think>hello</think>world")],
        );

        assert_eq!(events, vec![thought("hello"), answer("world")]);
        assert_eq!(aggregate.reasoning, "hello");
        assert_eq!(aggregate.answer, "world");
    }

    #[test]
    fn test_markers_across_chunks() {
        let (events, aggregate) = run(
            AggregatorOptions::default(),
            &[
                content("<think>"),
                content("let me see"),
                content("</think>"),
                content("the answer"),
            ],
        );

        assert_eq!(events, vec![thought("let me see"), answer("the answer")]);
        assert_eq!(aggregate.reasoning, "let me see");
        assert_eq!(aggregate.answer, "the answer");
    }

    #[test]
    fn test_marker_cut_at_chunk_boundary() {
        let (events, aggregate) = run(
            AggregatorOptions::default(),
            &[content("<thi"), content("nk>plan</th"), content("ink>done")],
        );

        assert_eq!(events, vec![thought("plan"), answer("done")]);
        assert_eq!(aggregate.reasoning, "plan");
        assert_eq!(aggregate.answer, "done");
    }

    #[test]
    fn test_trailing_partial_marker_is_flushed() {
        let (events, aggregate) = run(AggregatorOptions::default(), &[content("a < b <")]);

        assert_eq!(events, vec![answer("a < b "), answer("<")]);
        assert_eq!(aggregate.answer, "a < b <");
    }

    #[test]
    fn test_stray_close_marker_is_stripped() {
        let (events, _) = run(AggregatorOptions::default(), &[content("reasoning</think>answer")]);
        assert_eq!(events, vec![answer("reasoninganswer")]);
    }

    #[test]
    fn test_whole_fragment_mode() {
        let options = AggregatorOptions {
            think_mode: ThinkTagMode::WholeFragment,
            ..Default::default()
        };
        let (events, aggregate) = run(
            options,
            &[
                content("<think>hello</think>world"),
                content("<think>pondering"),
                content("still"),
                content("done</think>"),
            ],
        );

        assert_eq!(
            events,
            vec![
                answer("helloworld"),
                thought("pondering"),
                thought("still"),
                answer("done"),
            ]
        );
        assert_eq!(aggregate.reasoning, "ponderingstill");
        assert_eq!(aggregate.answer, "helloworlddone");
    }

    #[test]
    fn test_reasoning_signal_ignores_span_state() {
        let (events, aggregate) = run(
            AggregatorOptions::default(),
            &[reasoning("step one. "), content("Answer"), reasoning("step two.")],
        );

        assert_eq!(
            events,
            vec![thought("step one. "), answer("Answer"), thought("step two.")]
        );
        assert_eq!(aggregate.reasoning, "step one. step two.");
        assert_eq!(aggregate.answer, "Answer");
    }

    #[test]
    fn test_hidden_thinking_still_accumulates() {
        let options = AggregatorOptions {
            hide_thinking: true,
            ..Default::default()
        };
        let (events, aggregate) = run(
            options,
            &[content("<think>secret</think>visible"), reasoning("more")],
        );

        assert_eq!(events, vec![answer("visible")]);
        assert_eq!(aggregate.reasoning, "secretmore");
    }

    #[test]
    fn test_structured_withholds_answer() {
        let options = AggregatorOptions {
            structured: true,
            ..Default::default()
        };
        let (events, aggregate) = run(options, &[content("{\"x\":"), content(" 1}")]);

        assert!(events.is_empty());
        assert_eq!(aggregate.answer, "{\"x\": 1}");
    }

    #[test]
    fn test_tool_arguments_concatenate() {
        let (events, aggregate) = run(
            AggregatorOptions::default(),
            &[
                tool_chunk(vec![tool_fragment(0, Some("call_1"), Some("f"), "{\"a\":1")]),
                tool_chunk(vec![tool_fragment(0, Some("call_1"), None, "}")]),
            ],
        );

        assert!(events.is_empty());
        assert_eq!(
            aggregate.tool_calls,
            vec![ToolCall::new("call_1", "f", json!({"a": 1}))]
        );
    }

    #[test]
    fn test_tool_fragments_without_id_follow_index() {
        let (_, aggregate) = run(
            AggregatorOptions::default(),
            &[
                tool_chunk(vec![
                    tool_fragment(0, Some("call_a"), Some("first"), ""),
                    tool_fragment(1, Some("call_b"), Some("second"), ""),
                ]),
                tool_chunk(vec![tool_fragment(1, None, None, "{\"y\":2}")]),
                tool_chunk(vec![tool_fragment(0, None, None, "{\"x\":1}")]),
            ],
        );

        assert_eq!(
            aggregate.tool_calls,
            vec![
                ToolCall::new("call_a", "first", json!({"x": 1})),
                ToolCall::new("call_b", "second", json!({"y": 2})),
            ]
        );
    }

    #[test]
    fn test_tool_call_without_any_id() {
        let (_, aggregate) = run(
            AggregatorOptions::default(),
            &[tool_chunk(vec![ToolCallDelta {
                index: None,
                id: None,
                function: Some(FunctionDelta {
                    name: Some("ping".into()),
                    arguments: None,
                }),
            }])],
        );

        assert_eq!(aggregate.tool_calls, vec![ToolCall::new("0", "ping", json!({}))]);
    }

    #[test]
    fn test_tool_name_not_overwritten_by_empty() {
        let mut accumulator = ToolCallAccumulator::default();
        accumulator.push(&tool_fragment(0, Some("c"), Some("lookup"), ""));
        accumulator.push(&tool_fragment(0, Some("c"), Some(""), "{}"));
        accumulator.push(&tool_fragment(0, Some("c"), Some("lookup_v2"), ""));

        assert_eq!(accumulator.len(), 1);
        assert_eq!(
            accumulator.finalize(),
            vec![ToolCall::new("c", "lookup_v2", json!({}))]
        );
    }

    #[test]
    fn test_bad_tool_arguments_preserved_raw() {
        let (_, aggregate) = run(
            AggregatorOptions::default(),
            &[tool_chunk(vec![tool_fragment(0, Some("c"), Some("f"), "{not json")])],
        );

        assert_eq!(
            aggregate.tool_calls[0].arguments,
            json!({ RAW_ARGUMENTS_KEY: "{not json" })
        );
    }

    #[test]
    fn test_malformed_and_empty_chunks_are_skipped() {
        let mut aggregator = StreamAggregator::new(AggregatorOptions::default());

        assert!(aggregator.push_value(json!({"choices": "nope"})).is_empty());
        assert!(aggregator.push_value(json!({"choices": []})).is_empty());
        assert!(aggregator
            .push_value(json!({"choices": [{"delta": {"content": null}}]}))
            .is_empty());
        assert_eq!(
            aggregator.push_value(json!({"choices": [{"delta": {"content": "ok"}}]})),
            vec![answer("ok")]
        );

        let (events, aggregate) = aggregator.finish();
        assert!(events.is_empty());
        assert_eq!(aggregate.answer, "ok");
    }

    #[test]
    fn test_span_state_tracks_markers() {
        let mut aggregator = StreamAggregator::new(AggregatorOptions::default());
        aggregator.push_chunk(&content("<think>a"));
        assert_eq!(aggregator.thinking().span(), SpanState::InsideThink);
        aggregator.push_chunk(&content("b</think>"));
        assert_eq!(aggregator.thinking().span(), SpanState::OutsideThink);
        assert_eq!(aggregator.thinking().reasoning(), "ab");
    }
}
