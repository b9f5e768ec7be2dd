use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

use crate::aggregator::{Aggregate, AggregatorOptions, StreamAggregator, ThinkTagMode};
use crate::dispatch::ToolDispatcher;
use crate::errors::{ConfigurationError, LlmError};
use crate::models::event::{Answer, StreamEvent, Summary};
use crate::models::message::Message;
use crate::models::tool::ToolSpec;
use crate::normalize::{normalize_messages, ImageCodec, PngCodec};
use crate::providers::base::Provider;
use crate::providers::control::ModelControl;
use crate::structured::decode_structured;
use crate::tool_schema::{compile_tools, CompiledTools, ToolRegistry};

/// Events of one completion, produced lazily as the server streams.
pub type EventStream = BoxStream<'static, StreamEvent>;

/// A single chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    /// Json schema the answer must follow. Answer text is withheld and decoded at the end.
    pub response_format: Option<Value>,
    pub hide_thinking: bool,
    /// Emit a `final` summary event before `done`
    pub include_final: bool,
    /// Ask the model backend to unload every other loaded model first
    pub unload_other_models: bool,
    /// Report failed tool invocations as `{"error": ...}` results instead of dropping them
    pub surface_tool_errors: bool,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_tool<T: Into<ToolSpec>>(mut self, tool: T) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn with_tools<I, T>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ToolSpec>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn with_response_format(mut self, schema: Value) -> Self {
        self.response_format = Some(schema);
        self
    }

    pub fn hide_thinking(mut self, hide: bool) -> Self {
        self.hide_thinking = hide;
        self
    }

    pub fn include_final(mut self, include: bool) -> Self {
        self.include_final = include;
        self
    }

    pub fn unload_other_models(mut self, unload: bool) -> Self {
        self.unload_other_models = unload;
        self
    }

    pub fn surface_tool_errors(mut self, surface: bool) -> Self {
        self.surface_tool_errors = surface;
        self
    }
}

/// Sends chat requests through a [`Provider`] and turns the chunk stream into [`StreamEvent`]s.
pub struct ChatClient {
    provider: Arc<dyn Provider>,
    codec: Arc<dyn ImageCodec>,
    control: Option<Arc<dyn ModelControl>>,
    think_mode: ThinkTagMode,
}

impl ChatClient {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            codec: Arc::new(PngCodec),
            control: None,
            think_mode: ThinkTagMode::default(),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn ImageCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_model_control(mut self, control: Arc<dyn ModelControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Choose how `<think>` markers inside content are classified. [`ThinkTagMode::Split`]
    /// (the default) cuts a fragment at each marker; [`ThinkTagMode::WholeFragment`] keeps the
    /// older behaviour of attributing the whole fragment to the span active after its markers.
    pub fn with_think_mode(mut self, think_mode: ThinkTagMode) -> Self {
        self.think_mode = think_mode;
        self
    }

    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Start a streaming completion.
    ///
    /// Configuration, content and transport errors are returned here, before any event is
    /// produced. Once the stream is open nothing fails: malformed chunks are skipped, and a
    /// transport error ends the stream early but still closes it normally. The stream always
    /// ends with exactly one [`StreamEvent::Done`].
    pub async fn response(&self, request: ChatRequest) -> Result<EventStream, LlmError> {
        let ChatRequest {
            mut messages,
            tools,
            response_format,
            hide_thinking,
            include_final,
            unload_other_models,
            surface_tool_errors,
        } = request;

        if messages.is_empty() {
            return Err(ConfigurationError::MissingMessages.into());
        }
        let CompiledTools { schemas, registry } = compile_tools(&tools)?;
        normalize_messages(
            &mut messages,
            self.codec.as_ref(),
            self.provider.image_dialect(),
        )?;

        if unload_other_models {
            self.unload_other_models().await;
        }

        let mut chunks = self
            .provider
            .stream(&messages, &schemas, response_format.as_ref())
            .await?;

        let options = AggregatorOptions {
            think_mode: self.think_mode,
            hide_thinking,
            structured: response_format.is_some(),
        };
        let closing = Closing {
            options,
            include_final,
            surface_tool_errors,
            registry,
        };
        let mut aggregator = StreamAggregator::new(options);

        let events = async_stream::stream! {
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(value) => {
                        for event in aggregator.push_value(value) {
                            yield event;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Stream ended early: {}", e);
                        break;
                    }
                }
            }

            let (flushed, aggregate) = aggregator.finish();
            for event in flushed {
                yield event;
            }
            for event in closing.events(aggregate) {
                yield event;
            }
        };

        Ok(events.boxed())
    }

    /// Run a completion to the end and return its summary.
    pub async fn complete(&self, request: ChatRequest) -> Result<Summary, LlmError> {
        let mut events = self.response(request.include_final(true)).await?;

        let mut summary = Summary::default();
        while let Some(event) = events.next().await {
            if let StreamEvent::Final(payload) = event {
                summary = payload;
            }
        }
        Ok(summary)
    }

    pub async fn loaded_models(&self) -> Result<Vec<String>, LlmError> {
        self.control()?.list_loaded().await
    }

    /// Token count of `text` for the configured model
    pub async fn count_tokens(&self, text: &str) -> Result<usize, LlmError> {
        self.control()?
            .count_tokens(self.provider.model(), text)
            .await
    }

    /// Context window of the configured model
    pub async fn context_length(&self) -> Result<u64, LlmError> {
        self.control()?.context_length(self.provider.model()).await
    }

    fn control(&self) -> Result<&dyn ModelControl, LlmError> {
        self.control
            .as_deref()
            .ok_or(LlmError::BackendUnavailable)
    }

    /// Best effort: failures are logged and the request goes ahead.
    async fn unload_other_models(&self) {
        let Some(control) = self.control.as_deref() else {
            tracing::warn!("Cannot unload other models: no model backend is configured");
            return;
        };

        let loaded = match control.list_loaded().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Could not list loaded models: {}", e);
                return;
            }
        };

        let keep = self.provider.model();
        for model in loaded.iter().filter(|model| model.as_str() != keep) {
            match control.unload(model).await {
                Ok(()) => tracing::info!("Unloaded model {}", model),
                Err(e) => tracing::warn!("Could not unload model {}: {}", model, e),
            }
        }
    }
}

/// Everything needed to close a stream once the last chunk arrived.
struct Closing {
    options: AggregatorOptions,
    include_final: bool,
    surface_tool_errors: bool,
    registry: ToolRegistry,
}

impl Closing {
    /// Structured answer, tool results, pending tool calls, summary, done.
    fn events(&self, aggregate: Aggregate) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        let answer = if self.options.structured {
            let answer = decode_structured(&aggregate.answer);
            events.push(StreamEvent::Answer(answer.clone()));
            answer
        } else {
            Answer::Text(aggregate.answer)
        };

        let outcome = ToolDispatcher::new(&self.registry)
            .surface_errors(self.surface_tool_errors)
            .dispatch(aggregate.tool_calls);
        events.extend(outcome.results.iter().cloned().map(StreamEvent::ToolResult));
        events.extend(outcome.pending.iter().cloned().map(StreamEvent::ToolCall));

        if self.include_final {
            let reasoning = Some(aggregate.reasoning)
                .filter(|reasoning| !self.options.hide_thinking && !reasoning.is_empty());
            events.push(StreamEvent::Final(Summary {
                reasoning,
                answer,
                tool_calls: outcome.pending,
                tool_results: outcome.results,
            }));
        }

        events.push(StreamEvent::Done);
        events
    }
}
