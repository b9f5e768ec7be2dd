mod configuration;
mod error;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use cliclack::{input, spinner};
use console::style;
use futures::StreamExt;
use serde_json::{json, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use configuration::{Overrides, Settings};
use lmstream::client::{ChatClient, ChatRequest};
use lmstream::models::event::{Answer, StreamEvent};
use lmstream::models::message::Message;
use lmstream::models::tool::{ParamType, Tool};
use lmstream::providers::configs::ImageDialect;
use lmstream::providers::control::LmStudioControl;
use lmstream::providers::openai::OpenAiCompatibleProvider;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Model to use (can also be set via LMSTREAM_PROVIDER__MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Base url of the openai compatible api (can also be set via LMSTREAM_PROVIDER__HOST)
    #[arg(long)]
    host: Option<String>,

    /// API key (can also be set via LMSTREAM_PROVIDER__API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Image file to attach to the first message, may be repeated
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Json schema file the answers must follow
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Do not show the model's reasoning
    #[arg(long)]
    hide_thinking: bool,

    /// Unload every other model loaded in LM Studio before each request
    #[arg(long)]
    unload_others: bool,

    /// How images are sent, overriding LMSTREAM_PROVIDER__IMAGE_DIALECT
    #[arg(long, value_enum)]
    image_dialect: Option<ImageDialectArg>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ImageDialectArg {
    /// Send every image inline as a base64 data uri
    Embed,
    /// Forward image paths and urls for the server to resolve
    Passthrough,
}

impl From<ImageDialectArg> for ImageDialect {
    fn from(arg: ImageDialectArg) -> Self {
        match arg {
            ImageDialectArg::Embed => ImageDialect::Embed,
            ImageDialectArg::Passthrough => ImageDialect::Passthrough,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = Settings::new(&Overrides {
        model: cli.model.clone(),
        host: cli.host.clone(),
        api_key: cli.api_key.clone(),
    })?;

    let mut config = settings.provider.into_config();
    if let Some(dialect) = cli.image_dialect {
        config.image_dialect = dialect.into();
    }
    let provider = OpenAiCompatibleProvider::new(config)?;
    let control = LmStudioControl::new(settings.control.into_config())?;
    let client = ChatClient::new(Arc::new(provider)).with_model_control(Arc::new(control));

    let schema = match &cli.schema {
        Some(path) => Some(read_schema(path)?),
        None => None,
    };

    let word_count_tool = Tool::new("count_words", "Count the number of words in text", |args| {
        let text = args
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        Ok(json!({ "count": text.split_whitespace().count() }))
    })
    .with_param("text", ParamType::String);

    println!(
        "lmstream chat with {} {}",
        style(client.provider().model()).bold(),
        style("- type \"exit\" to end the session").dim()
    );
    println!("\n");

    let mut history: Vec<Message> = Vec::new();
    let mut attachments = cli.images.clone();

    loop {
        let message_text: String = input("Message:").placeholder("").multiline().interact()?;

        if message_text.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        let mut message = Message::user().with_text(&message_text);
        for path in attachments.drain(..) {
            message = message.with_image_path(path);
        }
        history.push(message);

        let mut request = ChatRequest::new(history.clone())
            .with_tool(word_count_tool.clone())
            .hide_thinking(cli.hide_thinking)
            .unload_other_models(cli.unload_others);
        if let Some(schema) = &schema {
            request = request.with_response_format(schema.clone());
        }

        let spin = spinner();
        spin.start("awaiting reply");

        let mut events = match client.response(request).await {
            Ok(events) => events,
            Err(e) => {
                spin.error(e.to_string());
                history.pop();
                continue;
            }
        };

        let mut waiting = true;
        let mut answer = String::new();
        while let Some(event) = events.next().await {
            if waiting {
                spin.stop("");
                waiting = false;
            }
            render(&event, &mut answer)?;
        }
        println!("\n");

        history.push(Message::assistant().with_text(answer));
    }
    Ok(())
}

fn read_schema(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read schema file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Schema file {} is not valid json", path.display()))
}

/// Print one event as it arrives, collecting the answer text for the history.
fn render(event: &StreamEvent, answer: &mut String) -> Result<()> {
    let mut stdout = io::stdout();
    match event {
        StreamEvent::Reasoning(text) => write!(stdout, "{}", style(text).dim())?,
        StreamEvent::Answer(Answer::Text(text)) => {
            answer.push_str(text);
            write!(stdout, "{}", text)?;
        }
        StreamEvent::Answer(Answer::Structured(value)) => {
            answer.push_str(&value.to_string());
            writeln!(stdout, "{}", serde_json::to_string_pretty(value)?)?;
        }
        StreamEvent::ToolCall(call) => writeln!(
            stdout,
            "\n{} {} {}",
            style("tool call").cyan(),
            style(&call.name).bold(),
            call.arguments
        )?,
        StreamEvent::ToolResult(output) => writeln!(
            stdout,
            "\n{} {} {}",
            style("tool result").green(),
            style(&output.name).bold(),
            output.result
        )?,
        StreamEvent::Final(_) | StreamEvent::Done => {}
    }
    stdout.flush()?;
    Ok(())
}
