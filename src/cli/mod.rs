//! CLI entry point for Bujji.

use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

use crate::config::BujjiConfig;
use crate::error::{BujjiError, Result};
use crate::stream::{ChatEvent, ChatService, RunRequest, TurnDocument};
use crate::types::{parse_response_mode, ResponseMode};

/// Bujji conversational agent CLI
#[derive(Parser, Debug)]
#[command(name = "bujji", version, about = "Bujji conversational agent CLI")]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the agent one question
    Chat(ChatArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// User prompt
    pub prompt: String,

    /// Model to use (provider:model, or a bare Groq model name)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Response mode: Casual, Scientific, Story, Kids or Auto
    #[arg(long, default_value = "Auto", value_parser = parse_mode)]
    pub mode: ResponseMode,

    /// Reflect privately before answering
    #[arg(long)]
    pub self_discussion: bool,

    /// Tool to call up front; repeat for several
    #[arg(long = "tool", value_name = "NAME")]
    pub tools: Vec<String>,

    /// Continue an existing conversation
    #[arg(long)]
    pub session: Option<String>,

    /// User the conversation belongs to
    #[arg(long, default_value = "local")]
    pub user: String,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

fn parse_mode(value: &str) -> std::result::Result<ResponseMode, String> {
    parse_response_mode(value).map_err(|e| e.to_string())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "bujji=debug" } else { "bujji=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run `bujji chat`: stream the turn to the terminal.
pub async fn handle_chat(args: ChatArgs, verbose: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => BujjiConfig::load(path)?,
        None => BujjiConfig::from_env(),
    };
    let service = ChatService::from_config(&config)?;

    let mut request = RunRequest::new(args.prompt, args.user)
        .with_response_mode(args.mode)
        .with_self_discussion(args.self_discussion)
        .with_pre_tools(args.tools)
        .with_verbose(verbose);
    if let Some(session) = args.session {
        request = request.with_session(session);
    }
    if let Some(model) = args.model {
        request = request.with_model(model);
    }

    let mut events = service.run(request);
    let mut document = TurnDocument::new();
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        document.apply(&event);
        if args.json {
            writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            continue;
        }
        render(&event, &mut stdout)?;
    }
    stdout.flush()?;

    match document.error {
        Some(message) => Err(BujjiError::Stream(message)),
        None => Ok(()),
    }
}

fn render(event: &ChatEvent, out: &mut impl Write) -> Result<()> {
    match event {
        ChatEvent::NewConversation { conversation_id, .. } => {
            eprintln!("conversation {conversation_id}");
        }
        ChatEvent::SelfDiscussionStart { .. } => eprintln!("thinking..."),
        ChatEvent::Delta { text, .. } => eprint!("{text}"),
        ChatEvent::SelfDiscussionEnd { .. } => eprintln!(),
        ChatEvent::ToolCallResponse { response, .. } => {
            eprintln!("[{}] {}", response.tool_name, truncate(&response.content, 200));
        }
        ChatEvent::FinalResponse { text, .. } => {
            write!(out, "{text}")?;
            out.flush()?;
        }
        ChatEvent::Done { saved, elapsed_ms, .. } => {
            writeln!(out)?;
            if !saved {
                eprintln!("response not saved");
            }
            eprintln!("done in {elapsed_ms}ms");
        }
        ChatEvent::Error { message, .. } => eprintln!("\nerror: {message}"),
        ChatEvent::InitNode { .. } | ChatEvent::ToolCallStart { .. } | ChatEvent::ToolCallEnd { .. } => {}
    }
    Ok(())
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
