//! tracechat - terminal chat client with a live thinking trace

mod config;
mod render;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use tracechat_core::{ChatSession, HttpConversationService};
use tracechat_wire::{ChatClient, ClientConfig};
use tracing_subscriber::EnvFilter;

use crate::render::{LiveMessage, print_conversation};

/// tracechat - chat with an agent and watch it think
#[derive(Parser, Debug)]
#[command(name = "tracechat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Base URL of the chat backend
    #[arg(long)]
    api_url: Option<String>,

    /// User whose conversations to use
    #[arg(short, long)]
    user: Option<String>,

    /// Skip undecodable stream frames instead of failing the response
    #[arg(long)]
    skip_bad_frames: bool,

    /// Send a single message in a new conversation and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

const HELP: &str = "\
Commands:
  /new          start a new conversation
  /list         list conversations
  /open <n>     open conversation n from /list
  /delete <n>   delete conversation n from /list
  /help         show this help
  /quit         exit
Anything else is sent as a message. Ctrl-C cancels a streaming response
and exits at the prompt.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup tracing
    if args.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("tracechat=debug,tracechat_core=debug,tracechat_wire=debug")
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let config = config::Config::load();
    let client_config = ClientConfig::new(
        config.api_url(args.api_url.as_deref()),
        config.user(args.user.as_deref()),
    )
    .context("invalid backend configuration")?;
    tracing::debug!(
        "Using backend {} as user {}",
        client_config.base_url(),
        client_config.user_id()
    );

    let service = HttpConversationService::new(ChatClient::new(client_config))
        .with_decode_policy(config.decode_policy(args.skip_bad_frames));
    let session = ChatSession::new(Arc::new(service));
    session.refresh().await;

    if let Some(message) = args.command {
        session.create().await;
        return send_and_render(&session, &message).await;
    }

    run_interactive(&session).await
}

async fn run_interactive(session: &ChatSession) -> anyhow::Result<()> {
    println!("tracechat - type /help for commands");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/new" => {
                session.create().await;
                println!("Started a new conversation");
            }
            "/list" => list_conversations(session),
            "/open" => match pick(session, arg) {
                Some(id) => {
                    session.select(&id).await?;
                    if let Some(conversation) = session.active() {
                        print_conversation(&conversation, &mut std::io::stdout())?;
                    }
                }
                None => println!("No such conversation: {}", arg),
            },
            "/delete" => match pick(session, arg) {
                Some(id) => {
                    session.delete(&id).await?;
                    println!("Deleted");
                }
                None => println!("No such conversation: {}", arg),
            },
            _ if command.starts_with('/') => println!("Unknown command {}, try /help", command),
            _ => {
                if session.active_id().is_none() {
                    session.create().await;
                }
                send_and_render(session, line).await?;
            }
        }
    }
    Ok(())
}

/// Read the next prompt line. `None` on EOF or when `interrupt` fires first.
async fn next_input<R>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = std::io::Result<()>>,
) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

fn list_conversations(session: &ChatSession) {
    let active = session.active_id();
    let conversations = session.conversations();
    if conversations.is_empty() {
        println!("No conversations yet");
    }
    for (i, conversation) in conversations.iter().enumerate() {
        let marker = if active.as_deref() == Some(conversation.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{}{:>3}. {}", marker, i + 1, conversation.title);
    }
}

/// Resolve a 1-based index from `/list` to a conversation id
fn pick(session: &ChatSession, arg: &str) -> Option<String> {
    let index: usize = arg.trim().parse().ok()?;
    session
        .conversations()
        .into_iter()
        .nth(index.checked_sub(1)?)
        .map(|c| c.id)
}

/// Send a message in the active conversation, redrawing on every update
async fn send_and_render(session: &ChatSession, text: &str) -> anyhow::Result<()> {
    let Some(id) = session.active_id() else {
        anyhow::bail!("no active conversation");
    };

    let cancel = CancellationToken::new();
    let mut revisions = session.subscribe();
    let mut live = LiveMessage::new();
    let mut stdout = std::io::stdout();

    let send = session.send(text, cancel.clone());
    tokio::pin!(send);

    loop {
        tokio::select! {
            result = &mut send => {
                if let Err(e) = result {
                    if e.is_rejection() {
                        println!("{}", e);
                        return Ok(());
                    }
                    return Err(e.into());
                }
                break;
            }
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(message) = session.snapshot(&id).and_then(|c| c.trailing().cloned()) {
                    live.update(&message, &mut stdout)?;
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel.is_cancelled() => {
                tracing::debug!("Cancelling stream for {}", id);
                cancel.cancel();
            }
        }
    }

    if let Some(message) = session.snapshot(&id).and_then(|c| c.trailing().cloned()) {
        live.update(&message, &mut stdout)?;
    }
    Ok(())
}
