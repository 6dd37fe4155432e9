//! Parley: chat server and command-line assistant.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use parley_chat::prompts::CHAT_SYSTEM_PROMPT;
use parley_chat::{ChatMessage, ChatModel, ChatRequest, StreamChunk};
use parley_core::{ParleyConfig, Role};
use parley_server::state::build_model;
use parley_server::{build_router, AppState};
use parley_store::{ConversationStore, InMemoryConversationStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ParleyConfig::from_env()?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.default_log_level())),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    // Handle CLI subcommands
    match args.get(1).map(String::as_str) {
        None | Some("serve") => serve(config).await,
        Some("ask") => {
            if args.len() < 3 {
                eprintln!("Usage: parley ask <question>");
                std::process::exit(1);
            }
            ask(&config, &args[2..].join(" ")).await
        }
        Some("chat") => chat(&config).await,
        Some("--help") | Some("-h") | Some("help") => {
            println!("Parley: conversational movie assistant");
            println!();
            println!("Usage: parley [command]");
            println!();
            println!("Commands:");
            println!("  serve                    Start the server (default)");
            println!("  ask <question>           Ask a single question and print the answer");
            println!("  chat                     Interactive chat with conversation memory");
            println!("  help                     Show this help message");
            Ok(())
        }
        Some(other) => {
            eprintln!("Unknown command: {}. Use 'parley help' for usage.", other);
            std::process::exit(1);
        }
    }
}

async fn serve(config: ParleyConfig) -> anyhow::Result<()> {
    let port = config.port;
    let state = Arc::new(AppState::from_config(config).await);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Parley server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn require_model(config: &ParleyConfig) -> anyhow::Result<Arc<dyn ChatModel>> {
    build_model(config, reqwest::Client::new()).with_context(|| {
        format!(
            "No credentials for OPENAI_HOST={}; set GITHUB_TOKEN, OPENAI_KEY or LOCAL_OPENAI_ENDPOINT",
            config.host
        )
    })
}

/// One-shot prompt.
async fn ask(config: &ParleyConfig, question: &str) -> anyhow::Result<()> {
    let model = require_model(config)?;
    let request = ChatRequest::new(vec![
        ChatMessage::system(CHAT_SYSTEM_PROMPT),
        ChatMessage::user(question),
    ])
    .with_temperature(config.temperature);

    let completion = model.complete(request).await?;
    println!("{}", completion.content);
    Ok(())
}

/// Read-eval-print loop; the conversation lives in memory for the session.
async fn chat(config: &ParleyConfig) -> anyhow::Result<()> {
    let model = require_model(config)?;
    let store = InMemoryConversationStore::new();
    let conversation_id = store.create_conversation().await?;

    println!("Chatting with {}. Type 'exit' to quit.", model.model_name());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        store.add_message(&conversation_id, Role::User, input).await?;

        let mut messages = vec![ChatMessage::system(CHAT_SYSTEM_PROMPT)];
        messages.extend(
            store
                .get_messages(&conversation_id)
                .await?
                .into_iter()
                .map(|m| ChatMessage::new(m.role, m.content)),
        );

        let mut stream = model.stream(ChatRequest::new(messages).with_temperature(config.temperature));
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Token(text) => {
                    print!("{}", text);
                    std::io::stdout().flush()?;
                    reply.push_str(&text);
                }
                StreamChunk::ToolCalls(_) => {}
                StreamChunk::Done { .. } => break,
                StreamChunk::Error(e) => anyhow::bail!("Chat failed: {}", e),
            }
        }
        println!();

        store
            .add_message(&conversation_id, Role::Assistant, &reply)
            .await?;
    }

    Ok(())
}
