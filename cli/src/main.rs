mod store;
mod transport;
mod view;

use std::io::{self, BufRead, Write};

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use protocol::Chunk;

use store::{ConversationStore, RequestStatus};
use transport::{CliError, stream_chat};

const VIEW_WIDTH: usize = 80;

#[derive(Parser, Debug)]
#[command(name = "streamchat", about = "Terminal client for the streaming chat endpoint")]
struct Cli {
    #[arg(long, env = "STREAMCHAT_BASE_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the server is up.
    Ping,
    /// Interactive conversation on stdin (default).
    Chat,
    /// Send one message and print the reply.
    Ask { text: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Ping => run_ping(&client, &cli.base_url).await,
        Command::Chat => run_chat(&client, &cli.base_url).await,
        Command::Ask { text } => {
            let mut store = ConversationStore::new();
            store.set_input(text);
            exchange(&client, &cli.base_url, &mut store).await?;
            match store.error() {
                Some(reason) => Err(CliError::Transport(reason.to_owned())),
                None => Ok(()),
            }
        }
    }
}

async fn run_ping(client: &reqwest::Client, base_url: &str) -> Result<(), CliError> {
    let url = format!("{}/healthz", base_url.trim_end_matches('/'));
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(CliError::Status { status: status.as_u16(), message: "health check failed".to_owned() });
    }
    println!("ok");
    Ok(())
}

async fn run_chat(client: &reqwest::Client, base_url: &str) -> Result<(), CliError> {
    let mut store = ConversationStore::new();
    print!("{}", view::format_view(store.messages(), store.status(), VIEW_WIDTH));
    println!("Commands: /history, /quit");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        match line.trim() {
            "/quit" => return Ok(()),
            "/history" => {
                print!("{}", view::format_view(store.messages(), store.status(), VIEW_WIDTH));
            }
            _ => {
                store.set_input(line.trim_end_matches(['\r', '\n']));
                exchange(client, base_url, &mut store).await?;
            }
        }
    }
}

/// Submit the pending input and print the reply as it streams.
async fn exchange(client: &reqwest::Client, base_url: &str, store: &mut ConversationStore) -> Result<(), CliError> {
    let Some(request) = store.submit_input() else {
        return Ok(());
    };

    let mut chunks = match stream_chat(client, base_url, &request).await {
        Ok(chunks) => chunks,
        Err(e) => {
            store.fail(e.to_string());
            eprintln!("error: {e}");
            return Ok(());
        }
    };

    let mut stdout = io::stdout();
    while let Some(next) = chunks.next().await {
        match next {
            Ok(chunk) => {
                print_chunk(&mut stdout, &chunk)?;
                store.apply(&chunk);
            }
            Err(e) => {
                store.fail(e.to_string());
                break;
            }
        }
        if store.status() != RequestStatus::Streaming {
            break;
        }
    }
    store.complete();
    writeln!(stdout)?;

    if let Some(reason) = store.error() {
        eprintln!("error: {reason}");
    }
    Ok(())
}

fn print_chunk(out: &mut impl Write, chunk: &Chunk) -> io::Result<()> {
    match chunk {
        Chunk::TextDelta { delta, .. } => {
            write!(out, "{delta}")?;
            out.flush()
        }
        Chunk::ToolInputAvailable { tool_name, .. } => writeln!(out, "[{tool_name}: running]"),
        Chunk::ToolOutputError { error_text, .. } => writeln!(out, "[tool failed: {error_text}]"),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
