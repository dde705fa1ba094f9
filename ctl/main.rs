#![forbid(unsafe_code)]

//! `z5bot-ctl` — local CLI companion for `z5bot`.
//!
//! Connects to the IPC socket and sends JSON commands to the server. `say`
//! and `play` act as a chat client, so the bot can be played from a
//! terminal without any chat network.

use std::io::{BufRead, BufReader, Write};

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

type CtlResult<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Parser)]
#[command(
    name = "z5bot-ctl",
    about = "Local CLI for the z5bot server",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the server's `ipc_name` config).
    #[arg(long, default_value = "z5bot")]
    ipc_name: String,

    /// Chat id to speak as; one game per chat id.
    #[arg(long, default_value = "local")]
    chat_id: String,

    /// Display name sent with messages.
    #[arg(long)]
    from: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one chat message and print the replies.
    Say {
        /// Message text, e.g. `/select zork` or `open mailbox`.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },

    /// Read messages from stdin, one per line, until EOF.
    Play,

    /// List live sessions.
    List,

    /// Remove a session and kill its interpreter.
    Clear {
        /// Chat id to clear; defaults to `--chat-id`.
        chat_id: Option<String>,
    },

    /// Check that the server is reachable.
    Ping,
}

fn main() {
    let args = Cli::parse();
    let from = args
        .from
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "player".to_owned());

    let result = match &args.command {
        Command::Say { text } => {
            let request = message_request(&args.chat_id, &from, &text.join(" "));
            send_ipc_command(&args.ipc_name, &request).and_then(|response| print_response(&response))
        }
        Command::Play => play(&args.ipc_name, &args.chat_id, &from),
        Command::List => send_ipc_command(&args.ipc_name, &serde_json::json!({ "command": "list" }))
            .and_then(|response| print_response(&response)),
        Command::Clear { chat_id } => {
            let chat_id = chat_id.as_deref().unwrap_or(&args.chat_id);
            let request = serde_json::json!({ "command": "clear", "chat_id": chat_id });
            send_ipc_command(&args.ipc_name, &request).and_then(|response| print_response(&response))
        }
        Command::Ping => send_ipc_command(&args.ipc_name, &serde_json::json!({ "command": "ping" }))
            .and_then(|response| print_response(&response)),
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        eprintln!("Is z5bot running with ipc_name '{}'?", args.ipc_name);
        std::process::exit(1);
    }
}

fn message_request(chat_id: &str, from: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "command": "message",
        "chat_id": chat_id,
        "from": from,
        "text": text,
    })
}

/// Interactive loop over one connection.
fn play(ipc_name: &str, chat_id: &str, from: &str) -> CtlResult<()> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let stream = Stream::connect(name)?;
    let mut reader = BufReader::new(&stream);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            let request = message_request(chat_id, from, line.trim());
            let response = exchange(&stream, &mut reader, &request)?;
            print_response(&response)?;
        }
        write!(stdout, "> ")?;
        stdout.flush()?;
    }
    println!();
    Ok(())
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(ipc_name: &str, request: &serde_json::Value) -> CtlResult<serde_json::Value> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let stream = Stream::connect(name)?;
    let mut reader = BufReader::new(&stream);
    exchange(&stream, &mut reader, request)
}

fn exchange(
    mut stream: &Stream,
    reader: &mut BufReader<&Stream>,
    request: &serde_json::Value,
) -> CtlResult<serde_json::Value> {
    // Send request as a single JSON line.
    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut response_line = String::new();
    if reader.read_line(&mut response_line)? == 0 {
        return Err("server closed the connection".into());
    }

    Ok(serde_json::from_str(response_line.trim())?)
}

/// Print chat replies as plain text and everything else as pretty JSON.
fn print_response(response: &serde_json::Value) -> CtlResult<()> {
    let ok = response
        .get("ok")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if !ok {
        let err_msg = response
            .get("error")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown error");
        return Err(err_msg.into());
    }

    let Some(data) = response.get("data") else {
        println!("OK");
        return Ok(());
    };

    if let Some(replies) = data.get("replies").and_then(serde_json::Value::as_array) {
        for reply in replies.iter().filter_map(serde_json::Value::as_str) {
            println!("{reply}\n");
        }
    } else {
        println!("{}", serde_json::to_string_pretty(data)?);
    }
    Ok(())
}
