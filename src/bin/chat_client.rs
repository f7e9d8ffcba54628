//! Interactive Chat Client - Entry Point
//!
//! Registers a name, prints incoming packets, and sends typed lines as chat
//! messages until `/exit` or end of input.

use std::env;
use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use chat_relay::console::{render, ConsoleInput, EXIT_COMMAND};
use chat_relay::{read_packet, write_packet, FrameError, PacketType};

/// Default server address
const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let addr = env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("Enter your name: ");
    std::io::stdout().flush()?;
    let name = lines.next_line().await?.unwrap_or_default();
    let name = name.trim();
    if name.is_empty() {
        println!("Name is required. Program terminated.");
        return Ok(());
    }

    let stream = match TcpStream::connect(&addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("Server connection failed: {}", e);
            return Err(e.into());
        }
    };
    let (mut reader, mut writer) = stream.into_split();

    write_packet(&mut writer, PacketType::RegisterName, name).await?;
    println!("'{}' entered. (type '{}' to escape.)", name, EXIT_COMMAND);

    // Receive task (server -> stdout)
    let mut receive_task = tokio::spawn(async move {
        loop {
            match read_packet(&mut reader).await {
                Ok(packet) => println!("{}", render(&packet)),
                Err(FrameError::ConnectionClosed) => break,
                Err(e) => {
                    debug!("Receive error: {}", e);
                    break;
                }
            }
        }
    });

    // Send loop (stdin -> server)
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let input = match line? {
                    Some(line) => ConsoleInput::parse(&line),
                    None => Some(ConsoleInput::Exit),
                };
                match input {
                    Some(ConsoleInput::Exit) => {
                        if let Err(e) = write_packet(&mut writer, PacketType::DisconnectRequest, "").await {
                            debug!("Failed to send disconnect request: {}", e);
                        }
                        break;
                    }
                    Some(ConsoleInput::Chat(text)) => {
                        if let Err(e) = write_packet(&mut writer, PacketType::ChatMessage, &text).await {
                            error!("Message could not be sent. Server disconnected: {}", e);
                            break;
                        }
                    }
                    None => {}
                }
            }
            _ = &mut receive_task => break,
        }
    }

    drop(writer);
    receive_task.abort();
    println!("Chat disconnected.");

    Ok(())
}
