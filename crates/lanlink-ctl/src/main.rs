//! lanlink-ctl — command-line interface for the lanlink daemon.

use anyhow::{Context, Result};

mod cmd;

use cmd::{messages, peers, status};

const DEFAULT_PORT: u16 = 8000;

fn print_usage() {
    println!("Usage: lanlink-ctl [--port <port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                     Show node identity and transport counters");
    println!("  peers                      List registered peers");
    println!("  peers add <id> <ip> <port> Register or refresh a peer");
    println!("  send <text...>             Broadcast a chat message");
    println!("  call <audio|video>         Broadcast a call request");
    println!("  shutdown                   Stop the daemon");
    println!();
    println!("Options:");
    println!("  --port <port>   API port (default: {})", DEFAULT_PORT);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port option
    let mut port = DEFAULT_PORT;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => status::cmd_status(port).await,
        ["shutdown"] => status::cmd_shutdown(port).await,
        ["peers"] => peers::cmd_peers(port).await,
        ["peers", "add", id, ip, peer_port] => peers::cmd_peer_add(port, id, ip, peer_port).await,
        ["send", text @ ..] if !text.is_empty() => messages::cmd_send(port, text.join(" ")).await,
        ["call", call_type @ ("audio" | "video")] => messages::cmd_call(port, call_type).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
