//! `attic`: the remote command-line client. Discovers a running
//! `AtticServer` by scanning for `attic-*.sock`, performs the opening
//! handshake, and either issues one command from the CLI or drops into an
//! interactive line-at-a-time session over the same socket.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::Parser;

use attic::ipc::{self, IpcResponse, LocalIpcTransport, UnixSocketTransport};

#[derive(Debug, Parser)]
#[command(name = "attic", about = "Remote client for the Atari 8-bit control-plane daemon")]
struct ClientConfig {
    /// Connect to this socket directly instead of discovering one.
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Directory to scan for `attic-*.sock` when `--socket` is not given.
    #[arg(long, default_value = "/tmp")]
    socket_dir: PathBuf,

    /// A single command to issue; if omitted, reads commands from stdin.
    command: Vec<String>,
}

fn connect(config: &ClientConfig) -> io::Result<UnixSocketTransport> {
    if let Some(path) = &config.socket {
        return UnixSocketTransport::connect(path);
    }
    let found = ipc::discover_servers()?;
    let path = found.first().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "no running AtticServer socket found")
    })?;
    UnixSocketTransport::connect(path)
}

fn issue(transport: &mut dyn LocalIpcTransport, line: &str) -> io::Result<bool> {
    transport.send_line(line)?;
    match transport.recv_line()? {
        Some(reply) => match ipc::parse_response(&reply) {
            Ok(IpcResponse::Ok(Some(payload))) => {
                println!("{payload}");
                Ok(true)
            }
            Ok(IpcResponse::Ok(None)) => Ok(true),
            Ok(IpcResponse::Err(message)) => {
                eprintln!("error: {message}");
                Ok(false)
            }
            Err(_) => {
                eprintln!("error: malformed response: {reply}");
                Ok(false)
            }
        },
        None => {
            eprintln!("error: connection closed");
            Ok(false)
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ClientConfig::parse();

    let mut transport = match connect(&config) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    };

    if ipc::handshake(&mut transport).is_err() {
        eprintln!("error: handshake with server failed");
        std::process::exit(1);
    }

    if !config.command.is_empty() {
        let line = config.command.join(" ");
        match issue(&mut transport, &line) {
            Ok(true) => std::process::exit(0),
            Ok(false) => std::process::exit(1),
            Err(err) => {
                eprintln!("error: {err}");
                std::process::exit(1);
            }
        }
    }

    let stdin = io::stdin();
    let mut exit_code = 0;
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match issue(&mut transport, &line) {
            Ok(true) => {}
            Ok(false) => exit_code = 1,
            Err(err) => {
                eprintln!("error: {err}");
                exit_code = 1;
                break;
            }
        }
        let _ = io::stdout().flush();
    }
    std::process::exit(exit_code);
}
