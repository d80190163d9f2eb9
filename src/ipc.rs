//! Local IPC transport and wire protocol (§6): a newline-delimited text
//! protocol carried over a Unix domain socket at `/tmp/attic-<pid>.sock`,
//! used by an external `attic` client to drive the same dispatcher the
//! REPL uses. The client library performs a `ping`/`ok pong` handshake
//! automatically on connect.

use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::{parse_addr, parse_number, parse_registers, split_first_token, Command};
use crate::error::IpcError;

/// §5: "IPC reads have a 5-second default read timeout."
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

pub fn socket_path(pid: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/attic-{pid}.sock"))
}

/// Scans `/tmp` for `attic-*.sock` entries; the discovery mechanism a
/// client uses to find a running server without knowing its pid in advance.
pub fn discover_servers() -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir("/tmp")? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("attic-") && name.ends_with(".sock") {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// A bidirectional, newline-terminated byte stream between a client and a
/// server process. `recv_line` returns `Ok(None)` on a clean EOF.
pub trait LocalIpcTransport: Send {
    fn send_line(&mut self, line: &str) -> io::Result<()>;
    fn recv_line(&mut self) -> io::Result<Option<String>>;
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// The real transport, backed by a connected [`UnixStream`].
pub struct UnixSocketTransport {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
}

impl UnixSocketTransport {
    fn from_stream(stream: UnixStream) -> io::Result<Self> {
        stream.set_read_timeout(Some(DEFAULT_READ_TIMEOUT))?;
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    pub fn connect(path: &Path) -> io::Result<Self> {
        Self::from_stream(UnixStream::connect(path)?)
    }
}

impl LocalIpcTransport for UnixSocketTransport {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.stream.write_all(line.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = String::new();
        let n = self.reader.read_line(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }
}

/// Server-side listening socket, removed from `/tmp` on drop (§6: "created
/// by the server at startup and removed at shutdown").
pub struct IpcServer {
    listener: UnixListener,
    pub path: PathBuf,
}

impl IpcServer {
    pub fn bind(pid: u32) -> io::Result<Self> {
        let path = socket_path(pid);
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        tracing::info!(path = %path.display(), "IPC server listening");
        Ok(Self { listener, path })
    }

    pub fn accept(&self) -> io::Result<UnixSocketTransport> {
        let (stream, _) = self.listener.accept()?;
        UnixSocketTransport::from_stream(stream)
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
        tracing::info!(path = %self.path.display(), "IPC server socket removed");
    }
}

/// Performs the client-side opening handshake: send `ping`, expect `ok pong`.
pub fn handshake(transport: &mut dyn LocalIpcTransport) -> Result<(), IpcError> {
    transport.send_line("ping").map_err(|e| IpcError::ConnectionError(e.to_string()))?;
    match transport.recv_line().map_err(|e| IpcError::ConnectionError(e.to_string()))? {
        Some(line) if line.trim() == "ok pong" => Ok(()),
        Some(line) => Err(IpcError::InvalidPayload(line)),
        None => Err(IpcError::ConnectionError("connection closed during handshake".to_string())),
    }
}

/// Blocks for the next wire command, translating a read timeout into
/// [`IpcError::Timeout`] and EOF into `Ok(None)` (the caller closes the
/// connection without touching emulator state, per §5).
pub fn recv_wire_command(transport: &mut dyn LocalIpcTransport) -> Result<Option<Command>, IpcError> {
    match transport.recv_line() {
        Ok(Some(line)) => parse_wire_command(&line).map(Some),
        Ok(None) => Ok(None),
        Err(e) if is_timeout(&e) => Err(IpcError::Timeout),
        Err(e) => Err(IpcError::ConnectionError(e.to_string())),
    }
}

fn invalid(line: &str) -> IpcError {
    IpcError::InvalidPayload(line.to_string())
}

/// Parses one wire-protocol command line (§6). Unlike [`crate::command::parse`]
/// this isn't gated by the REPL's current mode: a remote client can mount a
/// disk, single-step, and query registers all in the same session.
pub fn parse_wire_command(line: &str) -> Result<Command, IpcError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(invalid(trimmed));
    }
    let (head, rest) = split_first_token(trimmed);
    match head.to_ascii_lowercase().as_str() {
        "ping" => Ok(Command::Ping),
        "status" => Ok(Command::Status),
        "version" => Ok(Command::Version),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "quit" => Ok(Command::Quit),
        "shutdown" => Ok(Command::Shutdown),
        "drives" => Ok(Command::Drives),
        "read" => {
            let mut parts = rest.split_whitespace();
            let addr = parts.next().and_then(parse_addr).ok_or_else(|| invalid(trimmed))?;
            let count = match parts.next() {
                Some(tok) => parse_addr(tok).ok_or_else(|| invalid(trimmed))?,
                None => 1,
            };
            Ok(Command::Read { addr, count })
        }
        "write" => {
            let (addr_tok, bytes_tok) = split_first_token(rest);
            let addr = parse_addr(addr_tok).ok_or_else(|| invalid(trimmed))?;
            let bytes_tok = bytes_tok.trim();
            if bytes_tok.is_empty() {
                return Err(invalid(trimmed));
            }
            let mut bytes = Vec::new();
            for tok in bytes_tok.split(',') {
                let value = parse_number(tok.trim()).ok_or_else(|| invalid(trimmed))?;
                if value > 0xFF {
                    return Err(invalid(trimmed));
                }
                bytes.push(value as u8);
            }
            Ok(Command::Write { addr, bytes })
        }
        "registers" => {
            parse_registers(rest, trimmed).map_err(|_| invalid(trimmed))
        }
        "step" => {
            let rest = rest.trim();
            if rest.is_empty() {
                Ok(Command::Step(None))
            } else {
                Ok(Command::Step(Some(parse_number(rest).ok_or_else(|| invalid(trimmed))?)))
            }
        }
        "disassemble" => {
            let mut parts = rest.split_whitespace();
            let addr = parts.next().and_then(parse_addr).ok_or_else(|| invalid(trimmed))?;
            let lines = match parts.next() {
                Some(tok) => parse_addr(tok).ok_or_else(|| invalid(trimmed))?,
                None => 10,
            };
            Ok(Command::Disassemble { addr, lines })
        }
        "breakpoint" => {
            let (sub, arg) = split_first_token(rest);
            match sub.to_ascii_lowercase().as_str() {
                "set" => Ok(Command::BreakpointSet(parse_addr(arg.trim()).ok_or_else(|| invalid(trimmed))?)),
                "clear" => {
                    Ok(Command::BreakpointClear(parse_addr(arg.trim()).ok_or_else(|| invalid(trimmed))?))
                }
                "list" => Ok(Command::BreakpointList),
                _ => Err(invalid(trimmed)),
            }
        }
        "mount" => {
            let (drive_tok, path_tok) = split_first_token(rest);
            let drive: u8 = drive_tok.trim().parse().map_err(|_| invalid(trimmed))?;
            if !(1..=8).contains(&drive) {
                return Err(invalid(trimmed));
            }
            let path = path_tok.trim();
            if path.is_empty() {
                return Err(invalid(trimmed));
            }
            Ok(Command::Mount { drive, path: path.to_string() })
        }
        "unmount" => {
            let drive: u8 = rest.trim().parse().map_err(|_| invalid(trimmed))?;
            if !(1..=8).contains(&drive) {
                return Err(invalid(trimmed));
            }
            Ok(Command::Unmount { drive })
        }
        other => Err(IpcError::UnknownMessageType(other.to_string())),
    }
}

/// §9 open question (b): the `data <hexbyte,…>` delimiter is inconsistent
/// between a space and nothing at all in the source this is grounded on;
/// accept either on input.
pub fn parse_data_payload(payload: &str) -> Result<Vec<u8>, IpcError> {
    let rest = payload.strip_prefix("data").ok_or_else(|| invalid(payload))?;
    let rest = rest.strip_prefix(' ').unwrap_or(rest).trim();
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    rest.split(',')
        .map(|tok| u8::from_str_radix(tok.trim(), 16).map_err(|_| invalid(payload)))
        .collect()
}

/// Always emits a single space after `data`, per the §9(b) resolution.
pub fn format_data_payload(bytes: &[u8]) -> String {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!("data {}", hex.join(","))
}

/// A parsed `ok[ payload]` / `err message` response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcResponse {
    Ok(Option<String>),
    Err(String),
}

pub fn parse_response(line: &str) -> Result<IpcResponse, IpcError> {
    let trimmed = line.trim_end();
    if let Some(rest) = trimmed.strip_prefix("ok") {
        let payload = rest.trim();
        Ok(IpcResponse::Ok(if payload.is_empty() { None } else { Some(payload.to_string()) }))
    } else if let Some(rest) = trimmed.strip_prefix("err") {
        let message = rest.trim();
        if message.is_empty() {
            Err(invalid(trimmed))
        } else {
            Ok(IpcResponse::Err(message.to_string()))
        }
    } else {
        Err(invalid(trimmed))
    }
}

pub fn format_ok(payload: Option<&str>) -> String {
    match payload {
        Some(p) => format!("ok {p}"),
        None => "ok".to_string(),
    }
}

pub fn format_err(message: &str) -> String {
    format!("err {message}")
}

/// Renders any dispatcher-facing error as the `err <message>` line the
/// wire protocol expects (§7 propagation policy: preserve the reason).
pub fn error_response(err: &crate::error::AtticError) -> String {
    format_err(&err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::RegisterName;
    use std::thread;

    fn socket_pair() -> (UnixSocketTransport, UnixSocketTransport) {
        let (a, b) = UnixStream::pair().unwrap();
        (UnixSocketTransport::from_stream(a).unwrap(), UnixSocketTransport::from_stream(b).unwrap())
    }

    #[test]
    fn handshake_succeeds_on_ping_pong() {
        let (mut client, mut server) = socket_pair();
        let handle = thread::spawn(move || {
            let line = server.recv_line().unwrap().unwrap();
            assert_eq!(line, "ping");
            server.send_line("ok pong").unwrap();
        });
        handshake(&mut client).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn handshake_fails_on_unexpected_reply() {
        let (mut client, mut server) = socket_pair();
        let handle = thread::spawn(move || {
            server.recv_line().unwrap();
            server.send_line("ok not-pong").unwrap();
        });
        assert!(matches!(handshake(&mut client), Err(IpcError::InvalidPayload(_))));
        handle.join().unwrap();
    }

    #[test]
    fn wire_commands_cover_the_documented_vocabulary() {
        assert_eq!(parse_wire_command("ping").unwrap(), Command::Ping);
        assert_eq!(parse_wire_command("status").unwrap(), Command::Status);
        assert_eq!(parse_wire_command("drives").unwrap(), Command::Drives);
        assert_eq!(
            parse_wire_command("read $0600 16").unwrap(),
            Command::Read { addr: 0x0600, count: 16 }
        );
        assert_eq!(
            parse_wire_command("write $0600 169,0").unwrap(),
            Command::Write { addr: 0x0600, bytes: vec![169, 0] }
        );
        assert_eq!(
            parse_wire_command("registers A=$12").unwrap(),
            Command::Registers(Some(vec![(RegisterName::A, 0x12)]))
        );
        assert_eq!(parse_wire_command("step 4").unwrap(), Command::Step(Some(4)));
        assert_eq!(
            parse_wire_command("disassemble $0600 5").unwrap(),
            Command::Disassemble { addr: 0x0600, lines: 5 }
        );
        assert_eq!(parse_wire_command("breakpoint set $0600").unwrap(), Command::BreakpointSet(0x0600));
        assert_eq!(parse_wire_command("breakpoint list").unwrap(), Command::BreakpointList);
        assert_eq!(
            parse_wire_command("mount 1 /tmp/boot.atr").unwrap(),
            Command::Mount { drive: 1, path: "/tmp/boot.atr".to_string() }
        );
        assert_eq!(parse_wire_command("unmount 1").unwrap(), Command::Unmount { drive: 1 });
    }

    #[test]
    fn unknown_wire_command_is_unknown_message_type() {
        assert!(matches!(
            parse_wire_command("frobnicate"),
            Err(IpcError::UnknownMessageType(ref s)) if s == "frobnicate"
        ));
    }

    #[test]
    fn data_payload_accepts_both_delimiter_styles() {
        assert_eq!(parse_data_payload("data 41,00,2A").unwrap(), vec![0x41, 0x00, 0x2A]);
        assert_eq!(parse_data_payload("data41,00,2A").unwrap(), vec![0x41, 0x00, 0x2A]);
        assert_eq!(parse_data_payload("data").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn data_payload_always_emits_a_single_space() {
        assert_eq!(format_data_payload(&[0x41, 0x00, 0x2A]), "data 41,00,2A");
    }

    #[test]
    fn response_grammar_round_trips() {
        assert_eq!(parse_response("ok").unwrap(), IpcResponse::Ok(None));
        assert_eq!(parse_response("ok pong").unwrap(), IpcResponse::Ok(Some("pong".to_string())));
        assert_eq!(parse_response("err disk full").unwrap(), IpcResponse::Err("disk full".to_string()));
        assert_eq!(format_ok(None), "ok");
        assert_eq!(format_ok(Some("pong")), "ok pong");
        assert_eq!(format_err("disk full"), "err disk full");
    }

    #[test]
    fn discover_servers_finds_matching_socket_files() {
        let server = IpcServer::bind(std::process::id()).unwrap();
        let found = discover_servers().unwrap();
        assert!(found.contains(&server.path));
    }
}
