//! Text command grammar and dispatcher (§4.6): turns one line of REPL
//! input into a typed [`Command`] against the currently active
//! [`ReplMode`]. The IPC layer's wire grammar is looser (it isn't gated by
//! REPL mode, since a remote client may mount a disk without ever
//! switching the local REPL into DOS mode) but targets the same `Command`
//! union, reusing the token helpers this module exposes.

use crate::atr::Filename;
use crate::error::DispatcherError;
use crate::hostfs::expand_home;
use crate::repl_mode::{BasicVariant, ReplMode};

/// Register names accepted by the `r`/`registers` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterName {
    A,
    X,
    Y,
    S,
    P,
    Pc,
}

impl RegisterName {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_uppercase().as_str() {
            "A" => Some(Self::A),
            "X" => Some(Self::X),
            "Y" => Some(Self::Y),
            "S" => Some(Self::S),
            "P" => Some(Self::P),
            "PC" => Some(Self::Pc),
            _ => None,
        }
    }

    /// `PC` is 16-bit; every other register is 8-bit.
    pub fn max_value(self) -> u32 {
        if self == Self::Pc { 0xFFFF } else { 0xFF }
    }
}

/// The `newdisk` density argument (`ss/sd`, `ss/ed`, `ss/dd`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskTypeArg {
    SingleDensity,
    EnhancedDensity,
    DoubleDensity,
}

impl DiskTypeArg {
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "ss/sd" => Some(Self::SingleDensity),
            "ss/ed" => Some(Self::EnhancedDensity),
            "ss/dd" => Some(Self::DoubleDensity),
            _ => None,
        }
    }
}

/// The tagged command union: global, monitor, DOS, and BASIC operations
/// (§3 "Command"), produced by [`parse`] and consumed by the dispatcher
/// that wires each variant to its owning component.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // --- global (`.`-prefixed in the REPL) ---
    Help(Option<String>),
    Status,
    SwitchMonitor,
    SwitchBasic(Option<BasicVariant>),
    SwitchDos,
    StateSave(String),
    StateLoad(String),

    // --- monitor ---
    Ping,
    Version,
    Pause,
    Resume,
    Quit,
    Shutdown,
    Read { addr: u16, count: u16 },
    Write { addr: u16, bytes: Vec<u8> },
    Registers(Option<Vec<(RegisterName, u32)>>),
    Step(Option<u32>),
    StepOver,
    Disassemble { addr: u16, lines: u16 },
    BreakpointSet(u16),
    BreakpointClear(u16),
    BreakpointList,
    RunUntil(u16),
    Assemble(String),

    // --- DOS ---
    Mount { drive: u8, path: String },
    Unmount { drive: u8 },
    Drives,
    ChangeDrive(u8),
    Dir(Option<String>),
    Info(String),
    TypeFile(String),
    Dump(String),
    Copy { src: String, dst: String },
    Rename { old: String, new: String },
    Delete(String),
    Lock(String),
    Unlock(String),
    Export { name: String, host_path: String },
    Import { host_path: String, name: String },
    NewDisk { path: String, disk_type: Option<DiskTypeArg> },
    Format,

    // --- BASIC: raw program/immediate-mode text, passed straight through ---
    BasicInput(String),
}

const MONITOR_COMMANDS: &[&str] = &[
    "r", "registers", "read", "write", "step", "s", "over", "stepover", "disassemble", "dis", "u",
    "breakpoint", "break", "bp", "until", "g", "go", "asm", "assemble", "a", "pause", "resume",
    "quit", "shutdown", "ping", "version",
];

const DOS_COMMANDS: &[&str] = &[
    "mount", "unmount", "drives", "cd", "dir", "info", "type", "dump", "copy", "rename", "delete",
    "del", "lock", "unlock", "export", "import", "newdisk", "format",
];

fn invalid(input: &str, suggestion: Option<&str>) -> DispatcherError {
    DispatcherError::InvalidCommand {
        input: input.to_string(),
        suggestion: suggestion.map(str::to_string),
    }
}

/// Splits a leading whitespace-delimited token from the rest of the line.
pub(crate) fn split_first_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

/// Accepts `$hex`, `0xhex`, or plain decimal.
pub fn parse_number(token: &str) -> Option<u32> {
    let token = token.trim();
    if let Some(hex) = token.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<u32>().ok()
    }
}

pub(crate) fn parse_addr(token: &str) -> Option<u16> {
    parse_number(token).and_then(|v| u16::try_from(v).ok())
}

fn parse_drive(token: &str, input: &str) -> Result<u8, DispatcherError> {
    let n: u8 = token.trim().parse().map_err(|_| invalid(input, None))?;
    if (1..=8).contains(&n) {
        Ok(n)
    } else {
        Err(invalid(input, None))
    }
}

fn parse_filename(token: &str, input: &str) -> Result<String, DispatcherError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(invalid(input, None));
    }
    Filename::from_string(token).map(|f| f.display()).map_err(|_| invalid(input, None))
}

/// Parses one line of REPL input against the currently active mode.
/// Empty/whitespace-only input and unrecognised dot-commands both fail
/// `InvalidCommand`; a command recognised by a *different* mode than the
/// active one fails with a suggestion naming the mode switch to try.
pub fn parse(text: &str, mode: ReplMode) -> Result<Command, DispatcherError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid(trimmed, None));
    }
    if let Some(rest) = trimmed.strip_prefix('.') {
        return parse_global(rest, trimmed);
    }
    match mode {
        ReplMode::Monitor => parse_monitor(trimmed),
        ReplMode::Dos => parse_dos(trimmed),
        ReplMode::Basic(_) => Ok(Command::BasicInput(trimmed.to_string())),
    }
}

fn parse_global(text: &str, input: &str) -> Result<Command, DispatcherError> {
    let (head, rest) = split_first_token(text);
    match head.to_ascii_lowercase().as_str() {
        "help" => Ok(Command::Help(if rest.is_empty() { None } else { Some(rest.to_string()) })),
        "status" => Ok(Command::Status),
        "monitor" => Ok(Command::SwitchMonitor),
        "basic" => {
            let variant = match rest.trim().to_ascii_lowercase().as_str() {
                "" => None,
                "atari" => Some(BasicVariant::Atari),
                "turbo" => Some(BasicVariant::Turbo),
                _ => return Err(invalid(input, None)),
            };
            Ok(Command::SwitchBasic(variant))
        }
        "dos" => Ok(Command::SwitchDos),
        "state" => {
            let (sub, arg) = split_first_token(rest);
            let path = expand_home(arg.trim());
            if path.is_empty() {
                return Err(invalid(input, None));
            }
            match sub.to_ascii_lowercase().as_str() {
                "save" => Ok(Command::StateSave(path)),
                "load" => Ok(Command::StateLoad(path)),
                _ => Err(invalid(input, None)),
            }
        }
        _ => Err(invalid(input, None)),
    }
}

fn parse_monitor(text: &str) -> Result<Command, DispatcherError> {
    let (head, rest) = split_first_token(text);
    match head.to_ascii_lowercase().as_str() {
        "ping" => Ok(Command::Ping),
        "version" => Ok(Command::Version),
        "pause" => Ok(Command::Pause),
        "resume" => Ok(Command::Resume),
        "quit" => Ok(Command::Quit),
        "shutdown" => Ok(Command::Shutdown),
        "r" | "registers" => parse_registers(rest, text),
        "read" => {
            let mut parts = rest.split_whitespace();
            let addr = parts.next().and_then(parse_addr).ok_or_else(|| invalid(text, None))?;
            let count = match parts.next() {
                Some(tok) => parse_addr(tok).ok_or_else(|| invalid(text, None))?,
                None => 1,
            };
            Ok(Command::Read { addr, count })
        }
        "write" => {
            let (addr_tok, bytes_tok) = split_first_token(rest);
            let addr = parse_addr(addr_tok).ok_or_else(|| invalid(text, None))?;
            let bytes_tok = bytes_tok.trim();
            if bytes_tok.is_empty() {
                return Err(invalid(text, None));
            }
            let mut bytes = Vec::new();
            for tok in bytes_tok.split(',') {
                let value = parse_number(tok.trim()).ok_or_else(|| invalid(text, None))?;
                if value > 0xFF {
                    return Err(invalid(text, None));
                }
                bytes.push(value as u8);
            }
            Ok(Command::Write { addr, bytes })
        }
        "step" | "s" => {
            let rest = rest.trim();
            if rest.is_empty() {
                Ok(Command::Step(None))
            } else {
                Ok(Command::Step(Some(parse_number(rest).ok_or_else(|| invalid(text, None))?)))
            }
        }
        "over" | "stepover" => Ok(Command::StepOver),
        "disassemble" | "dis" | "u" => {
            let mut parts = rest.split_whitespace();
            let addr = parts.next().and_then(parse_addr).ok_or_else(|| invalid(text, None))?;
            let lines = match parts.next() {
                Some(tok) => parse_addr(tok).ok_or_else(|| invalid(text, None))?,
                None => 10,
            };
            Ok(Command::Disassemble { addr, lines })
        }
        "breakpoint" | "break" | "bp" => {
            let (sub, arg) = split_first_token(rest);
            match sub.to_ascii_lowercase().as_str() {
                "set" => Ok(Command::BreakpointSet(
                    parse_addr(arg.trim()).ok_or_else(|| invalid(text, None))?,
                )),
                "clear" => Ok(Command::BreakpointClear(
                    parse_addr(arg.trim()).ok_or_else(|| invalid(text, None))?,
                )),
                "list" => Ok(Command::BreakpointList),
                _ => Err(invalid(text, None)),
            }
        }
        "until" | "g" | "go" => {
            Ok(Command::RunUntil(parse_addr(rest.trim()).ok_or_else(|| invalid(text, None))?))
        }
        "asm" | "assemble" | "a" => {
            if rest.trim().is_empty() {
                Err(invalid(text, None))
            } else {
                Ok(Command::Assemble(rest.trim().to_string()))
            }
        }
        other => {
            if DOS_COMMANDS.contains(&other) {
                Err(invalid(text, Some(".dos")))
            } else {
                Err(invalid(text, None))
            }
        }
    }
}

pub(crate) fn parse_registers(rest: &str, input: &str) -> Result<Command, DispatcherError> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(Command::Registers(None));
    }
    let mut assignments = Vec::new();
    for part in rest.split_whitespace() {
        let (name_tok, value_tok) = part.split_once('=').ok_or_else(|| invalid(input, None))?;
        let name = RegisterName::parse(name_tok).ok_or_else(|| invalid(input, None))?;
        let hex = value_tok.strip_prefix('$').ok_or_else(|| invalid(input, None))?;
        let value = u32::from_str_radix(hex, 16).map_err(|_| invalid(input, None))?;
        if value > name.max_value() {
            return Err(invalid(input, None));
        }
        assignments.push((name, value));
    }
    Ok(Command::Registers(Some(assignments)))
}

fn parse_dos(text: &str) -> Result<Command, DispatcherError> {
    let (head, rest) = split_first_token(text);
    match head.to_ascii_lowercase().as_str() {
        "mount" => {
            let (drive_tok, path_tok) = split_first_token(rest);
            let drive = parse_drive(drive_tok, text)?;
            let path = path_tok.trim();
            if path.is_empty() {
                return Err(invalid(text, None));
            }
            Ok(Command::Mount { drive, path: expand_home(path) })
        }
        "unmount" => Ok(Command::Unmount { drive: parse_drive(rest.trim(), text)? }),
        "drives" => Ok(Command::Drives),
        "cd" => Ok(Command::ChangeDrive(parse_drive(rest.trim(), text)?)),
        "dir" => {
            let pattern = rest.trim();
            Ok(Command::Dir(if pattern.is_empty() { None } else { Some(pattern.to_string()) }))
        }
        "info" => Ok(Command::Info(parse_filename(rest, text)?)),
        "type" => Ok(Command::TypeFile(parse_filename(rest, text)?)),
        "dump" => Ok(Command::Dump(parse_filename(rest, text)?)),
        "copy" => {
            let (src_tok, dst_tok) = split_first_token(rest);
            let src = parse_filename(src_tok, text)?;
            let dst = parse_filename(dst_tok, text)?;
            Ok(Command::Copy { src, dst })
        }
        "rename" => {
            let (old_tok, new_tok) = split_first_token(rest);
            let old = parse_filename(old_tok, text)?;
            let new = parse_filename(new_tok, text)?;
            Ok(Command::Rename { old, new })
        }
        "delete" | "del" => Ok(Command::Delete(parse_filename(rest, text)?)),
        "lock" => Ok(Command::Lock(parse_filename(rest, text)?)),
        "unlock" => Ok(Command::Unlock(parse_filename(rest, text)?)),
        "export" => {
            let (name_tok, host_tok) = split_first_token(rest);
            let name = parse_filename(name_tok, text)?;
            let host_path = host_tok.trim();
            if host_path.is_empty() {
                return Err(invalid(text, None));
            }
            Ok(Command::Export { name, host_path: expand_home(host_path) })
        }
        "import" => {
            // Last token is the on-disk name; everything before it is the
            // (possibly space-containing) host path.
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            if tokens.len() < 2 {
                return Err(invalid(text, None));
            }
            let name = parse_filename(tokens[tokens.len() - 1], text)?;
            let host_path = expand_home(&tokens[..tokens.len() - 1].join(" "));
            Ok(Command::Import { host_path, name })
        }
        "newdisk" => {
            let (path_tok, type_tok) = split_first_token(rest);
            let path = path_tok.trim();
            if path.is_empty() {
                return Err(invalid(text, None));
            }
            let type_tok = type_tok.trim();
            let disk_type = if type_tok.is_empty() {
                None
            } else {
                Some(DiskTypeArg::parse(type_tok).ok_or_else(|| invalid(text, None))?)
            };
            Ok(Command::NewDisk { path: expand_home(path), disk_type })
        }
        "format" => Ok(Command::Format),
        other => {
            if MONITOR_COMMANDS.contains(&other) {
                Err(invalid(text, Some(".monitor")))
            } else {
                Err(invalid(text, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_invalid_command() {
        assert!(matches!(
            parse("   ", ReplMode::Monitor),
            Err(DispatcherError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn dot_commands_are_recognised_regardless_of_mode() {
        assert_eq!(parse(".status", ReplMode::Dos).unwrap(), Command::Status);
        assert_eq!(parse(".monitor", ReplMode::Dos).unwrap(), Command::SwitchMonitor);
        assert_eq!(
            parse(".basic turbo", ReplMode::Monitor).unwrap(),
            Command::SwitchBasic(Some(BasicVariant::Turbo))
        );
        assert_eq!(parse(".dos", ReplMode::Monitor).unwrap(), Command::SwitchDos);
    }

    #[test]
    fn unknown_dot_command_is_invalid() {
        assert!(matches!(
            parse(".frobnicate", ReplMode::Monitor),
            Err(DispatcherError::InvalidCommand { suggestion: None, .. })
        ));
    }

    #[test]
    fn state_save_and_load_expand_home() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            parse(".state save ~/disks/chk.attic", ReplMode::Monitor).unwrap(),
            Command::StateSave("/home/tester/disks/chk.attic".to_string())
        );
        assert_eq!(
            parse(".state load /tmp/chk.attic", ReplMode::Monitor).unwrap(),
            Command::StateLoad("/tmp/chk.attic".to_string())
        );
    }

    #[test]
    fn bare_registers_command_returns_none() {
        assert_eq!(parse("r", ReplMode::Monitor).unwrap(), Command::Registers(None));
    }

    #[test]
    fn register_assignment_parses_hex_values_and_validates_width() {
        let cmd = parse("r A=$12 X=$34 PC=$0600", ReplMode::Monitor).unwrap();
        assert_eq!(
            cmd,
            Command::Registers(Some(vec![
                (RegisterName::A, 0x12),
                (RegisterName::X, 0x34),
                (RegisterName::Pc, 0x0600),
            ]))
        );
        // PC takes 16 bits but A is only 8: $100 is out of range for A.
        assert!(matches!(
            parse("r A=$100", ReplMode::Monitor),
            Err(DispatcherError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn register_assignment_rejects_unknown_name() {
        assert!(matches!(
            parse("r Q=$12", ReplMode::Monitor),
            Err(DispatcherError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn read_and_write_parse_hex_and_decimal_addresses() {
        assert_eq!(
            parse("read $0600 16", ReplMode::Monitor).unwrap(),
            Command::Read { addr: 0x0600, count: 16 }
        );
        assert_eq!(
            parse("write 1536 169,0,170", ReplMode::Monitor).unwrap(),
            Command::Write { addr: 1536, bytes: vec![169, 0, 170] }
        );
    }

    #[test]
    fn breakpoint_and_run_until_commands() {
        assert_eq!(parse("breakpoint set $0600", ReplMode::Monitor).unwrap(), Command::BreakpointSet(0x0600));
        assert_eq!(parse("break clear $0600", ReplMode::Monitor).unwrap(), Command::BreakpointClear(0x0600));
        assert_eq!(parse("bp list", ReplMode::Monitor).unwrap(), Command::BreakpointList);
        assert_eq!(parse("until $0620", ReplMode::Monitor).unwrap(), Command::RunUntil(0x0620));
    }

    #[test]
    fn dos_command_in_monitor_mode_suggests_dot_dos() {
        let err = parse("dir", ReplMode::Monitor).unwrap_err();
        assert_eq!(
            err,
            DispatcherError::InvalidCommand { input: "dir".to_string(), suggestion: Some(".dos".to_string()) }
        );
    }

    #[test]
    fn monitor_command_in_dos_mode_suggests_dot_monitor() {
        let err = parse("step", ReplMode::Dos).unwrap_err();
        assert_eq!(
            err,
            DispatcherError::InvalidCommand {
                input: "step".to_string(),
                suggestion: Some(".monitor".to_string())
            }
        );
    }

    #[test]
    fn dos_grammar_covers_mount_through_format() {
        assert_eq!(
            parse("mount 1 /tmp/boot.atr", ReplMode::Dos).unwrap(),
            Command::Mount { drive: 1, path: "/tmp/boot.atr".to_string() }
        );
        assert_eq!(parse("unmount 1", ReplMode::Dos).unwrap(), Command::Unmount { drive: 1 });
        assert_eq!(parse("drives", ReplMode::Dos).unwrap(), Command::Drives);
        assert_eq!(parse("cd 2", ReplMode::Dos).unwrap(), Command::ChangeDrive(2));
        assert_eq!(parse("dir *.TXT", ReplMode::Dos).unwrap(), Command::Dir(Some("*.TXT".to_string())));
        assert_eq!(parse("info hello.txt", ReplMode::Dos).unwrap(), Command::Info("HELLO.TXT".to_string()));
        assert_eq!(
            parse("copy a.txt b.txt", ReplMode::Dos).unwrap(),
            Command::Copy { src: "A.TXT".to_string(), dst: "B.TXT".to_string() }
        );
        assert_eq!(parse("delete a.txt", ReplMode::Dos).unwrap(), Command::Delete("A.TXT".to_string()));
        assert_eq!(parse("del a.txt", ReplMode::Dos).unwrap(), Command::Delete("A.TXT".to_string()));
        assert_eq!(parse("format", ReplMode::Dos).unwrap(), Command::Format);
    }

    #[test]
    fn import_takes_the_last_token_as_the_disk_name() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            parse("import ~/host dir/file.bin FILE.BIN", ReplMode::Dos).unwrap(),
            Command::Import {
                host_path: "/home/tester/host dir/file.bin".to_string(),
                name: "FILE.BIN".to_string(),
            }
        );
    }

    #[test]
    fn newdisk_accepts_an_optional_density_token() {
        assert_eq!(
            parse("newdisk /tmp/new.atr ss/ed", ReplMode::Dos).unwrap(),
            Command::NewDisk {
                path: "/tmp/new.atr".to_string(),
                disk_type: Some(DiskTypeArg::EnhancedDensity),
            }
        );
        assert_eq!(
            parse("newdisk /tmp/new.atr", ReplMode::Dos).unwrap(),
            Command::NewDisk { path: "/tmp/new.atr".to_string(), disk_type: None }
        );
    }

    #[test]
    fn invalid_filename_is_rejected() {
        assert!(matches!(
            parse("info toolongfilename.txt", ReplMode::Dos),
            Err(DispatcherError::InvalidCommand { .. })
        ));
    }

    #[test]
    fn drive_numbers_outside_one_to_eight_are_rejected() {
        assert!(matches!(parse("cd 0", ReplMode::Dos), Err(DispatcherError::InvalidCommand { .. })));
        assert!(matches!(parse("cd 9", ReplMode::Dos), Err(DispatcherError::InvalidCommand { .. })));
        assert_eq!(parse("cd 1", ReplMode::Dos).unwrap(), Command::ChangeDrive(1));
        assert_eq!(parse("cd 8", ReplMode::Dos).unwrap(), Command::ChangeDrive(8));
    }

    #[test]
    fn basic_mode_passes_raw_text_through() {
        assert_eq!(
            parse("10 PRINT \"HI\"", ReplMode::Basic(BasicVariant::Atari)).unwrap(),
            Command::BasicInput("10 PRINT \"HI\"".to_string())
        );
    }
}
