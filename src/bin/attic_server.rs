//! `AtticServer`: the headless control-plane daemon. Owns the monitor, the
//! disk manager, and the state-file machinery; drives them from two
//! front ends that both funnel through [`attic::command::parse`] /
//! [`attic::ipc::parse_wire_command`] into the same [`attic::command::Command`]
//! dispatch: a line-oriented REPL on stdin/stdout, and the Unix-socket IPC
//! server for remote clients.

use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};
use std::thread;

use clap::Parser;

use attic::breakpoints::BreakpointManager;
use attic::clock::SystemClock;
use attic::command::{self, Command};
use attic::diskmanager::DiskManager;
use attic::emulation_core::{check_rom_directory, EmulationCore, SoftEmulationCore};
use attic::error::AtticError;
use attic::hostfs::StdHostFs;
use attic::ipc::{self, IpcServer, LocalIpcTransport};
use attic::repl_mode::ReplMode;
use attic::state::{build_metadata, MountedDiskReference, StateFile};

#[derive(Debug, Parser)]
#[command(name = "AtticServer", about = "Atari 8-bit emulator control-plane daemon")]
struct ServerConfig {
    /// Boot without a GUI; this build never has one, so the flag is a no-op
    /// kept for interface compatibility.
    #[arg(long)]
    headless: bool,

    /// Directory containing ATARIXL.ROM / ATARIBAS.ROM.
    #[arg(long, default_value = "/usr/local/share/attic/roms")]
    rom_dir: std::path::PathBuf,

    /// Directory used for the IPC socket and `attic-*.sock` discovery scan.
    #[arg(long, default_value = "/tmp")]
    socket_dir: std::path::PathBuf,

    /// Instruction cap for `run_until_brk_or_pc` calls.
    #[arg(long, default_value_t = attic::emulation_core::DEFAULT_RUN_UNTIL_CAP)]
    run_until_cap: u64,

    /// IPC read timeout, in milliseconds.
    #[arg(long, default_value_t = attic::ipc::DEFAULT_READ_TIMEOUT.as_millis() as u64)]
    read_timeout_ms: u64,
}

struct AppState {
    core: SoftEmulationCore,
    breakpoints: BreakpointManager,
    disks: DiskManager,
    mode: ReplMode,
    run_until_cap: u64,
    fs: StdHostFs,
    clock: SystemClock,
}

impl AppState {
    fn new(run_until_cap: u64) -> Self {
        Self {
            core: SoftEmulationCore::new(0x10000),
            breakpoints: BreakpointManager::new(),
            disks: DiskManager::new(),
            mode: ReplMode::Monitor,
            run_until_cap,
            fs: StdHostFs,
            clock: SystemClock,
        }
    }

    /// Dispatches one parsed command and renders its outcome as the
    /// `ok[ payload]` / `err message` line the IPC layer and the REPL both
    /// print (§6-7).
    fn dispatch(&mut self, cmd: Command) -> Result<Option<String>, AtticError> {
        match cmd {
            Command::Ping => Ok(Some("pong".to_string())),
            Command::Version => Ok(Some(env!("CARGO_PKG_VERSION").to_string())),
            Command::Status => Ok(Some(format!("mode={}", self.mode.as_mode_str()))),
            Command::SwitchMonitor => {
                self.mode = ReplMode::Monitor;
                Ok(None)
            }
            Command::SwitchBasic(variant) => {
                self.mode = ReplMode::Basic(variant.unwrap_or(attic::repl_mode::BasicVariant::Atari));
                Ok(None)
            }
            Command::SwitchDos => {
                self.mode = ReplMode::Dos;
                Ok(None)
            }
            Command::Pause | Command::Resume | Command::Quit | Command::Shutdown => Ok(None),
            Command::Help(_) => Ok(Some("see the operator guide".to_string())),

            Command::Read { addr, count } => {
                let bytes: Vec<u8> =
                    (0..count).map(|i| self.core.read_memory(addr.wrapping_add(i))).collect();
                Ok(Some(ipc::format_data_payload(&bytes)))
            }
            Command::Write { addr, bytes } => {
                for (i, b) in bytes.iter().enumerate() {
                    self.core.write_memory(addr.wrapping_add(i as u16), *b);
                }
                Ok(None)
            }
            Command::Registers(assignments) => {
                if let Some(assignments) = assignments {
                    let mut regs = self.core.read_registers();
                    for (name, value) in assignments {
                        match name {
                            command::RegisterName::A => regs.a = value as u8,
                            command::RegisterName::X => regs.x = value as u8,
                            command::RegisterName::Y => regs.y = value as u8,
                            command::RegisterName::S => regs.s = value as u8,
                            command::RegisterName::P => regs.p = value as u8,
                            command::RegisterName::Pc => regs.pc = value as u16,
                        }
                    }
                    self.core.write_registers(regs);
                    Ok(None)
                } else {
                    let r = self.core.read_registers();
                    Ok(Some(format!(
                        "A={:02X} X={:02X} Y={:02X} S={:02X} P={:02X} PC={:04X}",
                        r.a, r.x, r.y, r.s, r.p, r.pc
                    )))
                }
            }
            Command::Step(count) => {
                let result = self.breakpoints.step_n(&mut self.core, count.unwrap_or(1) as u64);
                Ok(Some(format!("pc={:04X} executed={}", result.stopped_at, result.instructions_executed)))
            }
            Command::StepOver => {
                let result = self.breakpoints.step_over(&mut self.core);
                Ok(Some(format!("pc={:04X} executed={}", result.stopped_at, result.instructions_executed)))
            }
            Command::Disassemble { addr, lines } => Ok(Some(disassemble(&self.core, addr, lines))),
            Command::BreakpointSet(addr) => {
                self.breakpoints.set(addr, &mut self.core)?;
                Ok(None)
            }
            Command::BreakpointClear(addr) => {
                self.breakpoints.clear(addr, &mut self.core)?;
                Ok(None)
            }
            Command::BreakpointList => {
                let addrs = self.breakpoints.get_all_addresses();
                let list = addrs.iter().map(|a| format!("${a:04X}")).collect::<Vec<_>>().join(",");
                Ok(Some(list))
            }
            Command::RunUntil(target) => {
                let result = self.breakpoints.run_until(&mut self.core, target);
                if let Some(msg) = result.error_message {
                    return Ok(Some(msg));
                }
                Ok(Some(format!("pc={:04X} executed={}", result.stopped_at, result.instructions_executed)))
            }
            Command::Assemble(source) => {
                let mut asm = attic::assembler::Assembler::new_at(self.core.read_registers().pc);
                let results = asm.assemble(&source)?;
                for r in &results {
                    for (i, b) in r.bytes.iter().enumerate() {
                        self.core.write_memory(r.address.wrapping_add(i as u16), *b);
                    }
                }
                Ok(Some(format!("{} bytes assembled", results.iter().map(|r| r.bytes.len()).sum::<usize>())))
            }

            Command::Mount { drive, path } => {
                let info = self.disks.mount(drive, &path, false, &self.fs)?;
                Ok(Some(format!("drive {} mounted: {}", info.drive, info.path)))
            }
            Command::Unmount { drive } => {
                self.disks.unmount(drive, true, &self.fs)?;
                Ok(None)
            }
            Command::Drives => {
                let drives = self.disks.list_drives();
                let list = drives
                    .iter()
                    .filter(|d| d.mounted)
                    .map(|d| format!("{}:{}", d.drive, d.path.clone().unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(",");
                Ok(Some(list))
            }
            Command::ChangeDrive(drive) => {
                self.disks.change_drive(drive)?;
                Ok(None)
            }
            Command::Dir(pattern) => {
                let entries = self.disks.list_directory(None, false, pattern.as_deref())?;
                let list = entries.iter().map(|(name, _)| name.display()).collect::<Vec<_>>().join(",");
                Ok(Some(list))
            }
            Command::Info(name) => {
                let entry = self.disks.get_file_info(None, &name)?;
                Ok(Some(format!("{name} sectors={}", entry.sector_count)))
            }
            Command::TypeFile(name) => {
                let data = self.disks.read_file(None, &name)?;
                Ok(Some(String::from_utf8_lossy(&data).to_string()))
            }
            Command::Dump(name) => {
                let data = self.disks.read_file(None, &name)?;
                Ok(Some(ipc::format_data_payload(&data)))
            }
            Command::Copy { src, dst } => {
                self.disks.copy_file(None, &src, None, Some(&dst))?;
                Ok(None)
            }
            Command::Rename { old, new } => {
                self.disks.rename_file(None, &old, &new)?;
                Ok(None)
            }
            Command::Delete(name) => {
                self.disks.delete_file(None, &name)?;
                Ok(None)
            }
            Command::Lock(name) => {
                self.disks.lock_file(None, &name)?;
                Ok(None)
            }
            Command::Unlock(name) => {
                self.disks.unlock_file(None, &name)?;
                Ok(None)
            }
            Command::Export { name, host_path } => {
                self.disks.export_file(None, &name, &host_path, &self.fs)?;
                Ok(None)
            }
            Command::Import { host_path, name } => {
                self.disks.import_file(None, &host_path, &name, &self.fs)?;
                Ok(None)
            }
            Command::NewDisk { path, disk_type } => {
                let disk_type = match disk_type {
                    Some(command::DiskTypeArg::SingleDensity) | None => attic::atr::DiskType::SingleDensity,
                    Some(command::DiskTypeArg::EnhancedDensity) => attic::atr::DiskType::EnhancedDensity,
                    Some(command::DiskTypeArg::DoubleDensity) => attic::atr::DiskType::DoubleDensity,
                };
                self.disks.create_disk(&path, disk_type, &self.fs)?;
                Ok(None)
            }
            Command::Format => {
                self.disks.format_disk(None)?;
                Ok(None)
            }

            Command::StateSave(path) => {
                let mounted: Vec<MountedDiskReference> = self
                    .disks
                    .list_drives()
                    .into_iter()
                    .filter(|d| d.mounted)
                    .map(|d| MountedDiskReference {
                        drive: d.drive,
                        path: d.path.unwrap_or_default(),
                        disk_type: d.disk_type.map(|t| format!("{t:?}")).unwrap_or_default(),
                        read_only: d.is_read_only,
                    })
                    .collect();
                let metadata = build_metadata(&self.clock, self.mode.into(), mounted, None);
                let regs = self.core.read_registers();
                let state = StateFile {
                    flags: attic::state::StateFileFlags::default(),
                    metadata,
                    state: attic::state::EmulatorState {
                        tags: attic::state::EmulatorStateTags {
                            size: self.core.memory.len() as u32,
                            cpu: 1,
                            pc: regs.pc as u32,
                            base_ram: 0,
                            antic: 0,
                            gtia: 0,
                            pia: 0,
                            pokey: 0,
                        },
                        flags: attic::state::EmulatorStateFlags { frame_count: 0, self_test_enabled: false },
                        data: self.core.memory.clone(),
                    },
                };
                state.write(std::path::Path::new(&path), &self.fs)?;
                Ok(None)
            }
            Command::StateLoad(path) => {
                let state = StateFile::read(std::path::Path::new(&path), &self.fs)?;
                self.core.memory = state.state.data;
                let mut regs = self.core.read_registers();
                regs.pc = state.state.tags.pc as u16;
                self.core.write_registers(regs);
                for disk in &state.metadata.mounted_disks {
                    self.disks.track_booted_disk(disk.drive, &disk.path, &self.fs);
                }
                Ok(None)
            }

            Command::BasicInput(_) => Ok(None),
        }
    }
}

fn disassemble(core: &SoftEmulationCore, start: u16, lines: u16) -> String {
    let mut addr = start;
    let mut out = Vec::new();
    for _ in 0..lines {
        let opcode = core.read_memory(addr);
        let info = attic::opcodes::OpcodeTable::lookup(opcode);
        let length = info.instruction_length().max(1);
        let operands: Vec<u8> =
            (1..length).map(|i| core.read_memory(addr.wrapping_add(i as u16))).collect();
        let operand_hex = operands.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(" ");
        out.push(format!("${addr:04X}  {:<6}  {operand_hex}", info.mnemonic));
        addr = addr.wrapping_add(length as u16);
    }
    out.join(";")
}

fn run_repl(state: Arc<Mutex<AppState>>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let mode = state.lock().unwrap().mode;
        match command::parse(&line, mode) {
            Ok(Command::Quit) | Ok(Command::Shutdown) => break,
            Ok(cmd) => {
                let result = state.lock().unwrap().dispatch(cmd);
                let response = match result {
                    Ok(payload) => ipc::format_ok(payload.as_deref()),
                    Err(err) => {
                        tracing::debug!(error = %err, "command rejected");
                        ipc::error_response(&err)
                    }
                };
                let _ = writeln!(stdout, "{response}");
            }
            Err(err) => {
                tracing::debug!(error = %err, "command rejected");
                let _ = writeln!(stdout, "{}", ipc::format_err(&err.to_string()));
            }
        }
    }
}

fn serve_ipc_connection(state: Arc<Mutex<AppState>>, mut transport: impl LocalIpcTransport) {
    if ipc::handshake(&mut transport).is_err() {
        return;
    }
    let _ = transport.send_line(&ipc::format_ok(Some("pong")));
    loop {
        match ipc::recv_wire_command(&mut transport) {
            Ok(Some(cmd)) => {
                let result = state.lock().unwrap().dispatch(cmd);
                let response = match result {
                    Ok(payload) => ipc::format_ok(payload.as_deref()),
                    Err(err) => ipc::error_response(&err),
                };
                if transport.send_line(&response).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(error = %err, "IPC frame parse failure");
                let _ = transport.send_line(&ipc::format_err(&err.to_string()));
            }
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::parse();

    if let Err(err) = check_rom_directory(&config.rom_dir) {
        tracing::error!(error = %err, "ROM directory check failed");
        std::process::exit(1);
    }

    let state = Arc::new(Mutex::new(AppState::new(config.run_until_cap)));

    let server = match IpcServer::bind(std::process::id()) {
        Ok(s) => s,
        Err(err) => {
            tracing::error!(error = %err, "failed to bind IPC socket");
            std::process::exit(1);
        }
    };

    let ipc_state = Arc::clone(&state);
    thread::spawn(move || loop {
        match server.accept() {
            Ok(transport) => {
                let state = Arc::clone(&ipc_state);
                thread::spawn(move || serve_ipc_connection(state, transport));
            }
            Err(err) => {
                tracing::warn!(error = %err, "IPC accept failed");
            }
        }
    });

    run_repl(state);
}
