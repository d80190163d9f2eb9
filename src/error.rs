//! Error taxonomy for the control plane, grouped by the kinds listed in the
//! design doc rather than by the type name a caller happens to see.
//!
//! Deep components (the assembler, the breakpoint manager, the ATR/DOS
//! filesystem, the disk manager, the state file container, the dispatcher,
//! the IPC layer) each own a narrow error enum. [`AtticError`] folds all of
//! them together at the boundary that actually needs one umbrella type: the
//! dispatcher, which must turn any of them into a single `err <message>`
//! IPC line.

use thiserror::Error;

/// Configuration and environment failures (ROM discovery, initialisation).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ROM not found: {0}")]
    RomNotFound(String),
    #[error("invalid ROM at {0}: {1}")]
    InvalidRom(String, String),
    #[error("initialisation failed: {0}")]
    InitializationFailed(String),
    #[error("emulator not initialised")]
    EmulatorNotInitialized,
}

/// Errors from [`crate::assembler`] and [`crate::expr`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),
    #[error("invalid operand: {0}")]
    InvalidOperand(String),
    #[error("invalid addressing mode for {0}: {1}")]
    InvalidAddressingMode(String, String),
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("{context}: value {value} out of range {lo}..={hi}")]
    ValueOutOfRange { context: String, value: i32, lo: i32, hi: i32 },
    #[error("invalid pseudo-op: {0}")]
    InvalidPseudoOp(String),
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error("branch out of range: offset {0} from target")]
    BranchOutOfRange(i32),
}

/// Errors from [`crate::breakpoints`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreakpointError {
    #[error("breakpoint already set at ${0:04X}")]
    AlreadySet(u16),
    #[error("no breakpoint at ${0:04X}")]
    NotFound(u16),
    #[error("cannot modify ROM at ${0:04X}")]
    CannotModifyRom(u16),
    #[error("invalid address ${0:04X}")]
    InvalidAddress(u16),
}

/// Errors from [`crate::atr`] (the `.atr` container itself).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AtrError {
    #[error("header too short")]
    HeaderTooShort,
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("invalid sector size: {0}")]
    InvalidSectorSize(u32),
    #[error("size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("sector {0} out of range (max {1})")]
    SectorOutOfRange(u32, u32),
    #[error("image is read-only")]
    ReadOnly,
    #[error("sector size mismatch writing sector {sector}: expected {expected}, got {actual}")]
    SectorSizeMismatch { sector: u32, expected: usize, actual: usize },
    #[error("unsupported density: {0}")]
    UnsupportedDensity(String),
}

/// Errors from the DOS 2.x filesystem layer inside [`crate::atr`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DosError {
    #[error("invalid filename {0:?}: {1}")]
    InvalidFilename(String, String),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("file chain corrupted for {0}: {1}")]
    FileChainCorrupted(String, String),
    #[error("disk full")]
    DiskFull,
    #[error("file already exists: {0}")]
    FileExists(String),
    #[error("directory full")]
    DirectoryFull,
    #[error("file is locked: {0}")]
    FileLocked(String),
}

/// Errors from [`crate::diskmanager`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiskManagerError {
    #[error("invalid drive number: {0}")]
    InvalidDrive(u8),
    #[error("path not found: {0}")]
    PathNotFound(String),
    #[error("drive {0} is empty")]
    DriveEmpty(u8),
    #[error("drive {0} is in use")]
    DriveInUse(u8),
    #[error("mount failed: {0}")]
    MountFailed(String),
    #[error("drive {0} is read-only")]
    DiskReadOnly(u8),
    #[error(transparent)]
    Atr(#[from] AtrError),
    #[error(transparent)]
    Dos(#[from] DosError),
}

/// Errors from [`crate::state`] (the `.attic` container).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateFileError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("file truncated: expected at least {expected} bytes, found {actual}")]
    TruncatedFile { expected: usize, actual: usize },
    #[error("unsupported state file version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Errors from [`crate::ipc`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IpcError {
    #[error("invalid protocol magic")]
    InvalidMagic,
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("insufficient data")]
    InsufficientData,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("socket error: {0}")]
    SocketError(String),
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("server error ({code}): {message}")]
    ServerError { code: i32, message: String },
    #[error("timed out waiting for a response")]
    Timeout,
}

/// Errors from [`crate::command`] (the text command grammar and dispatcher).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatcherError {
    #[error("invalid command: {input}")]
    InvalidCommand { input: String, suggestion: Option<String> },
}

/// The umbrella type the dispatcher converts everything into before it is
/// rendered as an `err <message>` IPC line. Each variant keeps the
/// underlying error's `Display` output verbatim (propagation policy: wrap,
/// never discard the reason).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AtticError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Assembler(#[from] AssemblerError),
    #[error(transparent)]
    Breakpoint(#[from] BreakpointError),
    #[error(transparent)]
    Atr(#[from] AtrError),
    #[error(transparent)]
    Dos(#[from] DosError),
    #[error(transparent)]
    DiskManager(#[from] DiskManagerError),
    #[error(transparent)]
    StateFile(#[from] StateFileError),
    #[error(transparent)]
    Ipc(#[from] IpcError),
    #[error(transparent)]
    Dispatcher(#[from] DispatcherError),
    #[error("I/O error: {0}")]
    Io(String),
}

impl AtticError {
    /// A short, user-facing hint for the common format errors the design
    /// doc calls out by name. Returns `None` for everything else.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            AtticError::Atr(AtrError::InvalidMagic) => {
                Some("verify the file is an ATR image")
            }
            AtticError::Atr(AtrError::HeaderTooShort) => Some("file may be truncated"),
            AtticError::Dos(DosError::FileNotFound(_)) => {
                Some("check the directory listing")
            }
            AtticError::Dos(DosError::DiskFull) => {
                Some("delete files or use a larger disk type")
            }
            AtticError::Dispatcher(DispatcherError::InvalidCommand { .. }) => {
                Some("try `help`")
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for AtticError {
    fn from(err: std::io::Error) -> Self {
        AtticError::Io(err.to_string())
    }
}
