//! The `.attic` state-file container: a versioned binary format that
//! round-trips the complete emulator state alongside typed JSON metadata
//! (§4.6).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::StateFileError;
use crate::hostfs::HostFs;
use crate::repl_mode::ReplModeReference;

pub const MAGIC: [u8; 4] = *b"ATTC";
pub const VERSION: u8 = 0x02;
const HEADER_LEN: usize = 0x14;
const TAGS_LEN: usize = 32;
const FLAGS_RECORD_LEN: usize = 5;

/// §4.6 StateFileFlags bitfield.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFileFlags {
    pub was_paused: bool,
    pub has_basic_program: bool,
}

impl StateFileFlags {
    fn to_byte(self) -> u8 {
        (self.was_paused as u8) | ((self.has_basic_program as u8) << 1)
    }

    fn from_byte(byte: u8) -> Self {
        Self { was_paused: byte & 0x01 != 0, has_basic_program: byte & 0x02 != 0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedDiskReference {
    pub drive: u8,
    pub path: String,
    pub disk_type: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMetadata {
    pub timestamp: String,
    pub repl_mode: ReplModeReference,
    pub mounted_disks: Vec<MountedDiskReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub app_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorStateTags {
    pub size: u32,
    pub cpu: u32,
    pub pc: u32,
    pub base_ram: u32,
    pub antic: u32,
    pub gtia: u32,
    pub pia: u32,
    pub pokey: u32,
}

impl EmulatorStateTags {
    fn encode(&self) -> [u8; TAGS_LEN] {
        let mut out = [0u8; TAGS_LEN];
        for (i, value) in [
            self.size, self.cpu, self.pc, self.base_ram, self.antic, self.gtia, self.pia, self.pokey,
        ]
        .into_iter()
        .enumerate()
        {
            out[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    fn decode(bytes: &[u8; TAGS_LEN]) -> Self {
        let field = |i: usize| u32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
        Self {
            size: field(0),
            cpu: field(1),
            pc: field(2),
            base_ram: field(3),
            antic: field(4),
            gtia: field(5),
            pia: field(6),
            pokey: field(7),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmulatorStateFlags {
    pub frame_count: u32,
    pub self_test_enabled: bool,
}

impl EmulatorStateFlags {
    fn encode(&self) -> [u8; FLAGS_RECORD_LEN] {
        let mut out = [0u8; FLAGS_RECORD_LEN];
        out[..4].copy_from_slice(&self.frame_count.to_le_bytes());
        out[4] = self.self_test_enabled as u8;
        out
    }

    fn decode(bytes: &[u8; FLAGS_RECORD_LEN]) -> Self {
        Self {
            frame_count: u32::from_le_bytes(bytes[..4].try_into().unwrap()),
            self_test_enabled: bytes[4] != 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorState {
    pub tags: EmulatorStateTags,
    pub flags: EmulatorStateFlags,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateFile {
    pub flags: StateFileFlags,
    pub metadata: StateMetadata,
    pub state: EmulatorState,
}

impl StateFile {
    fn encode(&self) -> Vec<u8> {
        let metadata_json = serde_json::to_vec(&self.metadata).expect("metadata always serialisable");
        let mut out = Vec::with_capacity(HEADER_LEN + metadata_json.len() + TAGS_LEN + FLAGS_RECORD_LEN + self.state.data.len());
        out.extend_from_slice(&MAGIC);
        out.push(VERSION);
        out.push(self.flags.to_byte());
        out.extend_from_slice(&[0u8; 10]);
        out.extend_from_slice(&(metadata_json.len() as u32).to_le_bytes());
        out.extend_from_slice(&metadata_json);
        out.extend_from_slice(&self.state.tags.encode());
        out.extend_from_slice(&self.state.flags.encode());
        out.extend_from_slice(&self.state.data);
        out
    }

    pub fn write(&self, path: &Path, fs: &dyn HostFs) -> Result<(), StateFileError> {
        let bytes = self.encode();
        fs.write_atomic(path, &bytes).map_err(|e| StateFileError::WriteFailed(e.to_string()))?;
        tracing::info!(path = %path.display(), "state file written");
        Ok(())
    }

    pub fn read(path: &Path, fs: &dyn HostFs) -> Result<Self, StateFileError> {
        let bytes = fs.read(path).map_err(|e| StateFileError::WriteFailed(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Parses the header and metadata only; stops before the raw state
    /// body (§4.6 "metadata-only read").
    pub fn read_metadata(path: &Path, fs: &dyn HostFs) -> Result<StateMetadata, StateFileError> {
        let bytes = fs.read(path).map_err(|e| StateFileError::WriteFailed(e.to_string()))?;
        let (metadata, _) = Self::parse_header_and_metadata(&bytes)?;
        Ok(metadata)
    }

    fn parse_header_and_metadata(bytes: &[u8]) -> Result<(StateMetadata, usize), StateFileError> {
        if bytes.len() < HEADER_LEN {
            return Err(StateFileError::TruncatedFile { expected: HEADER_LEN, actual: bytes.len() });
        }
        if bytes[0..4] != MAGIC {
            return Err(StateFileError::InvalidMagic);
        }
        let version = bytes[4];
        if version != VERSION {
            return Err(StateFileError::UnsupportedVersion(version));
        }
        let metadata_len = u32::from_le_bytes(bytes[0x10..0x14].try_into().unwrap()) as usize;
        let metadata_end = HEADER_LEN + metadata_len;
        if bytes.len() < metadata_end {
            return Err(StateFileError::TruncatedFile { expected: metadata_end, actual: bytes.len() });
        }
        let metadata: StateMetadata = serde_json::from_slice(&bytes[HEADER_LEN..metadata_end])
            .map_err(|e| StateFileError::InvalidMetadata(e.to_string()))?;
        Ok((metadata, metadata_end))
    }

    fn decode(bytes: &[u8]) -> Result<Self, StateFileError> {
        let (metadata, metadata_end) = Self::parse_header_and_metadata(bytes)?;
        let flags = StateFileFlags::from_byte(bytes[5]);

        let tags_end = metadata_end + TAGS_LEN;
        if bytes.len() < tags_end {
            return Err(StateFileError::TruncatedFile { expected: tags_end, actual: bytes.len() });
        }
        let mut tags_bytes = [0u8; TAGS_LEN];
        tags_bytes.copy_from_slice(&bytes[metadata_end..tags_end]);
        let tags = EmulatorStateTags::decode(&tags_bytes);

        let flags_end = tags_end + FLAGS_RECORD_LEN;
        if bytes.len() < flags_end {
            return Err(StateFileError::TruncatedFile { expected: flags_end, actual: bytes.len() });
        }
        let mut flags_bytes = [0u8; FLAGS_RECORD_LEN];
        flags_bytes.copy_from_slice(&bytes[tags_end..flags_end]);
        let state_flags = EmulatorStateFlags::decode(&flags_bytes);

        let expected_data_len = if tags.size == 0 { bytes.len() - flags_end } else { tags.size as usize };
        let data_end = flags_end + expected_data_len;
        if bytes.len() < data_end {
            return Err(StateFileError::TruncatedFile { expected: data_end, actual: bytes.len() });
        }
        let data = bytes[flags_end..data_end].to_vec();

        Ok(Self { flags, metadata, state: EmulatorState { tags, flags: state_flags, data } })
    }
}

pub fn build_metadata(
    clock: &dyn Clock,
    repl_mode: ReplModeReference,
    mounted_disks: Vec<MountedDiskReference>,
    note: Option<String>,
) -> StateMetadata {
    StateMetadata {
        timestamp: clock.now_iso8601(),
        repl_mode,
        mounted_disks,
        note,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::hostfs::StdHostFs;
    use crate::repl_mode::{BasicVariant, ReplMode};

    fn sample_state(data: Vec<u8>) -> StateFile {
        let clock = FixedClock(1_700_000_000_000);
        let metadata = build_metadata(&clock, ReplMode::Monitor.into(), vec![], None);
        StateFile {
            flags: StateFileFlags { was_paused: true, has_basic_program: false },
            metadata,
            state: EmulatorState {
                tags: EmulatorStateTags {
                    size: data.len() as u32,
                    cpu: 1,
                    pc: 0x0600,
                    base_ram: 0xA000,
                    antic: 0,
                    gtia: 0,
                    pia: 0,
                    pokey: 0,
                },
                flags: EmulatorStateFlags { frame_count: 50_000, self_test_enabled: false },
                data,
            },
        }
    }

    #[test]
    fn write_then_read_round_trips_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chk.attic");
        let fs = StdHostFs;
        let original = sample_state((0..=255u8).cycle().take(1024).collect());
        original.write(&path, &fs).unwrap();

        let mut mutated = original.clone();
        mutated.state.data[0] = 0xFF;

        let loaded = StateFile::read(&path, &fs).unwrap();
        assert_eq!(loaded, original);
        assert_ne!(loaded, mutated);
    }

    #[test]
    fn bad_magic_and_short_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdHostFs;
        let bad_magic = dir.path().join("bad.attic");
        fs.write(&bad_magic, &[0u8; 32]).unwrap();
        assert_eq!(StateFile::read(&bad_magic, &fs).unwrap_err(), StateFileError::InvalidMagic);

        let too_short = dir.path().join("short.attic");
        fs.write(&too_short, b"ATTC").unwrap();
        assert!(matches!(
            StateFile::read(&too_short, &fs).unwrap_err(),
            StateFileError::TruncatedFile { .. }
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = StdHostFs;
        let path = dir.path().join("v3.attic");
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4] = 3;
        fs.write(&path, &bytes).unwrap();
        assert_eq!(StateFile::read(&path, &fs).unwrap_err(), StateFileError::UnsupportedVersion(3));
    }

    #[test]
    fn metadata_only_read_stops_before_the_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.attic");
        let fs = StdHostFs;
        let state = sample_state(vec![1, 2, 3]);
        state.write(&path, &fs).unwrap();
        let metadata = StateFile::read_metadata(&path, &fs).unwrap();
        assert_eq!(metadata, state.metadata);
    }

    #[test]
    fn repl_mode_reference_round_trips_through_json() {
        let turbo = ReplModeReference::from(ReplMode::Basic(BasicVariant::Turbo));
        let json = serde_json::to_string(&turbo).unwrap();
        let back: ReplModeReference = serde_json::from_str(&json).unwrap();
        assert_eq!(turbo, back);
    }
}
