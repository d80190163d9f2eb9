//! The active command grammar (§3, §4.6): one of monitor, BASIC, or DOS.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicVariant {
    Atari,
    Turbo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplMode {
    Monitor,
    Basic(BasicVariant),
    Dos,
}

impl ReplMode {
    pub fn as_mode_str(&self) -> &'static str {
        match self {
            ReplMode::Monitor => "monitor",
            ReplMode::Basic(_) => "basic",
            ReplMode::Dos => "dos",
        }
    }

    pub fn variant_str(&self) -> Option<&'static str> {
        match self {
            ReplMode::Basic(BasicVariant::Atari) => Some("atari"),
            ReplMode::Basic(BasicVariant::Turbo) => Some("turbo"),
            _ => None,
        }
    }
}

/// A reference to a REPL mode as persisted in state-file metadata (§4.6):
/// `monitor → monitor`; `basic(atari) → basic`; `basic(turbo) → basic:turbo`;
/// `dos → dos`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReplModeReference {
    pub mode: String,
    pub variant: Option<String>,
}

impl From<ReplMode> for ReplModeReference {
    fn from(mode: ReplMode) -> Self {
        Self { mode: mode.as_mode_str().to_string(), variant: mode.variant_str().map(str::to_string) }
    }
}

impl ReplModeReference {
    pub fn to_display(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}:{}", self.mode, variant),
            None => self.mode.clone(),
        }
    }
}
