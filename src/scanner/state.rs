use serde::{Deserialize, Serialize};

use crate::error::ScanError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DecoderState {
    Uninitialized,
    Starting,
    Active,
    Paused,
    Error,
    Closed,
}

impl Default for DecoderState {
    fn default() -> Self {
        DecoderState::Uninitialized
    }
}

impl DecoderState {
    /// `Uninitialized -> Starting -> Active <-> Paused -> Closed`, with `Error`
    /// reachable from `Starting`/`Active` and left only through a new start
    /// or a close. A restart from `Paused` goes back through `Starting`.
    pub fn can_transition_to(self, next: DecoderState) -> bool {
        use DecoderState::*;
        match (self, next) {
            (Uninitialized, Starting) => true,
            (Starting, Active | Error | Closed) => true,
            (Active, Paused | Error | Closed) => true,
            (Paused, Starting | Active | Closed) => true,
            (Error, Starting | Closed) => true,
            (Closed, Starting) => true,
            (Uninitialized, Closed) => true,
            _ => false,
        }
    }

    pub fn is_scanning(self) -> bool {
        self == DecoderState::Active
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

impl Default for PermissionState {
    fn default() -> Self {
        PermissionState::Unknown
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FacingMode {
    /// Rear camera.
    Environment,
    /// Front camera.
    User,
}

impl Default for FacingMode {
    fn default() -> Self {
        FacingMode::Environment
    }
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "environment" | "rear" | "back" => Ok(FacingMode::Environment),
            "user" | "front" => Ok(FacingMode::User),
            other => Err(format!("unknown facing mode '{other}'")),
        }
    }
}

/// Snapshot of the decoder driver for display and tests.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverStatus {
    pub decoder_state: DecoderState,
    pub permission_state: PermissionState,
    pub last_error: Option<ScanError>,
    /// Incremented on every successful start; decode events carry it.
    pub epoch: u64,
    pub restart_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use DecoderState::*;
        assert!(Uninitialized.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Active));
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Starting));
        assert!(Active.can_transition_to(Closed));
        assert!(Starting.can_transition_to(Error));
        assert!(Error.can_transition_to(Starting));
        assert!(Closed.can_transition_to(Starting));
    }

    #[test]
    fn test_invalid_transitions() {
        use DecoderState::*;
        assert!(!Uninitialized.can_transition_to(Active));
        assert!(!Error.can_transition_to(Active));
        assert!(!Paused.can_transition_to(Error));
        assert!(!Closed.can_transition_to(Active));
    }

    #[test]
    fn test_facing_mode_parsing() {
        assert_eq!("rear".parse::<FacingMode>(), Ok(FacingMode::Environment));
        assert_eq!("User".parse::<FacingMode>(), Ok(FacingMode::User));
        assert!("sideways".parse::<FacingMode>().is_err());
    }
}
