//! Install and uninstall workflows.
//!
//! ```text
//! Idle -> Validating -> SelectingMembers -> ReservingSlots -> Extracting -> UpdatingConfig -> Done
//!            \______________\__________________\________________\______________\-> Cancelled | Failed
//! ```
//!
//! Validation, depot selection and config updates only happen in GreenLuma
//! mode; a SteamTools install goes straight from validation to extraction.

pub mod install;
pub mod uninstall;

use serde::Serialize;
use std::path::Path;

use crate::services::DepotInfo;

pub use install::{InstallOutcome, InstallSummary, Installer};
pub use uninstall::{uninstall, uninstall_batch};

/// Where an install currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    #[default]
    Idle,
    Validating,
    SelectingMembers,
    ReservingSlots,
    Extracting,
    UpdatingConfig,
    Done,
    Cancelled,
    Failed,
}

impl InstallState {
    /// Whether an install is running. Terminal states accept a new install.
    #[must_use]
    pub fn is_active(self) -> bool {
        !matches!(
            self,
            Self::Idle | Self::Done | Self::Cancelled | Self::Failed
        )
    }

    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::Idle => "Ready",
            Self::Validating => "Validating App ID...",
            Self::SelectingMembers => "Analyzing depot information...",
            Self::ReservingSlots => "Generating AppList and app manifest...",
            Self::Extracting => "Extracting files...",
            Self::UpdatingConfig => "Updating configuration...",
            Self::Done => "Installed",
            Self::Cancelled => "Installation cancelled",
            Self::Failed => "Installation failed",
        }
    }
}

/// User decisions the install workflow needs.
pub trait InstallPrompts: Send + Sync {
    /// Only `max` of the offered depots fit into the AppList.
    fn capacity_warning(&self, max: usize, current: usize, capacity: usize);

    /// Pick at most `max` depot ids. An empty selection cancels the install.
    fn select_depots(&self, depots: &[DepotInfo], max: usize) -> Vec<String>;

    /// Whether to delete the installed archive.
    fn confirm_delete_archive(&self, archive: &Path) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(!InstallState::Idle.is_active());
        assert!(InstallState::Extracting.is_active());
        assert!(!InstallState::Failed.is_active());
        assert_eq!(InstallState::Extracting.message(), "Extracting files...");
    }
}
