//! Moderation case actions
//!
//! The kinds of action a case can record, the colour each is logged with,
//! and the ledger legs each action is expected to produce.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of moderation action recorded by a case
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseAction {
    /// Server ban
    Ban,
    /// Server unban
    Unban,
    /// Ban immediately followed by an unban, used to purge messages
    Softban,
    /// Text channel mute
    Mute,
}

/// Softban is logged as a ban leg and an unban leg
const SOFTBAN_LEGS: [CaseAction; 2] = [CaseAction::Ban, CaseAction::Unban];

impl CaseAction {
    /// Every known action, in declaration order
    pub const ALL: [Self; 4] = [Self::Ban, Self::Unban, Self::Softban, Self::Mute];

    /// Embed colour used when this action is logged
    #[must_use]
    pub const fn color(self) -> u32 {
        match self {
            Self::Ban => 0x00E7_4C3C,
            Self::Unban => 0x002E_CC71,
            Self::Softban => 0x00E6_7E22,
            Self::Mute => 0x00F1_C40F,
        }
    }

    /// Action kinds whose ledger entries must all be observed before the
    /// action counts as logged
    #[must_use]
    pub fn expected_legs(self) -> &'static [Self] {
        match self {
            Self::Ban => &[Self::Ban],
            Self::Unban => &[Self::Unban],
            Self::Mute => &[Self::Mute],
            Self::Softban => &SOFTBAN_LEGS,
        }
    }

    /// Whether the action can carry a length
    #[must_use]
    pub const fn is_time_bounded(self) -> bool {
        matches!(self, Self::Mute)
    }
}

/// Error returned when a ledger line names an unknown action
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("Unknown case action: {_0}")]
pub struct UnknownAction(pub String);

impl std::error::Error for UnknownAction {}

impl FromStr for CaseAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.to_string() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}
