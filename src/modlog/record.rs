//! Case records
//!
//! A case record is the structured view of one ledger entry. The ledger text
//! is the only persistence, so everything here must survive a trip through
//! [`CaseCodec`](super::CaseCodec).

use crate::modlog::{CaseAction, EntryRef, LedgerEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Text logged when a case was created without a reason
pub const REASON_PLACEHOLDER: &str = "Awaiting reason";

/// The member a case is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Discord user ID
    pub id: u64,
    /// Display tag at the time the case was logged
    pub name: String,
}

impl Subject {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// A user acting on the ledger: the moderator issuing a command, or the bot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// Discord user ID
    pub id: u64,
    /// Display tag, written as the entry author
    pub name: String,
    /// Avatar URL, written as the entry author icon
    pub icon: Option<String>,
}

impl Issuer {
    pub fn new(id: u64, name: impl Into<String>, icon: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            icon,
        }
    }

    /// The author block this issuer leaves on an entry
    #[must_use]
    pub fn author(&self) -> CaseAuthor {
        CaseAuthor {
            name: self.name.clone(),
            icon: self.icon.clone(),
        }
    }
}

/// Author block of a ledger entry. Only the display name and icon are
/// written to the ledger, so this is all a decoded case knows of its issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAuthor {
    pub name: String,
    pub icon: Option<String>,
}

/// One numbered moderation case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Per-guild case number
    pub case_number: u64,
    /// Member the action was taken against
    pub subject: Subject,
    /// Moderator (or bot) credited with the case
    pub issuer: CaseAuthor,
    /// What was done
    pub action: CaseAction,
    /// Why it was done
    pub reason: Option<String>,
    /// How long it lasts, for time-bounded actions
    pub duration: Option<String>,
    /// When the case was logged
    pub created_at: DateTime<Utc>,
    /// Ledger entry holding this case, once posted
    pub entry_ref: Option<EntryRef>,
}

impl CaseRecord {
    /// Create a record that has not been posted yet.
    ///
    /// Blank reasons and durations are treated as absent, as is a reason
    /// reading exactly [`REASON_PLACEHOLDER`]. Durations are dropped for
    /// actions that are not time-bounded.
    pub fn new(
        case_number: u64,
        subject: Subject,
        issuer: CaseAuthor,
        action: CaseAction,
        reason: Option<&str>,
        duration: Option<&str>,
    ) -> Self {
        Self {
            case_number,
            subject,
            issuer,
            action,
            reason: non_blank(reason).filter(|text| text != REASON_PLACEHOLDER),
            duration: non_blank(duration).filter(|_| action.is_time_bounded()),
            created_at: Utc::now(),
            entry_ref: None,
        }
    }

    /// Reason text as it appears in the ledger
    #[must_use]
    pub fn reason_text(&self) -> &str {
        self.reason.as_deref().unwrap_or(REASON_PLACEHOLDER)
    }
}

fn non_blank(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
}

/// A case together with the ledger entry it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedCase {
    pub entry: LedgerEntry,
    pub record: CaseRecord,
}

impl LoggedCase {
    #[must_use]
    pub fn entry_ref(&self) -> EntryRef {
        self.entry.entry_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_reason_is_absent() {
        let subject = Subject::new(1, "someone");
        let issuer = Issuer::new(2, "mod", None).author();

        let record = CaseRecord::new(1, subject.clone(), issuer.clone(), CaseAction::Ban, Some("   "), None);
        assert!(record.reason.is_none());
        assert_eq!(record.reason_text(), REASON_PLACEHOLDER);

        let record = CaseRecord::new(1, subject, issuer, CaseAction::Mute, Some(" spam "), Some("1h"));
        assert_eq!(record.reason.as_deref(), Some("spam"));
        assert_eq!(record.duration.as_deref(), Some("1h"));
        assert!(record.entry_ref.is_none());
    }

    #[test]
    fn test_placeholder_reason_is_absent() {
        let record = CaseRecord::new(
            1,
            Subject::new(1, "someone"),
            Issuer::new(2, "mod", None).author(),
            CaseAction::Ban,
            Some(" Awaiting reason "),
            None,
        );
        assert!(record.reason.is_none());
    }

    #[test]
    fn test_duration_only_kept_for_mutes() {
        let subject = Subject::new(1, "someone");
        let issuer = Issuer::new(2, "mod", None).author();

        for action in [CaseAction::Ban, CaseAction::Unban, CaseAction::Softban] {
            let record = CaseRecord::new(1, subject.clone(), issuer.clone(), action, None, Some("3 days"));
            assert!(record.duration.is_none(), "{action} should not carry a length");
        }
        let record = CaseRecord::new(1, subject, issuer, CaseAction::Mute, None, Some("3 days"));
        assert_eq!(record.duration.as_deref(), Some("3 days"));
    }
}
