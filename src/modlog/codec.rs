//! Case codec
//!
//! Ledger entries are plain embeds, so the case grammar lives here and
//! nowhere else. Description layout, one field per line:
//!
//! ```text
//! **Member:** <name> (<id>)
//! **Action:** <Ban|Unban|Softban|Mute>
//! **Length:** <text>          (optional, always directly after Action)
//! **Reason:** <text>          (runs to the end, may span lines)
//! ```
//!
//! The footer is `Case <N>`.

use crate::modlog::{
    CaseAction, CaseAuthor, CaseRecord, EntryContent, LedgerEntry, REASON_PLACEHOLDER, Subject,
};

const MEMBER: &str = "**Member:** ";
const ACTION: &str = "**Action:** ";
const LENGTH: &str = "**Length:** ";
const REASON: &str = "**Reason:** ";
const FOOTER: &str = "Case ";

/// Line positions of the case fields within a description
#[derive(Debug, Default)]
struct Layout {
    member: Option<usize>,
    action: Option<usize>,
    length: Option<usize>,
    reason: Option<usize>,
}

impl Layout {
    fn of(lines: &[&str]) -> Self {
        let reason = lines.iter().position(|line| line.starts_with(REASON));
        // Fields after the reason are part of the reason text
        let header = &lines[..reason.unwrap_or(lines.len())];
        let member = header.iter().position(|line| line.starts_with(MEMBER));
        let action = header.iter().position(|line| line.starts_with(ACTION));
        let length = action
            .map(|i| i + 1)
            .filter(|&i| header.get(i).is_some_and(|line| line.starts_with(LENGTH)));

        Self {
            member,
            action,
            length,
            reason,
        }
    }
}

/// Converts between case records and ledger entry content
pub struct CaseCodec;

impl CaseCodec {
    /// Decode a ledger entry into a case record.
    ///
    /// Returns `None` when the entry has no embed, no `Case <N>` footer, or
    /// lacks the member or action line.
    #[must_use]
    pub fn decode(entry: &LedgerEntry) -> Option<CaseRecord> {
        let content = entry.content.as_ref()?;
        let case_number = Self::case_number(content)?;

        let lines: Vec<&str> = content.description.split('\n').collect();
        let layout = Layout::of(&lines);

        let subject = parse_member(lines[layout.member?])?;
        let action = lines[layout.action?]
            .strip_prefix(ACTION)?
            .trim()
            .parse::<CaseAction>()
            .ok()?;
        let duration = layout
            .length
            .filter(|_| action.is_time_bounded())
            .and_then(|i| lines[i].strip_prefix(LENGTH))
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(ToString::to_string);
        let reason = layout
            .reason
            .map(|i| lines[i..].join("\n"))
            .and_then(|text| text.strip_prefix(REASON).map(ToString::to_string))
            .filter(|text| !text.trim().is_empty() && text != REASON_PLACEHOLDER);

        Some(CaseRecord {
            case_number,
            subject,
            issuer: CaseAuthor {
                name: content.author_name.clone(),
                icon: content.author_icon.clone(),
            },
            action,
            reason,
            duration,
            created_at: content.timestamp,
            entry_ref: Some(entry.entry_ref()),
        })
    }

    /// Encode a case record as ledger entry content
    #[must_use]
    pub fn encode(record: &CaseRecord) -> EntryContent {
        let mut description = format!(
            "{MEMBER}{} ({})\n{ACTION}{}\n",
            record.subject.name, record.subject.id, record.action
        );
        let duration = record
            .duration
            .as_ref()
            .filter(|_| record.action.is_time_bounded());
        if let Some(duration) = duration {
            description.push_str(&format!("{LENGTH}{duration}\n"));
        }
        description.push_str(&format!("{REASON}{}", record.reason_text()));

        EntryContent {
            color: record.action.color(),
            author_name: record.issuer.name.clone(),
            author_icon: record.issuer.icon.clone(),
            description,
            footer: Self::footer(record.case_number),
            timestamp: record.created_at,
        }
    }

    /// Case number from an entry footer
    #[must_use]
    pub fn case_number(content: &EntryContent) -> Option<u64> {
        content.footer.trim().strip_prefix(FOOTER)?.parse().ok()
    }

    /// Footer text for a case number
    #[must_use]
    pub fn footer(case_number: u64) -> String {
        format!("{FOOTER}{case_number}")
    }

    /// Replace the reason, dropping everything after the reason line.
    /// Appends a reason line if the description has none.
    #[must_use]
    pub fn set_reason(description: &str, reason: &str) -> String {
        let reason_line = format!("{REASON}{reason}");
        let mut lines: Vec<&str> = description.split('\n').collect();
        match Layout::of(&lines).reason {
            Some(i) => {
                lines.truncate(i);
                lines.push(reason_line.as_str());
            }
            None => lines.push(reason_line.as_str()),
        }
        lines.join("\n")
    }

    /// Replace the length, or insert one directly after the action line.
    /// Leaves the description untouched if it has no action line.
    #[must_use]
    pub fn set_duration(description: &str, duration: &str) -> String {
        let length_line = format!("{LENGTH}{duration}");
        let mut lines: Vec<&str> = description.split('\n').collect();
        let layout = Layout::of(&lines);
        match (layout.length, layout.action) {
            (Some(i), _) => lines[i] = length_line.as_str(),
            (None, Some(i)) => lines.insert(i + 1, length_line.as_str()),
            (None, None) => {}
        }
        lines.join("\n")
    }

    /// Replace the action line. Leaves the description untouched if it has
    /// no action line.
    #[must_use]
    pub fn set_action(description: &str, action: CaseAction) -> String {
        let action_line = format!("{ACTION}{action}");
        let mut lines: Vec<&str> = description.split('\n').collect();
        if let Some(i) = Layout::of(&lines).action {
            lines[i] = action_line.as_str();
        }
        lines.join("\n")
    }
}

/// Parse `**Member:** <name> (<id>)`. The ID is taken from the last
/// parenthesised group so names containing parentheses still parse. Only
/// the single separating space is stripped from the name.
fn parse_member(line: &str) -> Option<Subject> {
    let rest = line.strip_prefix(MEMBER)?.trim_end().strip_suffix(')')?;
    let open = rest.rfind('(')?;
    let id = rest[open + 1..].parse().ok()?;
    let name = rest[..open].strip_suffix(' ')?;
    Some(Subject::new(id, name))
}
