//! Common types for BotSentry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for bots
pub type BotId = Uuid;

/// Unique identifier for bot messages
pub type MessageId = Uuid;

/// Unique identifier for (human) users that claim bots
pub type UserId = Uuid;

/// Unique identifier for bulk signup alerts
pub type AlertId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Bot reputation status.
///
/// Variants are declared in escalation order so that `Ord` reflects
/// severity: `Normal < Flagged < UnderReview < Suspended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Normal,
    Flagged,
    UnderReview,
    Suspended,
}

impl BotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotStatus::Normal => "normal",
            BotStatus::Flagged => "flagged",
            BotStatus::UnderReview => "under_review",
            BotStatus::Suspended => "suspended",
        }
    }

    /// Statuses shown in the flagged-bots listing
    pub fn restricted() -> [BotStatus; 3] {
        [BotStatus::Flagged, BotStatus::UnderReview, BotStatus::Suspended]
    }
}

impl std::fmt::Display for BotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BotStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(BotStatus::Normal),
            "flagged" => Ok(BotStatus::Flagged),
            "under_review" => Ok(BotStatus::UnderReview),
            "suspended" => Ok(BotStatus::Suspended),
            other => Err(crate::Error::Validation(format!("Unknown bot status: {}", other))),
        }
    }
}

/// Status suggested by the content classifier for a single message.
///
/// `normal` is never a valid suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedStatus {
    Flagged,
    UnderReview,
    Suspended,
}

impl SuggestedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestedStatus::Flagged => "flagged",
            SuggestedStatus::UnderReview => "under_review",
            SuggestedStatus::Suspended => "suspended",
        }
    }
}

impl From<SuggestedStatus> for BotStatus {
    fn from(s: SuggestedStatus) -> Self {
        match s {
            SuggestedStatus::Flagged => BotStatus::Flagged,
            SuggestedStatus::UnderReview => BotStatus::UnderReview,
            SuggestedStatus::Suspended => BotStatus::Suspended,
        }
    }
}

impl std::fmt::Display for SuggestedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SuggestedStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flagged" => Ok(SuggestedStatus::Flagged),
            "under_review" => Ok(SuggestedStatus::UnderReview),
            "suspended" => Ok(SuggestedStatus::Suspended),
            other => Err(crate::Error::Validation(format!(
                "Unknown suggested status: {}",
                other
            ))),
        }
    }
}

/// Direction of a bot message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "inbound",
            MessageDirection::Outbound => "outbound",
        }
    }
}

impl std::fmt::Display for MessageDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bulk signup alert lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    Approved,
    Ignored,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Pending => "pending",
            AlertStatus::Approved => "approved",
            AlertStatus::Ignored => "ignored",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AlertStatus::Pending),
            "approved" => Ok(AlertStatus::Approved),
            "ignored" => Ok(AlertStatus::Ignored),
            other => Err(crate::Error::Validation(format!(
                "Unknown alert status: {}",
                other
            ))),
        }
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_is_escalation_order() {
        assert!(BotStatus::Normal < BotStatus::Flagged);
        assert!(BotStatus::Flagged < BotStatus::UnderReview);
        assert!(BotStatus::UnderReview < BotStatus::Suspended);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("under_review".parse::<BotStatus>().unwrap(), BotStatus::UnderReview);
        assert!("banned".parse::<BotStatus>().is_err());
        assert!("normal".parse::<SuggestedStatus>().is_err());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(BotStatus::UnderReview.to_string(), "under_review");
        assert_eq!(AlertStatus::Ignored.to_string(), "ignored");
        assert_eq!(MessageDirection::Outbound.to_string(), "outbound");
    }

    #[test]
    fn test_suggested_status_serde() {
        let s: SuggestedStatus = serde_json::from_str("\"under_review\"").unwrap();
        assert_eq!(BotStatus::from(s), BotStatus::UnderReview);
        assert!(serde_json::from_str::<SuggestedStatus>("\"spam\"").is_err());
    }
}
