//! Domain enums and the `Asin` identifier type.
//!
//! All enums round-trip through the snake_case string forms stored in the
//! database; `as_str`/`FromStr` are the single source of truth for those
//! spellings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ParseDomainError;

/// Ten-character marketplace product identifier (uppercase alphanumeric).
///
/// Used as the stable primary key across the catalog, snapshot history,
/// event tables, and scoring artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asin(String);

impl Asin {
    /// Validates and wraps a raw identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ParseDomainError`] unless the input is exactly 10 ASCII
    /// alphanumeric characters.
    pub fn new(raw: &str) -> Result<Self, ParseDomainError> {
        let trimmed = raw.trim();
        if trimmed.len() == 10 && trimmed.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(ParseDomainError {
                kind: "asin",
                value: raw.to_string(),
            })
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl FromStr for Asin {
    type Err = ParseDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Asin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ParseDomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseDomainError {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// Observed listing availability.
    StockStatus {
        InStock => "in_stock",
        LowStock => "low_stock",
        OutOfStock => "out_of_stock",
        BackOrdered => "back_ordered",
        Unknown => "unknown",
    }
}

string_enum! {
    /// Who fulfils the buy-box offer.
    Fulfillment {
        Fba => "fba",
        Fbm => "fbm",
        FirstParty => "first_party",
        Unknown => "unknown",
    }
}

string_enum! {
    /// Importance of a detected market event.
    EventSeverity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

string_enum! {
    /// Direction of a price or rank movement. For rank events `Up` means the
    /// rank number fell, i.e. the product is selling better.
    MovementDirection {
        Up => "up",
        Down => "down",
        Stable => "stable",
    }
}

string_enum! {
    /// Classification of a stock-status transition.
    StockEventKind {
        Stockout => "stockout",
        Restock => "restock",
        LowStockAlert => "low_stock_alert",
        StatusChange => "status_change",
    }
}

string_enum! {
    /// Actionability window of a scored opportunity. Distinct from
    /// [`EventSeverity`]: the two vocabularies overlap on `critical` but
    /// classify different things and must not be unified.
    OpportunityUrgency {
        Critical => "critical",
        Urgent => "urgent",
        Active => "active",
        Standard => "standard",
        Extended => "extended",
    }
}

string_enum! {
    /// Lifecycle state of a pipeline run.
    RunStatus {
        Running => "running",
        Completed => "completed",
        Degraded => "degraded",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RunStatus {
    /// Process exit code for the CLI: 0 completed, 2 degraded, 3 failed,
    /// 130 cancelled.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Completed => 0,
            Self::Degraded => 2,
            Self::Running | Self::Failed => 3,
            Self::Cancelled => 130,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asin_accepts_ten_alphanumeric_chars() {
        let asin = Asin::new("b09test123").expect("valid asin");
        assert_eq!(asin.as_str(), "B09TEST123");
    }

    #[test]
    fn asin_rejects_wrong_length() {
        assert!(Asin::new("B09SHORT").is_err());
        assert!(Asin::new("B09TOOLONG123").is_err());
    }

    #[test]
    fn asin_rejects_non_alphanumeric() {
        assert!(Asin::new("B09-EST123").is_err());
    }

    #[test]
    fn stock_status_round_trips() {
        for status in [
            StockStatus::InStock,
            StockStatus::LowStock,
            StockStatus::OutOfStock,
            StockStatus::BackOrdered,
            StockStatus::Unknown,
        ] {
            assert_eq!(status.as_str().parse::<StockStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_stock_status_is_error() {
        assert!("in stock".parse::<StockStatus>().is_err());
    }

    #[test]
    fn run_status_exit_codes_match_contract() {
        assert_eq!(RunStatus::Completed.exit_code(), 0);
        assert_eq!(RunStatus::Degraded.exit_code(), 2);
        assert_eq!(RunStatus::Failed.exit_code(), 3);
        assert_eq!(RunStatus::Cancelled.exit_code(), 130);
    }

    #[test]
    fn urgency_serializes_snake_case() {
        let json = serde_json::to_string(&OpportunityUrgency::Extended).unwrap();
        assert_eq!(json, "\"extended\"");
    }
}
