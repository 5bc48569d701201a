use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lowest and highest star rating a review may carry.
pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

/// A user's attendance response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RsvpStatus {
    #[default]
    Going,
    Maybe,
    #[serde(rename = "Not Going")]
    NotGoing,
}

impl RsvpStatus {
    pub const ALL: [RsvpStatus; 3] = [RsvpStatus::Going, RsvpStatus::Maybe, RsvpStatus::NotGoing];

    /// The stored and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Going => "Going",
            Self::Maybe => "Maybe",
            Self::NotGoing => "Not Going",
        }
    }
}

impl fmt::Display for RsvpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidStatus(pub String);

impl fmt::Display for InvalidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid RSVP status", self.0)
    }
}

impl std::error::Error for InvalidStatus {}

impl FromStr for RsvpStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| InvalidStatus(s.to_string()))
    }
}

/// Rounds a mean rating to one decimal place. `None` stays `None` (no reviews).
pub fn round_rating(mean: Option<f64>) -> Option<f64> {
    mean.map(|m| (m * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_only_known_values() {
        assert_eq!("Going".parse::<RsvpStatus>(), Ok(RsvpStatus::Going));
        assert_eq!("Not Going".parse::<RsvpStatus>(), Ok(RsvpStatus::NotGoing));
        assert!("going".parse::<RsvpStatus>().is_err());
        assert!("NotGoing".parse::<RsvpStatus>().is_err());
    }

    #[test]
    fn status_serializes_with_space() {
        let json = serde_json::to_string(&RsvpStatus::NotGoing).unwrap();
        assert_eq!(json, "\"Not Going\"");
    }

    #[test]
    fn rating_rounds_to_one_decimal() {
        assert_eq!(round_rating(None), None);
        assert_eq!(round_rating(Some(4.0)), Some(4.0));
        assert_eq!(round_rating(Some(11.0 / 3.0)), Some(3.7));
        assert_eq!(round_rating(Some(4.25)), Some(4.3));
    }
}
