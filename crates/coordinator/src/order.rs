//! Spike ordering

use std::fmt;
use std::str::FromStr;

use crate::error::CoordinatorError;

/// Declared sort order of a spike population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpikeOrder {
    /// Events kept in arrival order
    None,
    /// Events ordered by node id
    ById,
    /// Events ordered by timestamp
    #[default]
    ByTime,
}

impl SpikeOrder {
    /// Attribute value written as the `sorting` enum
    pub fn as_str(&self) -> &'static str {
        match self {
            SpikeOrder::None => "none",
            SpikeOrder::ById => "by_id",
            SpikeOrder::ByTime => "by_time",
        }
    }
}

impl fmt::Display for SpikeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SpikeOrder {
    type Err = CoordinatorError;

    /// An empty string requests the default ordering (`by_time`)
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "by_time" => Ok(SpikeOrder::ByTime),
            "by_id" => Ok(SpikeOrder::ById),
            "none" => Ok(SpikeOrder::None),
            other => Err(CoordinatorError::UnknownSpikeOrder {
                order: other.to_string(),
            }),
        }
    }
}
