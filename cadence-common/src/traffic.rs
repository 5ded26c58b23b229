//! Traffic classes shared by the client loops and the server-side resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two kinds of synthetic traffic cadence generates and serves.
///
/// The class decides which arrival-time function drives the client loop and
/// which resource path the request is routed to on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    /// Requests emitted at a fixed, unchanging interval.
    Periodic,
    /// Requests emitted with exponentially distributed gaps (Poisson arrivals).
    Aperiodic,
}

impl TrafficClass {
    /// All classes, in the order resources are registered.
    pub const ALL: [TrafficClass; 2] = [TrafficClass::Aperiodic, TrafficClass::Periodic];

    /// Canonical resource path for this class.
    pub fn path(self) -> &'static str {
        match self {
            TrafficClass::Periodic => "periodic",
            TrafficClass::Aperiodic => "aperiodic",
        }
    }

    /// Resolve a resource path back to its class.
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.path() == path)
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.path())
    }
}

impl FromStr for TrafficClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path(s).ok_or_else(|| {
            format!("Unknown traffic class '{s}'. Valid options: periodic, aperiodic")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_distinct() {
        assert_eq!(TrafficClass::Periodic.path(), "periodic");
        assert_eq!(TrafficClass::Aperiodic.path(), "aperiodic");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(TrafficClass::from_path("periodic"), Some(TrafficClass::Periodic));
        assert_eq!(TrafficClass::from_path("aperiodic"), Some(TrafficClass::Aperiodic));
        assert_eq!(TrafficClass::from_path("delay-confirmable"), None);
    }

    #[test]
    fn test_parse_and_display() {
        let class: TrafficClass = "aperiodic".parse().unwrap();
        assert_eq!(class, TrafficClass::Aperiodic);
        assert_eq!(class.to_string(), "aperiodic");
        assert!("bursty".parse::<TrafficClass>().is_err());
    }
}
