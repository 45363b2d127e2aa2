use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

/// Resource families served by the API, each backed by a document collection
/// plus a single-document "latest" pointer collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Flights,
    Quakes,
    Weather,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Flights, Dataset::Quakes, Dataset::Weather];

    pub fn collection(&self) -> &'static str {
        match self {
            Dataset::Flights => "flights",
            Dataset::Quakes => "quakes",
            Dataset::Weather => "weather",
        }
    }

    pub fn latest_collection(&self) -> &'static str {
        match self {
            Dataset::Flights => "latestFlight",
            Dataset::Quakes => "latestQuake",
            Dataset::Weather => "latestWeather",
        }
    }
}

impl Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.collection())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "flights" => Ok(Dataset::Flights),
            "quakes" => Ok(Dataset::Quakes),
            "weather" => Ok(Dataset::Weather),
            other => Err(format!("Unsupported dataset: {}", other)),
        }
    }
}
