//! Gender, gender preference, and the availability pool buckets they map to.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A user's self-reported gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male.
    Male,
    /// Female.
    Female,
    /// Any other value, or not provided.
    Other,
}

impl Gender {
    /// Normalizes free-form client input; unknown or empty values become [`Gender::Other`].
    pub fn parse_lossy(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("male") | Some("m") => Self::Male,
            Some("female") | Some("f") => Self::Female,
            _ => Self::Other,
        }
    }

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
        }
    }

    /// The availability pool this gender is queued in.
    pub fn pool(&self) -> PoolBucket {
        match self {
            Self::Male => PoolBucket::Male,
            Self::Female => PoolBucket::Female,
            Self::Other => PoolBucket::Random,
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which gender a user wants to be matched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    /// Only male peers.
    Male,
    /// Only female peers.
    Female,
    /// Anyone.
    #[default]
    Random,
}

impl GenderPreference {
    /// Normalizes client input; anything unrecognised means "random".
    pub fn parse_lossy(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("male") => Self::Male,
            Some("female") => Self::Female,
            _ => Self::Random,
        }
    }

    /// Stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Random => "random",
        }
    }

    /// Whether a peer of `gender` satisfies this preference.
    pub fn accepts(&self, gender: Gender) -> bool {
        match self {
            Self::Random => true,
            Self::Male => gender == Gender::Male,
            Self::Female => gender == Gender::Female,
        }
    }

    /// Whether this is a filtered (non-random) preference.
    pub fn is_filtered(&self) -> bool {
        !matches!(self, Self::Random)
    }

    /// Pools to search, in order, for a requester holding this preference.
    pub fn search_pools(&self, fallback_to_general: bool) -> Vec<PoolBucket> {
        match self {
            Self::Male | Self::Female => {
                let mut pools = vec![if *self == Self::Male {
                    PoolBucket::Male
                } else {
                    PoolBucket::Female
                }];
                if fallback_to_general {
                    pools.push(PoolBucket::Random);
                }
                pools
            }
            Self::Random => PoolBucket::ALL.to_vec(),
        }
    }
}

impl fmt::Display for GenderPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gender-partitioned availability pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolBucket {
    /// Male users awaiting a match.
    Male,
    /// Female users awaiting a match.
    Female,
    /// Users with no (or another) stated gender.
    Random,
}

impl PoolBucket {
    /// Every pool, in a fixed order.
    pub const ALL: [PoolBucket; 3] = [PoolBucket::Male, PoolBucket::Female, PoolBucket::Random];

    /// Key fragment for this pool.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Random => "random",
        }
    }
}
