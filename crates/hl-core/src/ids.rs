use core::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Dotted sensor identifier, `section.name` (e.g. `aeration.do`).
    SensorId
);
string_id!(
    /// Identifier of a pump, blower, valve or dosing pump.
    EquipmentId
);
string_id!(
    /// Identifier of a redundancy group.
    GroupId
);

impl SensorId {
    /// Process section this sensor belongs to: the text before the first `.`.
    pub fn section(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }
}

/// The closed set of process controllers.
///
/// Declaration order is merge priority: when two controllers command the same
/// equipment id, the one declared first wins.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ControllerId {
    Intake,
    Treatment,
    Aeration,
    Dosing,
    Monitoring,
}

impl ControllerId {
    /// Fixed per-cycle evaluation order.
    pub const ALL: [ControllerId; 5] = [
        ControllerId::Intake,
        ControllerId::Treatment,
        ControllerId::Aeration,
        ControllerId::Dosing,
        ControllerId::Monitoring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Treatment => "treatment",
            Self::Aeration => "aeration",
            Self::Dosing => "dosing",
            Self::Monitoring => "monitoring",
        }
    }

    /// Lower value wins a command conflict.
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
