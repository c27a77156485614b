//! Connection action types produced by a decision.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Action represents what the data-plane must do with a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum Action {
    /// Forward to the original destination without an upstream hop
    #[default]
    Direct = 0,
    /// Close the connection
    Block = 1,
    /// Forward through an upstream proxy
    Proxy = 2,
    /// Forward to a rewritten destination
    Override = 3,
}

impl Action {
    /// Convert from a u8 value.
    ///
    /// Returns `None` for invalid values.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Action::Direct),
            1 => Some(Action::Block),
            2 => Some(Action::Proxy),
            3 => Some(Action::Override),
            _ => None,
        }
    }

    /// Convert to a u8 value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Direct => "DIRECT",
            Action::Block => "BLOCK",
            Action::Proxy => "PROXY",
            Action::Override => "OVERRIDE",
        }
    }

    /// Whether the data-plane must terminate the connection.
    pub fn is_terminal(self) -> bool {
        self == Action::Block
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DIRECT" => Ok(Action::Direct),
            "BLOCK" | "REJECT" => Ok(Action::Block),
            "PROXY" => Ok(Action::Proxy),
            "OVERRIDE" => Ok(Action::Override),
            _ => Err(()),
        }
    }
}

/// What to do with a connection when no candidate route matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Fallback {
    /// Let unknown traffic through
    #[default]
    Direct,
    /// Close unknown traffic
    Block,
}

impl Fallback {
    /// The action a fallback decision carries.
    pub fn action(self) -> Action {
        match self {
            Fallback::Direct => Action::Direct,
            Fallback::Block => Action::Block,
        }
    }
}
