use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(InstanceId);

/// One of the two cooperating UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointId {
    Display,
    Controller,
}

impl EndpointId {
    pub const ALL: [EndpointId; 2] = [EndpointId::Display, EndpointId::Controller];

    pub fn as_str(self) -> &'static str {
        match self {
            EndpointId::Display => "display",
            EndpointId::Controller => "controller",
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown endpoint '{0}', expected 'display' or 'controller'")]
pub struct UnknownEndpoint(pub String);

impl FromStr for EndpointId {
    type Err = UnknownEndpoint;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "display" => Ok(EndpointId::Display),
            "controller" => Ok(EndpointId::Controller),
            _ => Err(UnknownEndpoint(raw.to_string())),
        }
    }
}

/// Lifecycle of a single endpoint instance as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    Uninitialized,
    Launching,
    Ready,
    Closed,
}

impl EndpointState {
    /// `Ready` is only reachable from `Launching`; `Closed` is terminal.
    pub fn can_transition_to(self, next: EndpointState) -> bool {
        use EndpointState::*;
        matches!(
            (self, next),
            (Uninitialized, Launching)
                | (Launching, Ready)
                | (Uninitialized, Closed)
                | (Launching, Closed)
                | (Ready, Closed)
        )
    }
}
