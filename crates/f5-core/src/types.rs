use crate::error::F5Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Analytical,
    Planning,
    Coding,
    Debugging,
    Reviewing,
    Documenting,
}

impl Mode {
    pub fn all() -> &'static [Mode] {
        &[
            Mode::Analytical,
            Mode::Planning,
            Mode::Coding,
            Mode::Debugging,
            Mode::Reviewing,
            Mode::Documenting,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Analytical => "analytical",
            Mode::Planning => "planning",
            Mode::Coding => "coding",
            Mode::Debugging => "debugging",
            Mode::Reviewing => "reviewing",
            Mode::Documenting => "documenting",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = F5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::all()
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| F5Error::UnknownMode(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Persona
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    #[default]
    Architect,
    Analyst,
    Developer,
    Devops,
    Security,
    Qa,
    Product,
}

impl Persona {
    pub fn all() -> &'static [Persona] {
        &[
            Persona::Architect,
            Persona::Analyst,
            Persona::Developer,
            Persona::Devops,
            Persona::Security,
            Persona::Qa,
            Persona::Product,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Persona::Architect => "architect",
            Persona::Analyst => "analyst",
            Persona::Developer => "developer",
            Persona::Devops => "devops",
            Persona::Security => "security",
            Persona::Qa => "qa",
            Persona::Product => "product",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persona {
    type Err = F5Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Persona::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| F5Error::UnknownPersona(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
