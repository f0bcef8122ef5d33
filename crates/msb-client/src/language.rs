//! Language profiles: default images and package tooling per runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Runtime a sandbox is created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    Node,
}

impl Language {
    /// Tag sent to the orchestrator as `lang`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
        }
    }

    /// Image used when the start options do not name one.
    pub fn default_image(&self) -> &'static str {
        match self {
            Language::Python => "python:3.11-slim",
            Language::Node => "node:18-slim",
        }
    }

    /// Package manager program and its install sub-command.
    pub(crate) fn install_command(&self) -> (&'static str, &'static str) {
        match self {
            Language::Python => ("pip", "install"),
            Language::Node => ("npm", "install"),
        }
    }

    /// Program that reports the runtime version.
    pub(crate) fn version_program(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Node => "node",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "node" | "nodejs" | "js" | "javascript" => Ok(Language::Node),
            other => Err(format!("unknown language: {other}")),
        }
    }
}
