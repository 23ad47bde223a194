//! Command definitions for toolchains and agent processes.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BuildError;

/// Builtin build toolchains.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Toolchain {
    /// swift build
    Swift,

    /// xcodebuild build -quiet
    Xcodebuild,

    /// cargo build --message-format short
    Cargo,
}

impl Toolchain {
    /// Get the toolchain name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Toolchain::Swift => "swift_build",
            Toolchain::Xcodebuild => "xcodebuild",
            Toolchain::Cargo => "cargo_build",
        }
    }

    /// Get the build command.
    pub fn command(&self) -> Vec<String> {
        let argv: &[&str] = match self {
            Toolchain::Swift => &["swift", "build"],
            Toolchain::Xcodebuild => &["xcodebuild", "build", "-quiet"],
            Toolchain::Cargo => &["cargo", "build", "--message-format", "short"],
        };
        argv.iter().map(|s| s.to_string()).collect()
    }
}

impl FromStr for Toolchain {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swift" | "swift_build" => Ok(Toolchain::Swift),
            "xcodebuild" | "xcode" => Ok(Toolchain::Xcodebuild),
            "cargo" | "cargo_build" => Ok(Toolchain::Cargo),
            other => Err(BuildError::UnknownToolchain(other.to_string())),
        }
    }
}

/// An external command to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Human-readable name used in logs and errors.
    pub name: String,

    /// Command to execute (first element is executable).
    pub command: Vec<String>,

    /// Directory to run in. Defaults to the current directory.
    pub working_dir: Option<PathBuf>,

    /// Timeout in seconds. Zero disables it.
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn from_toolchain(toolchain: Toolchain, timeout_secs: u64) -> Self {
        Self {
            name: toolchain.name().to_string(),
            command: toolchain.command(),
            working_dir: None,
            timeout_secs,
        }
    }

    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            working_dir: None,
            timeout_secs,
        }
    }

    /// Split a shell-style command line on whitespace. Quoting is not supported.
    pub fn parse(name: impl Into<String>, line: &str, timeout_secs: u64) -> Result<Self, BuildError> {
        let name = name.into();
        let command: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            return Err(BuildError::EmptyCommand(name));
        }
        Ok(Self::custom(name, command, timeout_secs))
    }

    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolchain_commands() {
        assert_eq!(Toolchain::Swift.command(), ["swift", "build"]);
        assert_eq!(Toolchain::Xcodebuild.command()[0], "xcodebuild");
        assert!(Toolchain::Cargo.command().contains(&"short".to_string()));
    }

    #[test]
    fn test_toolchain_from_str() {
        assert_eq!("Swift".parse::<Toolchain>().unwrap(), Toolchain::Swift);
        assert_eq!("xcode".parse::<Toolchain>().unwrap(), Toolchain::Xcodebuild);
        assert!(matches!(
            "gradle".parse::<Toolchain>(),
            Err(BuildError::UnknownToolchain(_))
        ));
    }

    #[test]
    fn test_spec_from_toolchain() {
        let spec = CommandSpec::from_toolchain(Toolchain::Swift, 300).in_dir("/tmp/app");
        assert_eq!(spec.name, "swift_build");
        assert_eq!(spec.timeout_secs, 300);
        assert_eq!(spec.program(), Some("swift"));
        assert_eq!(spec.working_dir.as_deref(), Some(Path::new("/tmp/app")));
    }

    #[test]
    fn test_parse_command_line() {
        let spec = CommandSpec::parse("agent", "  my-agent --json  --model fast ", 60).unwrap();
        assert_eq!(spec.command, ["my-agent", "--json", "--model", "fast"]);
        assert!(matches!(
            CommandSpec::parse("agent", "   ", 60),
            Err(BuildError::EmptyCommand(_))
        ));
    }
}
