//! Compiler output parsing.
//!
//! Recognizes the `path:line:col: error: message` shape shared by swiftc,
//! clang and `cargo build --message-format short`. Warnings and notes are
//! ignored.

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use appforge_core::RawDiagnostic;
use regex::Regex;

/// Diagnostics kept from a single build.
pub const MAX_DIAGNOSTICS: usize = 200;

fn error_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)^(?P<path>[^:\n]+):(?P<line>\d+):(?P<col>\d+):\s+(?:fatal\s+)?error(?:\[\w+\])?:\s+(?P<msg>.+?)\s*$",
        )
        .expect("diagnostic regex is valid")
    })
}

/// Parse error diagnostics out of compiler output.
///
/// Paths under `root` are made relative to it so they line up with planned
/// unit paths. Identical lines are reported once and at most `cap` are kept.
pub fn parse_diagnostics(output: &str, root: Option<&Path>, cap: usize) -> Vec<RawDiagnostic> {
    let mut seen = HashSet::new();
    let mut diagnostics = Vec::new();

    for caps in error_line().captures_iter(output) {
        if diagnostics.len() >= cap {
            break;
        }
        let (Ok(line), Ok(col)) = (caps["line"].parse::<u32>(), caps["col"].parse::<u32>()) else {
            continue;
        };
        let unit = relative_unit(caps["path"].trim(), root);
        let message = caps["msg"].to_string();
        if !seen.insert((unit.clone(), line, col, message.clone())) {
            continue;
        }
        diagnostics.push(RawDiagnostic::new(unit, message).at(line, col));
    }
    diagnostics
}

fn relative_unit(path: &str, root: Option<&Path>) -> String {
    let path = Path::new(path);
    root.and_then(|root| path.strip_prefix(root).ok())
        .unwrap_or(path)
        .to_string_lossy()
        .trim_start_matches("./")
        .to_string()
}
