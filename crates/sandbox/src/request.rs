//! Build and run request types, flag validation, and stage results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use vibebolt_core::{Error, Result};

// =============================================================================
// Optimization Level
// =============================================================================

/// Compiler optimization level (`-C opt-level=<lvl>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    #[default]
    O0,
    O1,
    O2,
    O3,
    /// Optimize for size.
    S,
    /// Optimize for size, disabling loop vectorization.
    Z,
}

impl OptLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptLevel::O0 => "0",
            OptLevel::O1 => "1",
            OptLevel::O2 => "2",
            OptLevel::O3 => "3",
            OptLevel::S => "s",
            OptLevel::Z => "z",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "0" => Ok(OptLevel::O0),
            "1" => Ok(OptLevel::O1),
            "2" => Ok(OptLevel::O2),
            "3" => Ok(OptLevel::O3),
            "s" => Ok(OptLevel::S),
            "z" => Ok(OptLevel::Z),
            other => Err(Error::invalid_request(format!(
                "Unknown optimization level {:?} (expected one of 0, 1, 2, 3, s, z)",
                other
            ))),
        }
    }
}

impl Serialize for OptLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OptLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Tool callers send either "2" or 2
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Emission Kind
// =============================================================================

/// An additional compiler artifact beyond the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitKind {
    Asm,
    LlvmIr,
    Mir,
}

impl EmitKind {
    pub const ALL: [EmitKind; 3] = [EmitKind::LlvmIr, EmitKind::Asm, EmitKind::Mir];

    /// Key used in tool arguments and results.
    pub fn key(&self) -> &'static str {
        match self {
            EmitKind::Asm => "asm",
            EmitKind::LlvmIr => "llvm_ir",
            EmitKind::Mir => "mir",
        }
    }

    /// Name understood by `rustc --emit`.
    pub fn rustc_name(&self) -> &'static str {
        match self {
            EmitKind::Asm => "asm",
            EmitKind::LlvmIr => "llvm-ir",
            EmitKind::Mir => "mir",
        }
    }

    /// File suffix rustc gives this artifact.
    pub fn suffix(&self) -> &'static str {
        match self {
            EmitKind::Asm => ".s",
            EmitKind::LlvmIr => ".ll",
            EmitKind::Mir => ".mir",
        }
    }
}

impl FromStr for EmitKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asm" => Ok(EmitKind::Asm),
            "llvm_ir" => Ok(EmitKind::LlvmIr),
            "mir" => Ok(EmitKind::Mir),
            other => Err(Error::invalid_request(format!(
                "Unknown additional output {:?} (expected llvm_ir, asm or mir)",
                other
            ))),
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Compiler half of a build-and-run invocation.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Workspace-relative path of the crate root.
    pub entry: String,
    pub opt_level: OptLevel,
    /// Extra flags passed to the compiler, after the reserved ones.
    pub compiler_args: Vec<String>,
    /// Additional artifacts to emit and extract. Ordered and deduplicated.
    pub emit: Vec<EmitKind>,
    pub env: BTreeMap<String, String>,
}

/// Program half of a build-and-run invocation.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Text streamed into the program's standard input.
    pub stdin: Option<String>,
}

/// A full pipeline invocation.
#[derive(Debug, Clone)]
pub struct BuildAndRunRequest {
    pub build: BuildRequest,
    pub run: RunRequest,
    /// Stop after the build (and extraction).
    pub skip_run: bool,
    pub delete_storage_on_exit: bool,
    pub delete_containers_on_exit: bool,
}

impl BuildAndRunRequest {
    pub fn new(build: BuildRequest, run: RunRequest) -> Self {
        Self {
            build,
            run,
            skip_run: false,
            delete_storage_on_exit: true,
            delete_containers_on_exit: true,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one stage container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub combined_log: String,
}

impl StageResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Outcome of a pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildAndRunResult {
    pub build: StageResult,
    /// Present only when the build succeeded and the run was not skipped.
    pub run: Option<StageResult>,
    /// Present only when emissions were requested and the build succeeded.
    pub extracted: Option<BTreeMap<String, String>>,
}

impl BuildAndRunResult {
    pub fn build_succeeded(&self) -> bool {
        self.build.succeeded()
    }

    /// True when the build and (if present) the run both exited 0.
    pub fn succeeded(&self) -> bool {
        self.build_succeeded() && self.run.as_ref().map_or(true, StageResult::succeeded)
    }

    pub fn report(&self) -> BuildAndRunReport {
        BuildAndRunReport {
            build_success: self.build_succeeded(),
            build_logs: self.build.combined_log.clone(),
            build_code: self.build.exit_code,
            run_logs: self.run.as_ref().map(|r| r.combined_log.clone()),
            run_code: self.run.as_ref().map(|r| r.exit_code),
            additional_outputs: self.extracted.clone(),
        }
    }
}

/// Wire shape of a [`BuildAndRunResult`] at the tool boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildAndRunReport {
    pub build_success: bool,
    pub build_logs: String,
    pub build_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_logs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_outputs: Option<BTreeMap<String, String>>,
}

// =============================================================================
// Validation
// =============================================================================

/// Which build-stage control a caller-supplied flag would override, if any.
fn reserved_control(arg: &str, next: Option<&str>) -> Option<&'static str> {
    if arg.starts_with("--emit") {
        return Some("emission");
    }
    if arg == "-O" {
        return Some("optimization");
    }
    if arg.starts_with("-o") || arg.starts_with("--out-dir") {
        return Some("output path");
    }
    let codegen = arg
        .strip_prefix("--codegen")
        .map(|rest| rest.trim_start_matches('='))
        .or_else(|| arg.strip_prefix("-C"))
        .map(str::trim);
    match codegen {
        Some("") => next
            .filter(|n| n.trim().starts_with("opt-level"))
            .map(|_| "optimization"),
        Some(option) if option.starts_with("opt-level") => Some("optimization"),
        _ => None,
    }
}

/// Reject compiler flags that the build stage controls itself.
pub fn validate_compiler_args(args: &[String]) -> Result<()> {
    for (i, arg) in args.iter().enumerate() {
        let arg = arg.trim();
        let next = args.get(i + 1).map(String::as_str);
        if let Some(control) = reserved_control(arg, next) {
            return Err(Error::config_conflict(format!(
                "Compiler flag {:?} overrides the {} control; use the dedicated parameter instead",
                arg, control
            )));
        }
    }
    Ok(())
}

/// Render an environment mapping as `KEY=VALUE` pairs.
pub fn env_pairs(env: &BTreeMap<String, String>) -> Result<Vec<(String, String)>> {
    env.iter()
        .map(|(key, value)| {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                Err(Error::invalid_request(format!(
                    "Invalid environment variable name {:?}",
                    key
                )))
            } else {
                Ok((key.clone(), value.clone()))
            }
        })
        .collect()
}

/// Order and deduplicate requested emission kinds.
pub fn normalize_emissions(kinds: impl IntoIterator<Item = EmitKind>) -> Vec<EmitKind> {
    let mut kinds: Vec<EmitKind> = kinds.into_iter().collect();
    kinds.sort();
    kinds.dedup();
    kinds
}
