//! Static import scanning and module presence probing
//!
//! Requirements are found by a line scan, not by parsing Python: an
//! `import a.b` or `from a.b import c` statement yields the top-level name
//! `a`. Presence is checked by asking the environment's interpreter to
//! import the module.
//!
//! Probing is best-effort. A module that is installed but raises while
//! importing (missing native library, bad config read at import time) is
//! reported absent, and the user will be offered an install that cannot
//! fix it.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, instrument, warn};

static IMPORT_STMT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+(.+)$").expect("import regex is valid"));
static FROM_STMT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^from\s+([A-Za-z_][\w.]*)\s+import\b").expect("from regex is valid")
});
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_]\w*$").expect("identifier regex is valid"));

/// Marker the batch probe prefixes to each missing name, so output printed
/// by modules during import is ignored
const MISSING_MARKER: &str = "__app_book_missing__ ";

/// Last line of a batch run that checked every module
const DONE_MARKER: &str = "__app_book_imports_done__";

// Each marker starts on a fresh line: an import may leave a partial line
// on stdout. A run that never reaches the done marker (an import called
// os._exit, say) is not trusted.
const BATCH_PROBE_SOURCE: &str = r#"import importlib, sys
for name in sys.argv[1:]:
    try:
        importlib.import_module(name)
    except BaseException:
        print("\n__app_book_missing__ " + name, flush=True)
print("\n__app_book_imports_done__", flush=True)
"#;

/// Whether a module can be imported by the environment's interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Present,
    Absent,
}

/// Top-level module names imported by `source`, in order of appearance.
///
/// Duplicates are kept. Relative imports are skipped since they never
/// name an installable module.
pub fn extract_requirements(source: &str) -> Vec<String> {
    let mut requirements = Vec::new();

    for raw_line in source.lines() {
        let line = strip_comment(raw_line.trim_start());

        if let Some(caps) = FROM_STMT.captures(line) {
            if let Some(name) = caps.get(1).and_then(|m| top_level(m.as_str())) {
                requirements.push(name);
            }
            continue;
        }

        if let Some(caps) = IMPORT_STMT.captures(line) {
            let Some(list) = caps.get(1) else { continue };
            for item in list.as_str().split(',') {
                let module = item.split_whitespace().next().unwrap_or("");
                if let Some(name) = top_level(module) {
                    requirements.push(name);
                }
            }
        }
    }

    requirements
}

fn strip_comment(line: &str) -> &str {
    let line = line.split('#').next().unwrap_or(line);
    line.split(';').next().unwrap_or(line).trim_end()
}

fn top_level(dotted: &str) -> Option<String> {
    let first = dotted.split('.').next()?;
    IDENTIFIER.is_match(first).then(|| first.to_string())
}

/// Check whether `module` imports under `interpreter`.
///
/// Any failure, including failure to start the interpreter, counts as
/// [`ModuleStatus::Absent`].
#[instrument(level = "debug", skip(interpreter))]
pub fn probe(module: &str, interpreter: &Path) -> ModuleStatus {
    if !IDENTIFIER.is_match(module) {
        debug!("Not a module name, treating as absent");
        return ModuleStatus::Absent;
    }

    let status = Command::new(interpreter)
        .arg("-c")
        .arg(format!("import {}", module))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => ModuleStatus::Present,
        Ok(status) => {
            debug!(code = ?status.code(), "Import failed");
            ModuleStatus::Absent
        }
        Err(e) => {
            debug!(error = %e, interpreter = %interpreter.display(), "Probe could not start");
            ModuleStatus::Absent
        }
    }
}

/// Check every module in one interpreter process.
///
/// Falls back to one process per module when the batch run cannot start,
/// exits unsuccessfully, or stops before reporting every module. The result
/// is index-aligned with `modules`.
#[instrument(level = "debug", skip_all, fields(count = modules.len()))]
pub fn probe_all(modules: &[String], interpreter: &Path) -> Vec<ModuleStatus> {
    if modules.is_empty() {
        return Vec::new();
    }

    let valid: Vec<&String> = modules.iter().filter(|m| IDENTIFIER.is_match(m)).collect();

    let output = Command::new(interpreter)
        .arg("-c")
        .arg(BATCH_PROBE_SOURCE)
        .args(&valid)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            match parse_batch_output(&stdout) {
                Some(missing) => modules
                    .iter()
                    .map(|m| {
                        if IDENTIFIER.is_match(m) && !missing.contains(&m.as_str()) {
                            ModuleStatus::Present
                        } else {
                            ModuleStatus::Absent
                        }
                    })
                    .collect(),
                None => {
                    warn!("Batch probe stopped early, probing one by one");
                    modules.iter().map(|m| probe(m, interpreter)).collect()
                }
            }
        }
        Ok(output) => {
            warn!(status = %output.status, "Batch probe failed, probing one by one");
            modules.iter().map(|m| probe(m, interpreter)).collect()
        }
        Err(e) => {
            debug!(error = %e, "Batch probe could not start, probing one by one");
            modules.iter().map(|m| probe(m, interpreter)).collect()
        }
    }
}

/// Names reported missing by a batch run, or `None` when the run did not
/// reach its done marker
fn parse_batch_output(stdout: &str) -> Option<Vec<&str>> {
    let mut missing = Vec::new();
    let mut done = false;
    for line in stdout.lines().map(str::trim) {
        if line == DONE_MARKER {
            done = true;
        } else if let Some(name) = line.strip_prefix(MISSING_MARKER) {
            missing.push(name.trim());
        }
    }
    done.then_some(missing)
}

/// Presence checks used by the installation mediator
pub trait ModuleProbe {
    fn probe(&self, module: &str, interpreter: &Path) -> ModuleStatus;

    /// Index-aligned statuses for `modules`
    fn probe_all(&self, modules: &[String], interpreter: &Path) -> Vec<ModuleStatus> {
        modules.iter().map(|m| self.probe(m, interpreter)).collect()
    }
}

/// Probes by running the real interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpreterProbe {
    /// Check all modules in a single process
    pub batch: bool,
}

impl ModuleProbe for InterpreterProbe {
    fn probe(&self, module: &str, interpreter: &Path) -> ModuleStatus {
        probe(module, interpreter)
    }

    fn probe_all(&self, modules: &[String], interpreter: &Path) -> Vec<ModuleStatus> {
        if self.batch {
            probe_all(modules, interpreter)
        } else {
            modules.iter().map(|m| probe(m, interpreter)).collect()
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
