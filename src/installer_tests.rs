use super::*;
use crate::resolver::extract_requirements;
use std::cell::{Cell, RefCell};
use tempfile::TempDir;

/// In-memory environment: probing consults `present`, installing adds to it
struct FakeEnvironment {
    present: RefCell<HashSet<String>>,
    probe_calls: Cell<usize>,
    install_calls: RefCell<Vec<Vec<String>>>,
    fail_install: bool,
}

impl FakeEnvironment {
    fn with_present(names: &[&str]) -> Self {
        Self {
            present: RefCell::new(names.iter().map(|s| s.to_string()).collect()),
            probe_calls: Cell::new(0),
            install_calls: RefCell::new(Vec::new()),
            fail_install: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail_install: true,
            ..Self::with_present(&[])
        }
    }
}

impl ModuleProbe for FakeEnvironment {
    fn probe(&self, module: &str, _interpreter: &Path) -> ModuleStatus {
        self.probe_calls.set(self.probe_calls.get() + 1);
        if self.present.borrow().contains(module) {
            ModuleStatus::Present
        } else {
            ModuleStatus::Absent
        }
    }
}

impl PackageInstaller for FakeEnvironment {
    fn install(&self, _interpreter: &Path, modules: &[String]) -> Result<()> {
        self.install_calls.borrow_mut().push(modules.to_vec());
        if self.fail_install {
            return Err(LauncherError::Installation {
                modules: modules.join(", "),
                message: "No matching distribution found".to_string(),
            });
        }
        self.present.borrow_mut().extend(modules.iter().cloned());
        Ok(())
    }
}

struct ScriptedPrompt {
    answer: bool,
    confirm_calls: RefCell<Vec<Vec<String>>>,
    offline_reports: RefCell<Vec<Vec<String>>>,
}

impl ScriptedPrompt {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            confirm_calls: RefCell::new(Vec::new()),
            offline_reports: RefCell::new(Vec::new()),
        }
    }

    fn interactions(&self) -> usize {
        self.confirm_calls.borrow().len() + self.offline_reports.borrow().len()
    }
}

impl InstallPrompt for ScriptedPrompt {
    fn confirm_install(&self, missing: &[String]) -> bool {
        self.confirm_calls.borrow_mut().push(missing.to_vec());
        self.answer
    }

    fn report_offline_missing(&self, missing: &[String]) {
        self.offline_reports.borrow_mut().push(missing.to_vec());
    }
}

const ONLINE: ResolutionPolicy = ResolutionPolicy {
    offline_mode: false,
};
const OFFLINE: ResolutionPolicy = ResolutionPolicy { offline_mode: true };

fn interpreter() -> PathBuf {
    PathBuf::from("/env/bin/python")
}

fn reqs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn log_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

#[test]
fn test_no_imports_is_fast_path() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(true);
    let mediator = InstallMediator::new(&env, &env, &prompt, tmp.path().join("install.log"));

    let requirements = extract_requirements("print('no imports here')\n");
    for policy in [ONLINE, OFFLINE] {
        let outcome = mediator.resolve(&requirements, &interpreter(), policy).unwrap();
        assert_eq!(outcome, ResolutionOutcome::default());
    }
    assert_eq!(prompt.interactions(), 0);
    assert!(env.install_calls.borrow().is_empty());
}

#[test]
fn test_all_present_is_noop_in_both_modes() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&["os", "json"]);
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    for policy in [ONLINE, OFFLINE] {
        let outcome = mediator
            .resolve(&reqs(&["os", "json", "os"]), &interpreter(), policy)
            .unwrap();
        assert!(outcome.missing.is_empty());
        assert!(outcome.installed.is_empty());
    }
    assert_eq!(prompt.interactions(), 0);
    assert!(!log.exists());
}

#[test]
fn test_offline_reports_and_never_installs() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&["os"]);
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    let outcome = mediator
        .resolve(&reqs(&["os", "requests"]), &interpreter(), OFFLINE)
        .unwrap();

    assert_eq!(outcome.missing, vec!["requests"]);
    assert!(outcome.installed.is_empty());
    assert!(env.install_calls.borrow().is_empty());
    assert!(prompt.confirm_calls.borrow().is_empty());
    assert_eq!(*prompt.offline_reports.borrow(), vec![reqs(&["requests"])]);
    assert!(!log.exists());
}

#[test]
fn test_confirmed_install_runs_once_and_logs_once() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    let outcome = mediator.resolve(&reqs(&["foo"]), &interpreter(), ONLINE).unwrap();

    assert_eq!(outcome.installed, vec!["foo"]);
    assert_eq!(outcome.missing, vec!["foo"]);
    assert!(outcome.is_satisfied());
    assert_eq!(*env.install_calls.borrow(), vec![reqs(&["foo"])]);

    let lines = log_lines(&log);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("foo"));
    assert_eq!(lines[0], "Installed for session: foo");
}

#[test]
fn test_unwritable_install_log_still_reports_installed() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("no/such/dir/install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    let outcome = mediator.resolve(&reqs(&["foo"]), &interpreter(), ONLINE).unwrap();

    assert_eq!(outcome.installed, vec!["foo"]);
    assert!(outcome.is_satisfied());
    assert_eq!(*env.install_calls.borrow(), vec![reqs(&["foo"])]);
    assert!(!log.exists());
}

#[test]
fn test_declined_install_does_nothing() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(false);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    let outcome = mediator
        .resolve(&reqs(&["yaml", "rich"]), &interpreter(), ONLINE)
        .unwrap();

    assert_eq!(outcome.missing, vec!["yaml", "rich"]);
    assert!(outcome.installed.is_empty());
    assert!(!outcome.is_satisfied());
    assert_eq!(prompt.confirm_calls.borrow().len(), 1);
    assert!(env.install_calls.borrow().is_empty());
    assert!(!log.exists());
}

#[test]
fn test_duplicates_install_each_name_once_in_order() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&["os"]);
    let prompt = ScriptedPrompt::answering(true);
    let mediator = InstallMediator::new(&env, &env, &prompt, tmp.path().join("install.log"));

    let requirements = extract_requirements(
        "import requests\nimport os\nfrom requests import get\nimport yaml\nimport requests.auth\n",
    );
    let outcome = mediator.resolve(&requirements, &interpreter(), ONLINE).unwrap();

    assert_eq!(outcome.installed, vec!["requests", "yaml"]);
    assert_eq!(*env.install_calls.borrow(), vec![reqs(&["requests", "yaml"])]);
    assert_eq!(*prompt.confirm_calls.borrow(), vec![reqs(&["requests", "yaml"])]);
    // one probe per distinct name
    assert_eq!(env.probe_calls.get(), 3);
}

#[test]
fn test_second_pass_after_install_takes_fast_path() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);
    let requirements = reqs(&["foo", "bar"]);

    let first = mediator.resolve(&requirements, &interpreter(), ONLINE).unwrap();
    assert_eq!(first.installed, vec!["foo", "bar"]);

    let second = mediator.resolve(&requirements, &interpreter(), ONLINE).unwrap();
    assert_eq!(second, ResolutionOutcome::default());
    assert_eq!(prompt.confirm_calls.borrow().len(), 1);
    assert_eq!(env.install_calls.borrow().len(), 1);
    assert_eq!(log_lines(&log), vec!["Installed for session: foo, bar"]);
}

#[test]
fn test_repeated_passes_without_changes_agree() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::with_present(&["os"]);
    let prompt = ScriptedPrompt::answering(false);
    let mediator = InstallMediator::new(&env, &env, &prompt, tmp.path().join("install.log"));
    let requirements = reqs(&["os", "numpy"]);

    for policy in [ONLINE, OFFLINE] {
        let first = mediator.resolve(&requirements, &interpreter(), policy).unwrap();
        let second = mediator.resolve(&requirements, &interpreter(), policy).unwrap();
        assert_eq!(first, second);
    }
}

#[test]
fn test_install_failure_propagates_and_records_nothing() {
    let tmp = TempDir::new().unwrap();
    let env = FakeEnvironment::failing();
    let prompt = ScriptedPrompt::answering(true);
    let log = tmp.path().join("install.log");
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);

    let err = mediator
        .resolve(&reqs(&["notapackage"]), &interpreter(), ONLINE)
        .unwrap_err();

    assert!(matches!(err, LauncherError::Installation { .. }));
    assert!(!log.exists());

    // the whole batch is offered again on the next pass
    let _ = mediator.resolve(&reqs(&["notapackage"]), &interpreter(), ONLINE);
    assert_eq!(prompt.confirm_calls.borrow().len(), 2);
}

#[test]
fn test_install_log_preserves_previous_sessions() {
    let tmp = TempDir::new().unwrap();
    let log = tmp.path().join("install.log");
    std::fs::write(&log, "Installed for session: older\n").unwrap();

    let env = FakeEnvironment::with_present(&[]);
    let prompt = ScriptedPrompt::answering(true);
    let mediator = InstallMediator::new(&env, &env, &prompt, &log);
    mediator.resolve(&reqs(&["newer"]), &interpreter(), ONLINE).unwrap();

    assert_eq!(
        log_lines(&log),
        vec!["Installed for session: older", "Installed for session: newer"]
    );
}

#[test]
fn test_pip_installer_missing_interpreter_fails() {
    let err = PipInstaller
        .install(Path::new("/no/such/python"), &reqs(&["foo"]))
        .unwrap_err();
    match err {
        LauncherError::Installation { modules, message } => {
            assert_eq!(modules, "foo");
            assert!(message.contains("cannot run pip"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[cfg(unix)]
#[test]
fn test_pip_installer_invocation_shape() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let record = tmp.path().join("argv");
    let python = tmp.path().join("python");
    std::fs::write(
        &python,
        format!("#!/bin/sh\necho \"$@\" > '{}'\n", record.display()),
    )
    .unwrap();
    std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

    PipInstaller.install(&python, &reqs(&["requests", "yaml"])).unwrap();
    assert_eq!(
        std::fs::read_to_string(&record).unwrap().trim(),
        "-m pip install requests yaml"
    );
}

#[test]
fn test_last_lines_keeps_tail() {
    assert_eq!(last_lines("a\n\nb\nc\n", 2), "b\nc");
    assert_eq!(last_lines("", 3), "");
}
