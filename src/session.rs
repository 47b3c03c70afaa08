//! Background validation
//!
//! Provisioning, probing and installing all block, so they run on a worker
//! thread. The worker talks to the foreground only through a channel of
//! [`ValidationEvent`]s; the one question it needs answered (install the
//! missing modules?) travels as an event carrying its own reply sender.

use std::path::PathBuf;
use std::thread;

use async_channel::{Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use crate::config::ResolutionPolicy;
use crate::environment::IsolatedEnvironment;
use crate::error::{LauncherError, Result};
use crate::installer::{InstallMediator, InstallPrompt, PackageInstaller, PipInstaller, ResolutionOutcome};
use crate::resolver::{extract_requirements, InterpreterProbe, ModuleProbe};

const EVENT_QUEUE_CAPACITY: usize = 16;

/// Everything one validation pass needs
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub script: PathBuf,
    pub environment: IsolatedEnvironment,
    pub policy: ResolutionPolicy,
    pub install_log: PathBuf,
}

/// A script that passed validation and can be launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// This pass provisioned the environment
    pub environment_created: bool,
    pub interpreter: PathBuf,
    pub outcome: ResolutionOutcome,
}

/// Messages from the validation worker to the foreground
#[derive(Debug)]
pub enum ValidationEvent {
    Status(String),
    /// Answer through `reply`; dropping it counts as "no"
    ConfirmInstall {
        missing: Vec<String>,
        reply: Sender<bool>,
    },
    OfflineMissing(Vec<String>),
    /// Always the last event
    Finished(Result<Validation>),
}

/// Run validation on a worker thread with the real interpreter probe and
/// pip installer
pub fn spawn_validation(request: ValidationRequest) -> Receiver<ValidationEvent> {
    spawn_validation_with(request, InterpreterProbe { batch: true }, PipInstaller)
}

/// Same as [`spawn_validation`] with caller-supplied probe and installer
pub fn spawn_validation_with<P, I>(
    request: ValidationRequest,
    probe: P,
    installer: I,
) -> Receiver<ValidationEvent>
where
    P: ModuleProbe + Send + 'static,
    I: PackageInstaller + Send + 'static,
{
    let (tx, rx) = async_channel::bounded(EVENT_QUEUE_CAPACITY);

    let worker_tx = tx.clone();
    let spawned = thread::Builder::new()
        .name("app-book-validate".to_string())
        .spawn(move || {
            let result = validate(&request, &probe, &installer, &worker_tx);
            if worker_tx.send_blocking(ValidationEvent::Finished(result)).is_err() {
                debug!("Validation result dropped, foreground went away");
            }
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Could not start validation worker");
        let _ = tx.try_send(ValidationEvent::Finished(Err(LauncherError::Config(format!(
            "cannot start validation worker: {}",
            e
        )))));
    }

    rx
}

#[instrument(level = "info", skip_all, fields(script = %request.script.display()))]
fn validate(
    request: &ValidationRequest,
    probe: &dyn ModuleProbe,
    installer: &dyn PackageInstaller,
    tx: &Sender<ValidationEvent>,
) -> Result<Validation> {
    let status = |message: String| {
        let _ = tx.send_blocking(ValidationEvent::Status(message));
    };

    status("Checking virtual environment...".to_string());
    let environment_created = request.environment.ensure_environment()?;
    if environment_created {
        status("Virtual environment created.".to_string());
    }

    let source = std::fs::read_to_string(&request.script)
        .map_err(|e| LauncherError::storage(&request.script, e))?;
    let requirements = extract_requirements(&source);
    status(format!("Checking {} import(s)...", requirements.len()));

    let interpreter = request.environment.interpreter_path();
    let prompt = ChannelPrompt { tx: tx.clone() };
    let mediator = InstallMediator::new(probe, installer, &prompt, &request.install_log);
    let outcome = mediator.resolve(&requirements, &interpreter, request.policy)?;

    info!(
        missing = outcome.missing.len(),
        installed = outcome.installed.len(),
        "Validation finished"
    );

    Ok(Validation {
        environment_created,
        interpreter,
        outcome,
    })
}

/// Forwards prompt requests to the foreground and waits for the answer
struct ChannelPrompt {
    tx: Sender<ValidationEvent>,
}

impl InstallPrompt for ChannelPrompt {
    fn confirm_install(&self, missing: &[String]) -> bool {
        let (reply, answer) = async_channel::bounded(1);
        let asked = self.tx.send_blocking(ValidationEvent::ConfirmInstall {
            missing: missing.to_vec(),
            reply,
        });
        if asked.is_err() {
            return false;
        }
        answer.recv_blocking().unwrap_or(false)
    }

    fn report_offline_missing(&self, missing: &[String]) {
        let _ = self
            .tx
            .send_blocking(ValidationEvent::OfflineMissing(missing.to_vec()));
    }
}
