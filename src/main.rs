//! Terminal front end for the launcher.
//!
//! Stands in for a graphical shell: every command maps onto one library
//! operation and prints what a window would show.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use app_book::autostart;
use app_book::config::{self, Settings};
use app_book::environment::IsolatedEnvironment;
use app_book::error::{ErrorSeverity, LauncherError, ResultExt};
use app_book::logging;
use app_book::registry::{self, AppDescriptor};
use app_book::runner::{self, RunEvent};
use app_book::session::{self, ValidationEvent, ValidationRequest};
use app_book::setup::{self, LauncherPaths};

#[derive(Parser, Debug)]
#[command(name = "app-book", version, about = "Launch personal script apps in an isolated environment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed apps
    List,
    /// Filter apps by name, description or category
    Search { term: String },
    /// Show an app's metadata
    Info { app: String },
    /// Validate dependencies and run an app
    Run {
        app: String,
        /// Arguments passed to the app verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Copy a .app file into the apps directory
    Install { path: PathBuf },
    /// Create the virtual environment if needed and report its state
    Env,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    Set {
        #[arg(long)]
        run_on_startup: Option<bool>,
        #[arg(long)]
        font_size: Option<u32>,
        #[arg(long)]
        python_path: Option<String>,
        #[arg(long)]
        offline_mode: Option<bool>,
        #[arg(long)]
        theme: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = LauncherPaths::from_env();
    let setup = setup::ensure_launcher_setup(&paths);
    let _guard = logging::init(&paths.logs_dir());

    for warning in &setup.warnings {
        warn!(warning = %warning, "Setup warning");
    }
    if setup.is_fresh_install {
        info!(home = %paths.home.display(), "Created launcher home");
    }

    match cli.command {
        Command::List => print_apps(&registry::list_apps(&paths.apps_dir())),
        Command::Search { term } => {
            let apps = registry::list_apps(&paths.apps_dir());
            print_apps(&registry::filter_apps(&apps, &term));
        }
        Command::Info { app } => {
            let app = lookup(&paths, &app)?;
            print_info(&app);
        }
        Command::Run { app, args } => {
            let app = lookup(&paths, &app)?;
            let settings = launch_settings(&paths);
            return run_app(&paths, &settings, &app, args);
        }
        Command::Install { path } => {
            let installed = registry::install_app(&path, &paths.apps_dir()).map_err(surface)?;
            println!("Installed {}", installed.display());
        }
        Command::Env => {
            let settings = launch_settings(&paths);
            let environment = environment_for(&paths, &settings);
            println!("[Checking For Virtual Environment...]");
            if environment.ensure_environment().map_err(surface)? {
                println!("[Virtual Environment Created!]");
            } else {
                println!("Virtual Environment Found!");
            }
            println!("Interpreter: {}", environment.interpreter_path().display());
        }
        Command::Settings { action } => match action.unwrap_or(SettingsAction::Show) {
            SettingsAction::Show => {
                let settings = config::load_settings(&paths.settings_file()).map_err(surface)?;
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
            SettingsAction::Set {
                run_on_startup,
                font_size,
                python_path,
                offline_mode,
                theme,
            } => {
                let (previous, updated) =
                    config::update_settings(&paths.settings_file(), |settings| {
                        if let Some(value) = run_on_startup {
                            settings.run_on_startup = value;
                        }
                        if let Some(value) = font_size {
                            settings.font_size = value;
                        }
                        if let Some(value) = python_path {
                            settings.python_path = value;
                        }
                        if let Some(value) = offline_mode {
                            settings.offline_mode = value;
                        }
                        if let Some(value) = theme {
                            settings.theme = value;
                        }
                    })
                    .map_err(surface)?;

                if previous.run_on_startup != updated.run_on_startup
                    && autostart::set_startup(updated.run_on_startup)
                        .log_err()
                        .is_none()
                {
                    eprintln!("Settings saved, but run on startup could not be updated.");
                }
                println!("{}", serde_json::to_string_pretty(&updated)?);
            }
        },
    }

    Ok(())
}

/// Settings for `run` and `env`. A damaged settings file is reported and
/// the pass runs offline so nothing gets installed on default settings.
fn launch_settings(paths: &LauncherPaths) -> Settings {
    let (settings, error) = config::load_settings_for_launch(&paths.settings_file());
    if let Some(e) = error {
        eprintln!(
            "{} Running with default settings in offline mode; fix the file to change this.",
            e.user_message()
        );
    }
    settings
}

/// Log `err` at its severity and turn it into the message shown to the user
fn surface(err: LauncherError) -> anyhow::Error {
    let severity = err.severity();
    match severity {
        ErrorSeverity::Info => info!(error = %err, "Request failed"),
        ErrorSeverity::Warning => warn!(error = %err, "Request failed"),
        ErrorSeverity::Error | ErrorSeverity::Critical => error!(error = %err, "Request failed"),
    }
    anyhow::anyhow!(display_message(&err, severity))
}

fn display_message(err: &LauncherError, severity: ErrorSeverity) -> String {
    match severity {
        ErrorSeverity::Critical => format!(
            "{} Check the base interpreter with `app-book settings set --python-path <path>`.",
            err.user_message()
        ),
        _ => err.user_message(),
    }
}

fn lookup(paths: &LauncherPaths, query: &str) -> Result<AppDescriptor> {
    let apps = registry::list_apps(&paths.apps_dir());
    registry::find_app(&apps, query)
        .cloned()
        .ok_or_else(|| surface(LauncherError::AppNotFound(query.to_string())))
}

fn environment_for(paths: &LauncherPaths, settings: &Settings) -> IsolatedEnvironment {
    IsolatedEnvironment::new(paths.venv_root(), paths.venv_lock(), &settings.python_path)
}

fn print_apps(apps: &[AppDescriptor]) {
    if apps.is_empty() {
        println!("No apps found.");
        return;
    }
    for app in apps {
        println!("{}  {}", app.list_label(), app.description);
    }
}

fn print_info(app: &AppDescriptor) {
    println!("{} {}", app.icon, app.name);
    println!("  Description: {}", app.description);
    println!("  Version:     {}", app.version);
    println!("  Category:    {}", app.category);
    println!("  Path:        {}", app.path.display());
    if app.takes_args {
        println!("  Takes arguments");
    }
    for (key, value) in &app.extra {
        println!("  {}: {}", key, value);
    }
}

fn run_app(
    paths: &LauncherPaths,
    settings: &Settings,
    app: &AppDescriptor,
    mut args: Vec<String>,
) -> Result<()> {
    if app.takes_args && args.is_empty() {
        let line = ask(&format!("Enter arguments for {}: ", app.name))?;
        args = line.split_whitespace().map(str::to_string).collect();
    }

    println!("\nLaunching {} in virtual environment...", app.name);

    let events = session::spawn_validation(ValidationRequest {
        script: app.path.clone(),
        environment: environment_for(paths, settings),
        policy: settings.policy(),
        install_log: paths.install_log(),
    });

    let mut finished = None;
    while let Ok(event) = events.recv_blocking() {
        match event {
            ValidationEvent::Status(message) => println!("[{}]", message),
            ValidationEvent::ConfirmInstall { missing, reply } => {
                let answer = ask(&format!(
                    "Missing modules: {}. Install them? [y/N] ",
                    missing.join(", ")
                ))?;
                let yes = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
                let _ = reply.send_blocking(yes);
            }
            ValidationEvent::OfflineMissing(missing) => {
                println!(
                    "[Offline mode: cannot install missing modules: {}]",
                    missing.join(", ")
                );
            }
            ValidationEvent::Finished(result) => finished = Some(result),
        }
    }

    let validation = finished
        .context("Validation worker stopped without a result")?
        .map_err(surface)?;

    if !validation.outcome.is_satisfied() {
        warn!(app = %app.name, missing = ?validation.outcome.missing, "Launching with missing modules");
    }

    let running = runner::launch(&app.path, &validation.interpreter, &args)
        .map_err(surface)?;

    let stdout = io::stdout();
    for event in running.iter() {
        let mut out = stdout.lock();
        match event {
            RunEvent::Line(line) => writeln!(out, "{}", line)?,
            RunEvent::Exited { code: Some(code) } => {
                writeln!(out, "[Program Ended with Code {}]", code)?
            }
            RunEvent::Exited { code: None } => writeln!(out, "[Program Ended by Signal]")?,
            RunEvent::Cancelled => writeln!(out, "[Program Cancelled]")?,
        }
        out.flush()?;
    }

    Ok(())
}

fn ask(question: &str) -> Result<String> {
    print!("{}", question);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_errors_point_at_the_base_interpreter() {
        let err = LauncherError::EnvironmentProvisioning {
            root: "/home/u/.app-book/venv".to_string(),
            message: "cannot run 'python3'".to_string(),
        };
        let message = display_message(&err, err.severity());
        assert!(message.contains("cannot run 'python3'"));
        assert!(message.contains("--python-path"));
    }

    #[test]
    fn test_other_errors_show_the_user_message() {
        let err = LauncherError::AppNotFound("weather".to_string());
        assert_eq!(display_message(&err, err.severity()), err.user_message());
        assert_eq!(surface(err).to_string(), "No app named 'weather' is installed");
    }
}
