//! Branches CLI - binary entry point and interactive shell.
//!
//! # Event Loop
//!
//! A single current-thread runtime multiplexes two sources with `select!`:
//!
//! 1. Lines from stdin, parsed into [`shell::Command`]s and run against the
//!    [`SessionController`] (which only validates and dispatches)
//! 2. Completions of dispatched requests, applied to the controller and
//!    reported as they land
//!
//! Logs go to a file so they never interleave with the prompt.

mod render;
mod shell;

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::Mutex,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use branches_client::{ApiClient, ClientSettings};
use branches_config::BranchesConfig;
use branches_core::{
    FileTokenStore, MemoryTokenStore, Operation, OperationError, SessionController, SyncUpdate,
    TokenStore, ValidationError,
};
use branches_types::{BoardId, SessionStatus};

use shell::Command;

const LOG_FILE_NAME: &str = "branches.log";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match open_log_file() {
        Some((path, file)) => {
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .init();
            tracing::info!(path = %path.display(), "Logging initialized");
        }
        // Stdout belongs to the prompt.
        None => registry.init(),
    }
}

/// `~/.branches/logs`, else `./.branches/logs`.
fn open_log_file() -> Option<(PathBuf, File)> {
    let home_logs = branches_config::branches_home().map(|home| home.join("logs"));
    home_logs
        .into_iter()
        .chain([PathBuf::from(".branches").join("logs")])
        .find_map(|dir| {
            fs::create_dir_all(&dir).ok()?;
            let path = dir.join(LOG_FILE_NAME);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()?;
            Some((path, file))
        })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config = match BranchesConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Warning: {err}; using defaults");
            None
        }
    };
    let settings = BranchesConfig::settings(config.as_ref());

    let api = ApiClient::new(ClientSettings {
        base_url: settings.base_url.clone(),
        connect_timeout: settings.connect_timeout,
        request_timeout: settings.request_timeout,
    })
    .with_context(|| format!("cannot use API base URL {}", settings.base_url))?;

    let store: Box<dyn TokenStore> = if let Some(path) = settings.token_path {
        Box::new(FileTokenStore::new(path))
    } else {
        tracing::warn!("No home directory; the session will not be saved");
        Box::new(MemoryTokenStore::new())
    };

    let mut controller = SessionController::new(api, store);
    println!("Branches client for {}", controller.base_url());
    match controller.start() {
        Ok(SessionStatus::Authenticating) => println!("Checking saved session..."),
        Ok(_) => println!("Not signed in. Type `help` for commands."),
        Err(err) => notify(&err),
    }

    run(&mut controller).await
}

async fn run<S: TokenStore>(controller: &mut SessionController<S>) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        tokio::select! {
            event = controller.next_event(), if controller.in_flight() > 0 => {
                if let Some(event) = event {
                    report(controller.apply(event));
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match shell::parse(&line) {
                    Ok(Some(Command::Quit)) => break,
                    Ok(Some(command)) => execute(controller, command),
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
                prompt()?;
            }
        }
    }

    tracing::info!(pending = controller.in_flight(), "Exiting");
    Ok(())
}

fn execute<S: TokenStore>(controller: &mut SessionController<S>, command: Command) {
    let result = match command {
        Command::Login { email, password } => controller
            .login(&email, &password)
            .map(|()| println!("Signing in...")),
        Command::Register { email, password } => controller
            .register(&email, &password)
            .map(|()| println!("Registering...")),
        Command::Logout => controller.logout().map(|update| print_update(&update)),
        Command::Whoami => controller.refresh_identity(),
        Command::Boards => controller.load_boards(),
        Command::Select(id) => controller.select_board(BoardId(id)).map(|_| ()),
        Command::NewBoard(name) => controller.create_board(&name),
        Command::NewColumn(name) => match controller.selected_board_id() {
            Some(board) => controller.create_column(board, &name),
            None => Err(OperationError::new(
                Operation::CreateColumn,
                ValidationError::NoBoardSelected,
            )),
        },
        Command::RenameColumn { column, name } => controller.rename_column(column, &name),
        Command::DeleteColumn(column) => controller.delete_column(column),
        Command::Health => {
            controller.check_health();
            Ok(())
        }
        Command::Show => {
            print!("{}", render::state(controller));
            Ok(())
        }
        Command::Help => {
            println!("{}", shell::HELP);
            Ok(())
        }
        Command::Quit => Ok(()),
    };

    if let Err(err) = result {
        notify(&err);
    }
}

fn report(outcome: Result<SyncUpdate, OperationError>) {
    match outcome {
        Ok(update) => {
            tracing::debug!(?update, "Applied completion");
            print_update(&update);
        }
        Err(err) => notify(&err),
    }
}

fn print_update(update: &SyncUpdate) {
    if let Some(text) = render::describe(update) {
        println!("{text}");
    }
}

fn notify(err: &OperationError) {
    tracing::warn!(operation = %err.operation, error = ?err.source, "Operation failed");
    println!("Error: {err}");
}

fn prompt() -> Result<()> {
    let mut out = std::io::stdout();
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}
