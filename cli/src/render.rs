//! Plain-text rendering of controller state and updates.

use std::fmt::Write;

use branches_core::{SessionController, SignOutReason, SyncUpdate, TokenStore};
use branches_types::{BackendStatus, Session, sanitize_display_text};

/// One-line description of an update, or `None` when nothing visible changed.
pub fn describe(update: &SyncUpdate) -> Option<String> {
    let text = match update {
        SyncUpdate::SessionRestored { email } => {
            format!("Welcome back, {}.", sanitize_display_text(email))
        }
        SyncUpdate::SignedIn => "Signed in.".to_string(),
        SyncUpdate::IdentityLoaded { email } => {
            format!("Signed in as {}.", sanitize_display_text(email))
        }
        SyncUpdate::SignedOut {
            reason: SignOutReason::UserRequested,
        } => "Signed out.".to_string(),
        SyncUpdate::SignedOut {
            reason: SignOutReason::CredentialRejected { operation, .. },
        } => format!("Session is no longer valid ({operation} failed). Please log in again."),
        SyncUpdate::BoardsReplaced { count, .. } => match count {
            0 => "No boards yet. Create one with `new-board <name>`.".to_string(),
            1 => "Loaded 1 board.".to_string(),
            n => format!("Loaded {n} boards."),
        },
        SyncUpdate::BoardCreated(board) => format!(
            "Created board #{} {}.",
            board.id,
            sanitize_display_text(&board.name)
        ),
        SyncUpdate::ColumnsReplaced { board, count } => {
            format!("Board #{board}: {count} column(s).")
        }
        SyncUpdate::ColumnCreated(column) => format!(
            "Added column #{} {}.",
            column.id,
            sanitize_display_text(&column.name)
        ),
        SyncUpdate::ColumnRenamed(column) => format!(
            "Renamed column #{} to {}.",
            column.id,
            sanitize_display_text(&column.name)
        ),
        SyncUpdate::ColumnDeleted { column, .. } => format!("Deleted column #{column}."),
        SyncUpdate::Health(status) => format!("Backend: {}.", status.as_str()),
        SyncUpdate::Discarded { .. } => return None,
    };
    Some(text)
}

/// Full state dump for `show`.
pub fn state<S: TokenStore>(controller: &SessionController<S>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Server:  {}", controller.base_url());
    let backend = match controller.backend_status() {
        BackendStatus::Checking => "checking...",
        BackendStatus::Ok => "ok",
        BackendStatus::Error => "unreachable",
    };
    let _ = writeln!(out, "Backend: {backend}");

    let session = match controller.session() {
        Session::Anonymous if controller.login_pending() => "signing in...".to_string(),
        Session::Anonymous => "not signed in".to_string(),
        Session::Authenticating { .. } => "checking saved session...".to_string(),
        Session::Authenticated { email: Some(email), .. } => {
            format!("signed in as {}", sanitize_display_text(email))
        }
        Session::Authenticated { email: None, .. } => "signed in".to_string(),
        Session::AuthError { message } => format!("error: {message}"),
    };
    let _ = writeln!(out, "Session: {session}");

    if !controller.session().is_authenticated() {
        return out;
    }

    let boards = controller.boards();
    if boards.is_empty() {
        out.push_str("Boards:  (none)\n");
        return out;
    }
    out.push_str("Boards:\n");
    let selected = controller.selected_board_id();
    for board in boards {
        let marker = if Some(board.id) == selected { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "  {marker} #{} {}",
            board.id,
            sanitize_display_text(&board.name)
        );
    }

    if selected.is_some() {
        let cache = controller.cache();
        if cache.columns_loading() {
            out.push_str("Columns: loading...\n");
        } else if cache.columns().is_empty() {
            out.push_str("Columns: (none)\n");
        } else {
            out.push_str("Columns:\n");
            for column in cache.columns() {
                let _ = writeln!(
                    out,
                    "    #{} {} (position {})",
                    column.id,
                    sanitize_display_text(&column.name),
                    column.position
                );
            }
        }
    }
    out
}
