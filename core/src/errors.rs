//! Error types for sync operations and their user-facing messages.

use std::fmt;

use branches_client::ApiError;
use branches_types::{BoardId, ColumnId, SessionStatus, sanitize_display_text};
use thiserror::Error;

use crate::store::StoreError;

/// What the caller asked for, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Login,
    Register,
    RestoreSession,
    RefreshIdentity,
    LoadBoards,
    LoadColumns,
    CreateBoard,
    CreateColumn,
    RenameColumn,
    DeleteColumn,
    HealthCheck,
    Logout,
}

impl Operation {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::RestoreSession => "restore session",
            Self::RefreshIdentity => "refresh identity",
            Self::LoadBoards => "load boards",
            Self::LoadColumns => "load columns",
            Self::CreateBoard => "create board",
            Self::CreateColumn => "create column",
            Self::RenameColumn => "rename column",
            Self::DeleteColumn => "delete column",
            Self::HealthCheck => "health check",
            Self::Logout => "logout",
        }
    }

    /// Shown when the request never got an answer.
    #[must_use]
    pub const fn network_message(self) -> &'static str {
        match self {
            Self::Login => "Network error while logging in.",
            Self::Register => "Network error while registering.",
            Self::RestoreSession | Self::RefreshIdentity => {
                "Network error while checking the session."
            }
            Self::LoadBoards => "Network error while loading boards.",
            Self::LoadColumns => "Network error while loading columns.",
            Self::CreateBoard => "Network error while creating board.",
            Self::CreateColumn => "Network error while creating column.",
            Self::RenameColumn => "Network error while renaming column.",
            Self::DeleteColumn => "Network error while deleting column.",
            Self::HealthCheck => "Network error while checking the backend.",
            Self::Logout => "Network error while logging out.",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A request rejected before anything was sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("cannot {operation} while {}", .status.as_str())]
    InvalidState {
        operation: Operation,
        status: SessionStatus,
    },
    #[error("a login is already in progress")]
    LoginInProgress,
    #[error("email and password are required")]
    MissingCredentials,
    #[error("board name must not be empty")]
    EmptyBoardName,
    #[error("column name must not be empty")]
    EmptyColumnName,
    #[error("board {0} does not exist")]
    UnknownBoard(BoardId),
    #[error("column {0} is not on the selected board")]
    UnknownColumn(ColumnId),
    #[error("board {requested} is not the selected board")]
    BoardNotSelected {
        requested: BoardId,
        selected: Option<BoardId>,
    },
    #[error("no board is selected")]
    NoBoardSelected,
}

/// Failure of a sync operation, either at dispatch or on completion.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A failed operation together with what was being attempted.
///
/// `Display` is the notification text for the user.
#[derive(Debug)]
pub struct OperationError {
    pub operation: Operation,
    pub source: SyncError,
}

impl OperationError {
    pub fn new(operation: Operation, source: impl Into<SyncError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match &self.source {
            SyncError::Api(err) => Some(err),
            SyncError::Validation(_) | SyncError::Store(_) => None,
        }
    }

    #[must_use]
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.source {
            SyncError::Validation(err) => Some(err),
            SyncError::Api(_) | SyncError::Store(_) => None,
        }
    }

    /// Text for a blocking notification. Server-provided detail is sanitized.
    #[must_use]
    pub fn user_message(&self) -> String {
        match &self.source {
            SyncError::Api(ApiError::Http { detail, .. }) => {
                sanitize_display_text(detail).into_owned()
            }
            SyncError::Api(ApiError::Network(_)) => self.operation.network_message().to_string(),
            SyncError::Api(ApiError::Decode(_)) => {
                format!("Unexpected response from server during {}.", self.operation)
            }
            SyncError::Validation(err) => capitalize(&err.to_string()),
            SyncError::Store(err) => format!("Could not {}: {err}", self.operation),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_message())
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
