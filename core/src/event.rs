//! Completions flowing back from dispatched requests, and what applying them changed.

use branches_client::ApiError;
use branches_types::{BackendStatus, Board, BoardId, Column, ColumnId, Credential, Epoch, Identity};

use crate::dispatch::Generation;
use crate::errors::Operation;

/// A finished request, tagged with the session generation it was dispatched under.
///
/// Opaque outside the crate: obtain one from
/// [`SessionController::next_event`](crate::SessionController::next_event) and
/// hand it back to [`SessionController::apply`](crate::SessionController::apply).
#[derive(Debug)]
pub struct SyncEvent {
    pub(crate) generation: Generation,
    pub(crate) completion: Completion,
}

impl SyncEvent {
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.completion.operation()
    }
}

#[derive(Debug)]
pub(crate) enum Completion {
    /// Login or registration; both answer with a credential.
    Login {
        operation: Operation,
        result: Result<Credential, ApiError>,
    },
    Identity {
        operation: Operation,
        result: Result<Identity, ApiError>,
    },
    Boards(Result<Vec<Board>, ApiError>),
    BoardCreated(Result<Board, ApiError>),
    Columns {
        board: BoardId,
        epoch: Epoch,
        result: Result<Vec<Column>, ApiError>,
    },
    ColumnCreated {
        board: BoardId,
        epoch: Epoch,
        result: Result<Column, ApiError>,
    },
    ColumnRenamed {
        board: BoardId,
        epoch: Epoch,
        result: Result<Column, ApiError>,
    },
    ColumnDeleted {
        board: BoardId,
        epoch: Epoch,
        column: ColumnId,
        result: Result<(), ApiError>,
    },
    Health(Result<(), ApiError>),
}

impl Completion {
    pub(crate) const fn operation(&self) -> Operation {
        match self {
            Self::Login { operation, .. } | Self::Identity { operation, .. } => *operation,
            Self::Boards(_) => Operation::LoadBoards,
            Self::BoardCreated(_) => Operation::CreateBoard,
            Self::Columns { .. } => Operation::LoadColumns,
            Self::ColumnCreated { .. } => Operation::CreateColumn,
            Self::ColumnRenamed { .. } => Operation::RenameColumn,
            Self::ColumnDeleted { .. } => Operation::DeleteColumn,
            Self::Health(_) => Operation::HealthCheck,
        }
    }
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutReason {
    UserRequested,
    /// An authenticated fetch failed, so the stored credential was dropped.
    CredentialRejected {
        operation: Operation,
        error: ApiError,
    },
}

/// Why a completion changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Dispatched before the last logout, login or credential invalidation.
    StaleSession,
    /// Dispatched for a board selection that has since changed.
    StaleSelection {
        board: BoardId,
        dispatched: Epoch,
        current: Epoch,
    },
}

/// The state change produced by applying one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncUpdate {
    /// A stored credential was accepted by the service at startup.
    SessionRestored { email: String },
    SignedIn,
    IdentityLoaded { email: String },
    SignedOut { reason: SignOutReason },
    BoardsReplaced {
        count: usize,
        selected: Option<BoardId>,
    },
    BoardCreated(Board),
    ColumnsReplaced { board: BoardId, count: usize },
    ColumnCreated(Column),
    ColumnRenamed(Column),
    ColumnDeleted { board: BoardId, column: ColumnId },
    Health(BackendStatus),
    Discarded { reason: DiscardReason },
}
