//! Boards, the selected board, and that board's columns.
//!
//! # Selection epoch
//!
//! Every selection change bumps [`Epoch`] and dispatches exactly one column
//! fetch tagged with the new value. A column completion (fetch, create, rename
//! or delete) only touches the view when its tag still equals the current
//! epoch. Selecting A then B before A's fetch returns therefore always ends
//! with B's columns, whatever order the responses arrive in.
//!
//! Nothing here is inserted optimistically: boards and columns enter the cache
//! only as the server returned them, ids included.

use branches_types::{Board, BoardId, Column, ColumnId, Epoch, NonEmptyString};

use crate::dispatch::Dispatcher;
use crate::errors::ValidationError;
use crate::event::{Completion, SyncUpdate};

#[derive(Debug, Default)]
pub struct ResourceCache {
    boards: Vec<Board>,
    selected: Option<BoardId>,
    epoch: Epoch,
    columns: Vec<Column>,
    columns_loading: bool,
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    #[must_use]
    pub fn boards(&self) -> &[Board] {
        &self.boards
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub const fn selected_board_id(&self) -> Option<BoardId> {
        self.selected
    }

    #[must_use]
    pub fn selected_board(&self) -> Option<&Board> {
        let id = self.selected?;
        self.boards.iter().find(|board| board.id == id)
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// True between a selection change and its column fetch landing.
    #[must_use]
    pub const fn columns_loading(&self) -> bool {
        self.columns_loading
    }

    /// Whether a column completion tagged `(board, epoch)` may touch the view.
    #[must_use]
    pub fn is_current(&self, board: BoardId, epoch: Epoch) -> bool {
        self.selected == Some(board) && self.epoch == epoch
    }

    fn has_board(&self, id: BoardId) -> bool {
        self.boards.iter().any(|board| board.id == id)
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub(crate) fn load_boards(&self, dispatcher: &mut Dispatcher) {
        dispatcher.spawn(|api| async move { Completion::Boards(api.list_boards().await) });
    }

    pub(crate) fn select_board(
        &mut self,
        id: BoardId,
        dispatcher: &mut Dispatcher,
    ) -> Result<Epoch, ValidationError> {
        if !self.has_board(id) {
            return Err(ValidationError::UnknownBoard(id));
        }
        Ok(self.select_existing(id, dispatcher))
    }

    /// Move the selection and fetch its columns. The old view is dropped at
    /// once so columns are never shown against the wrong board.
    fn select_existing(&mut self, id: BoardId, dispatcher: &mut Dispatcher) -> Epoch {
        self.selected = Some(id);
        self.epoch = self.epoch.next();
        self.columns.clear();
        self.columns_loading = true;

        let epoch = self.epoch;
        tracing::debug!(board = %id, %epoch, "Board selected");
        dispatcher.spawn(move |api| async move {
            Completion::Columns {
                board: id,
                epoch,
                result: api.list_columns(id).await,
            }
        });
        epoch
    }

    pub(crate) fn create_board(
        &self,
        name: &str,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), ValidationError> {
        let name = NonEmptyString::new(name).map_err(|_| ValidationError::EmptyBoardName)?;
        dispatcher.spawn(move |api| async move {
            Completion::BoardCreated(api.create_board(&name).await)
        });
        Ok(())
    }

    pub(crate) fn create_column(
        &self,
        board: BoardId,
        name: &str,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), ValidationError> {
        self.require_selected(board)?;
        let name = NonEmptyString::new(name).map_err(|_| ValidationError::EmptyColumnName)?;
        let epoch = self.epoch;
        dispatcher.spawn(move |api| async move {
            Completion::ColumnCreated {
                board,
                epoch,
                result: api.create_column(board, &name).await,
            }
        });
        Ok(())
    }

    pub(crate) fn rename_column(
        &self,
        column: ColumnId,
        name: &str,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), ValidationError> {
        let board = self.selected_with_column(column)?;
        let name = NonEmptyString::new(name).map_err(|_| ValidationError::EmptyColumnName)?;
        let epoch = self.epoch;
        dispatcher.spawn(move |api| async move {
            Completion::ColumnRenamed {
                board,
                epoch,
                result: api.rename_column(board, column, &name).await,
            }
        });
        Ok(())
    }

    pub(crate) fn delete_column(
        &self,
        column: ColumnId,
        dispatcher: &mut Dispatcher,
    ) -> Result<(), ValidationError> {
        let board = self.selected_with_column(column)?;
        let epoch = self.epoch;
        dispatcher.spawn(move |api| async move {
            Completion::ColumnDeleted {
                board,
                epoch,
                column,
                result: api.delete_column(board, column).await,
            }
        });
        Ok(())
    }

    fn require_selected(&self, board: BoardId) -> Result<(), ValidationError> {
        if self.selected == Some(board) {
            Ok(())
        } else {
            Err(ValidationError::BoardNotSelected {
                requested: board,
                selected: self.selected,
            })
        }
    }

    fn selected_with_column(&self, column: ColumnId) -> Result<BoardId, ValidationError> {
        let board = self.selected.ok_or(ValidationError::NoBoardSelected)?;
        if self.columns.iter().any(|c| c.id == column) {
            Ok(board)
        } else {
            Err(ValidationError::UnknownColumn(column))
        }
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    /// Replace the board list wholesale, in server order.
    pub(crate) fn replace_boards(
        &mut self,
        boards: Vec<Board>,
        dispatcher: &mut Dispatcher,
    ) -> SyncUpdate {
        self.boards = boards;

        if let Some(id) = self.selected {
            if !self.has_board(id) {
                tracing::debug!(board = %id, "Selected board no longer exists");
                self.selected = None;
                self.epoch = self.epoch.next();
                self.columns.clear();
                self.columns_loading = false;
            }
        }
        if self.selected.is_none() {
            if let Some(first) = self.boards.first().map(|board| board.id) {
                self.select_existing(first, dispatcher);
            }
        }

        SyncUpdate::BoardsReplaced {
            count: self.boards.len(),
            selected: self.selected,
        }
    }

    /// A reload that landed first may already list the board.
    pub(crate) fn push_board(&mut self, board: Board, dispatcher: &mut Dispatcher) -> SyncUpdate {
        let id = board.id;
        if !self.has_board(id) {
            self.boards.push(board.clone());
        }
        self.select_existing(id, dispatcher);
        SyncUpdate::BoardCreated(board)
    }

    /// Caller has checked [`is_current`](Self::is_current).
    pub(crate) fn replace_columns(&mut self, board: BoardId, columns: Vec<Column>) -> SyncUpdate {
        self.columns = columns;
        self.columns_loading = false;
        SyncUpdate::ColumnsReplaced {
            board,
            count: self.columns.len(),
        }
    }

    pub(crate) fn finish_columns_loading(&mut self) {
        self.columns_loading = false;
    }

    pub(crate) fn push_column(&mut self, column: Column) -> SyncUpdate {
        self.columns.push(column.clone());
        SyncUpdate::ColumnCreated(column)
    }

    pub(crate) fn update_column(&mut self, column: Column) -> SyncUpdate {
        if let Some(slot) = self.columns.iter_mut().find(|c| c.id == column.id) {
            *slot = column.clone();
        }
        SyncUpdate::ColumnRenamed(column)
    }

    pub(crate) fn remove_column(&mut self, board: BoardId, column: ColumnId) -> SyncUpdate {
        self.columns.retain(|c| c.id != column);
        SyncUpdate::ColumnDeleted { board, column }
    }

    /// Drop everything. The epoch is kept; the session generation takes care
    /// of completions still in flight.
    pub(crate) fn clear(&mut self) {
        self.boards.clear();
        self.selected = None;
        self.columns.clear();
        self.columns_loading = false;
    }
}
