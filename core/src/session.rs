//! Authentication state machine and the single owner of all client state.
//!
//! # Driving the controller
//!
//! Operations validate locally and dispatch requests; they never wait for the
//! network. The owner pumps completions:
//!
//! ```ignore
//! controller.start()?;
//! while let Some(event) = controller.next_event().await {
//!     match controller.apply(event) {
//!         Ok(update) => render(update),
//!         Err(err) => notify(err.user_message()),
//!     }
//! }
//! ```
//!
//! All state changes happen inside [`SessionController::apply`] or an operation
//! call, on whichever task owns the controller. No locks are involved.
//!
//! # Fail-closed credentials
//!
//! Once a credential is in use, any failure of the identity or board-list
//! fetch drops it: the store is cleared, the cache emptied, and the session
//! returns to `Anonymous`. Such a failure is reported as
//! [`SyncUpdate::SignedOut`] rather than as an error, unless the store could
//! not be cleared. Nothing is retried.

use branches_client::{ApiClient, ApiError};
use branches_types::{
    BackendStatus, Board, BoardId, Column, ColumnId, Credential, Epoch, Identity, Session,
    SessionStatus,
};

use crate::cache::ResourceCache;
use crate::dispatch::{Dispatcher, Generation};
use crate::errors::{Operation, OperationError, ValidationError};
use crate::event::{Completion, DiscardReason, SignOutReason, SyncEvent, SyncUpdate};
use crate::store::TokenStore;

pub struct SessionController<S> {
    store: S,
    session: Session,
    cache: ResourceCache,
    backend: BackendStatus,
    dispatcher: Dispatcher,
    /// A login or registration is awaiting its answer. The session stays
    /// `Anonymous`/`AuthError` meanwhile because no token exists yet.
    pending_login: bool,
}

impl<S> std::fmt::Debug for SessionController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("session", &self.session)
            .field("cache", &self.cache)
            .field("backend", &self.backend)
            .field("dispatcher", &self.dispatcher)
            .field("pending_login", &self.pending_login)
            .finish_non_exhaustive()
    }
}

impl<S: TokenStore> SessionController<S> {
    /// The client's own credential is discarded; the store decides.
    pub fn new(api: ApiClient, store: S) -> Self {
        Self {
            store,
            session: Session::Anonymous,
            cache: ResourceCache::new(),
            backend: BackendStatus::Checking,
            dispatcher: Dispatcher::new(api.with_credential(None)),
            pending_login: false,
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.session.status()
    }

    #[must_use]
    pub const fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    #[must_use]
    pub fn boards(&self) -> &[Board] {
        self.cache.boards()
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        self.cache.columns()
    }

    #[must_use]
    pub const fn selected_board_id(&self) -> Option<BoardId> {
        self.cache.selected_board_id()
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.cache.epoch()
    }

    #[must_use]
    pub const fn backend_status(&self) -> BackendStatus {
        self.backend
    }

    #[must_use]
    pub const fn login_pending(&self) -> bool {
        self.pending_login
    }

    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.dispatcher.generation()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.dispatcher.api().base_url()
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Read the stored credential and begin validating it, and probe the
    /// backend. Ends `Authenticating` when a credential was found, otherwise
    /// `Anonymous`. A store that cannot be read leaves the session `Anonymous`.
    pub fn start(&mut self) -> Result<SessionStatus, OperationError> {
        if self.status() != SessionStatus::Anonymous || self.pending_login {
            return Err(self.invalid_state(Operation::RestoreSession));
        }
        self.check_health();

        let stored = self
            .store
            .load()
            .map_err(|e| OperationError::new(Operation::RestoreSession, e))?;
        let Some(token) = stored else {
            tracing::info!("No saved session");
            return Ok(SessionStatus::Anonymous);
        };

        tracing::info!("Validating saved session");
        self.begin_session(
            Session::Authenticating {
                token: token.clone(),
            },
            token,
        );
        self.fetch_identity(Operation::RestoreSession);
        Ok(self.status())
    }

    pub fn login(&mut self, email: &str, password: &str) -> Result<(), OperationError> {
        self.exchange_credentials(Operation::Login, email, password)
    }

    /// Create an account. Success signs in exactly like [`login`](Self::login).
    pub fn register(&mut self, email: &str, password: &str) -> Result<(), OperationError> {
        self.exchange_credentials(Operation::Register, email, password)
    }

    fn exchange_credentials(
        &mut self,
        operation: Operation,
        email: &str,
        password: &str,
    ) -> Result<(), OperationError> {
        if self.pending_login {
            return Err(OperationError::new(
                operation,
                ValidationError::LoginInProgress,
            ));
        }
        if !matches!(
            self.status(),
            SessionStatus::Anonymous | SessionStatus::AuthError
        ) {
            return Err(self.invalid_state(operation));
        }
        let email = email.trim().to_string();
        if email.is_empty() || password.is_empty() {
            return Err(OperationError::new(
                operation,
                ValidationError::MissingCredentials,
            ));
        }
        let password = password.to_string();

        self.pending_login = true;
        self.dispatcher.advance_generation();
        tracing::info!(%operation, "Exchanging credentials");
        self.dispatcher.spawn(move |api| async move {
            let result = match operation {
                Operation::Register => api.register(&email, &password).await,
                _ => api.login(&email, &password).await,
            };
            Completion::Login { operation, result }
        });
        Ok(())
    }

    /// Always succeeds in memory. A store that cannot be cleared is reported
    /// after the session has been reset anyway.
    pub fn logout(&mut self) -> Result<SyncUpdate, OperationError> {
        let cleared = self.store.clear();
        self.end_session();
        tracing::info!("Signed out");
        cleared.map_err(|e| OperationError::new(Operation::Logout, e))?;
        Ok(SyncUpdate::SignedOut {
            reason: SignOutReason::UserRequested,
        })
    }

    pub fn refresh_identity(&mut self) -> Result<(), OperationError> {
        self.require_authenticated(Operation::RefreshIdentity)?;
        self.fetch_identity(Operation::RefreshIdentity);
        Ok(())
    }

    /// Display only; never gates anything.
    pub fn check_health(&mut self) {
        self.backend = BackendStatus::Checking;
        self.dispatcher
            .spawn(|api| async move { Completion::Health(api.health().await) });
    }

    // ------------------------------------------------------------------
    // Resources (authenticated only)
    // ------------------------------------------------------------------

    pub fn load_boards(&mut self) -> Result<(), OperationError> {
        self.require_authenticated(Operation::LoadBoards)?;
        self.cache.load_boards(&mut self.dispatcher);
        Ok(())
    }

    pub fn select_board(&mut self, id: BoardId) -> Result<Epoch, OperationError> {
        self.require_authenticated(Operation::LoadColumns)?;
        self.cache
            .select_board(id, &mut self.dispatcher)
            .map_err(|e| OperationError::new(Operation::LoadColumns, e))
    }

    pub fn create_board(&mut self, name: &str) -> Result<(), OperationError> {
        self.require_authenticated(Operation::CreateBoard)?;
        self.cache
            .create_board(name, &mut self.dispatcher)
            .map_err(|e| OperationError::new(Operation::CreateBoard, e))
    }

    pub fn create_column(&mut self, board: BoardId, name: &str) -> Result<(), OperationError> {
        self.require_authenticated(Operation::CreateColumn)?;
        self.cache
            .create_column(board, name, &mut self.dispatcher)
            .map_err(|e| OperationError::new(Operation::CreateColumn, e))
    }

    pub fn rename_column(&mut self, column: ColumnId, name: &str) -> Result<(), OperationError> {
        self.require_authenticated(Operation::RenameColumn)?;
        self.cache
            .rename_column(column, name, &mut self.dispatcher)
            .map_err(|e| OperationError::new(Operation::RenameColumn, e))
    }

    pub fn delete_column(&mut self, column: ColumnId) -> Result<(), OperationError> {
        self.require_authenticated(Operation::DeleteColumn)?;
        self.cache
            .delete_column(column, &mut self.dispatcher)
            .map_err(|e| OperationError::new(Operation::DeleteColumn, e))
    }

    // ------------------------------------------------------------------
    // Completions
    // ------------------------------------------------------------------

    /// Requests dispatched and not yet returned by [`next_event`](Self::next_event).
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Wait for the next completion. `None` once nothing is outstanding.
    pub async fn next_event(&mut self) -> Option<SyncEvent> {
        self.dispatcher.recv().await
    }

    /// Apply completions until nothing is outstanding, including any
    /// follow-up requests they trigger.
    pub async fn settle(&mut self) -> Vec<Result<SyncUpdate, OperationError>> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.next_event().await {
            outcomes.push(self.apply(event));
        }
        outcomes
    }

    pub fn apply(&mut self, event: SyncEvent) -> Result<SyncUpdate, OperationError> {
        let SyncEvent {
            generation,
            completion,
        } = event;

        // Health is independent of who is signed in.
        if let Completion::Health(result) = completion {
            return Ok(self.apply_health(result));
        }
        if generation != self.dispatcher.generation() {
            tracing::debug!(
                operation = %completion.operation(),
                dispatched = %generation,
                current = %self.dispatcher.generation(),
                "Discarding completion from an earlier session"
            );
            return Ok(discarded(DiscardReason::StaleSession));
        }

        match completion {
            Completion::Login { operation, result } => self.apply_login(operation, result),
            Completion::Identity { operation, result } => self.apply_identity(operation, result),
            Completion::Boards(result) => match result {
                Ok(boards) => Ok(self.cache.replace_boards(boards, &mut self.dispatcher)),
                Err(error) => self.invalidate(Operation::LoadBoards, error),
            },
            Completion::BoardCreated(result) => match result {
                Ok(board) => {
                    tracing::info!(board = %board.id, "Board created");
                    Ok(self.cache.push_board(board, &mut self.dispatcher))
                }
                Err(error) => Err(OperationError::new(Operation::CreateBoard, error)),
            },
            Completion::Columns {
                board,
                epoch,
                result,
            } => {
                if let Some(stale) = self.stale_selection(board, epoch) {
                    return Ok(stale);
                }
                match result {
                    Ok(columns) => Ok(self.cache.replace_columns(board, columns)),
                    Err(error) => {
                        self.cache.finish_columns_loading();
                        Err(OperationError::new(Operation::LoadColumns, error))
                    }
                }
            }
            Completion::ColumnCreated {
                board,
                epoch,
                result,
            } => {
                let column = result.map_err(|e| OperationError::new(Operation::CreateColumn, e))?;
                Ok(self
                    .stale_selection(board, epoch)
                    .unwrap_or_else(|| self.cache.push_column(column)))
            }
            Completion::ColumnRenamed {
                board,
                epoch,
                result,
            } => {
                let column = result.map_err(|e| OperationError::new(Operation::RenameColumn, e))?;
                Ok(self
                    .stale_selection(board, epoch)
                    .unwrap_or_else(|| self.cache.update_column(column)))
            }
            Completion::ColumnDeleted {
                board,
                epoch,
                column,
                result,
            } => {
                result.map_err(|e| OperationError::new(Operation::DeleteColumn, e))?;
                Ok(self
                    .stale_selection(board, epoch)
                    .unwrap_or_else(|| self.cache.remove_column(board, column)))
            }
            Completion::Health(result) => Ok(self.apply_health(result)),
        }
    }

    fn apply_login(
        &mut self,
        operation: Operation,
        result: Result<Credential, ApiError>,
    ) -> Result<SyncUpdate, OperationError> {
        self.pending_login = false;

        let token = match result {
            Ok(token) => token,
            Err(error) => {
                let err = OperationError::new(operation, error);
                tracing::info!(%operation, error = %err, "Credential exchange failed");
                self.session = Session::AuthError {
                    message: err.user_message(),
                };
                return Err(err);
            }
        };

        if let Err(error) = self.store.save(&token) {
            let err = OperationError::new(operation, error);
            tracing::warn!(%operation, error = %err, "Could not persist credential");
            self.session = Session::AuthError {
                message: err.user_message(),
            };
            return Err(err);
        }

        tracing::info!(%operation, "Signed in");
        self.begin_session(
            Session::Authenticated {
                token: token.clone(),
                email: None,
            },
            token,
        );
        self.fetch_identity(operation);
        self.cache.load_boards(&mut self.dispatcher);
        Ok(SyncUpdate::SignedIn)
    }

    fn apply_identity(
        &mut self,
        operation: Operation,
        result: Result<Identity, ApiError>,
    ) -> Result<SyncUpdate, OperationError> {
        let identity = match result {
            Ok(identity) => identity,
            Err(error) => return self.invalidate(operation, error),
        };

        let update = match std::mem::take(&mut self.session) {
            Session::Authenticating { token } => {
                tracing::info!("Saved session accepted");
                self.session = Session::Authenticated {
                    token,
                    email: Some(identity.email.clone()),
                };
                self.cache.load_boards(&mut self.dispatcher);
                SyncUpdate::SessionRestored {
                    email: identity.email,
                }
            }
            Session::Authenticated { token, .. } => {
                self.session = Session::Authenticated {
                    token,
                    email: Some(identity.email.clone()),
                };
                SyncUpdate::IdentityLoaded {
                    email: identity.email,
                }
            }
            other => {
                self.session = other;
                discarded(DiscardReason::StaleSession)
            }
        };
        Ok(update)
    }

    fn apply_health(&mut self, result: Result<(), ApiError>) -> SyncUpdate {
        self.backend = match result {
            Ok(()) => BackendStatus::Ok,
            Err(error) => {
                tracing::debug!(%error, "Backend health check failed");
                BackendStatus::Error
            }
        };
        SyncUpdate::Health(self.backend)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Drop the credential after an authenticated fetch failed.
    ///
    /// The session ends either way. A store that cannot be cleared would hand
    /// the dead credential back on the next start, so that is reported instead
    /// of the sign-out.
    fn invalidate(
        &mut self,
        operation: Operation,
        error: ApiError,
    ) -> Result<SyncUpdate, OperationError> {
        tracing::warn!(%operation, %error, "Authenticated fetch failed; dropping credential");
        let cleared = self.store.clear();
        self.end_session();
        if let Err(store_error) = cleared {
            tracing::warn!(error = %store_error, "Could not clear saved credential");
            return Err(OperationError::new(operation, store_error));
        }
        Ok(SyncUpdate::SignedOut {
            reason: SignOutReason::CredentialRejected { operation, error },
        })
    }

    fn begin_session(&mut self, session: Session, token: Credential) {
        self.dispatcher.set_credential(token);
        self.session = session;
    }

    /// Everything tied to the current credential goes away. Completions still
    /// in flight belong to the old generation and will be discarded.
    fn end_session(&mut self) {
        self.pending_login = false;
        self.session = Session::Anonymous;
        self.cache.clear();
        self.dispatcher.clear_credential();
        self.dispatcher.advance_generation();
    }

    fn fetch_identity(&mut self, operation: Operation) {
        self.dispatcher.spawn(move |api| async move {
            Completion::Identity {
                operation,
                result: api.current_user().await,
            }
        });
    }

    fn stale_selection(&self, board: BoardId, epoch: Epoch) -> Option<SyncUpdate> {
        if self.cache.is_current(board, epoch) {
            return None;
        }
        tracing::debug!(
            %board,
            dispatched = %epoch,
            current = %self.cache.epoch(),
            "Discarding column result for a superseded selection"
        );
        Some(discarded(DiscardReason::StaleSelection {
            board,
            dispatched: epoch,
            current: self.cache.epoch(),
        }))
    }

    fn require_authenticated(&self, operation: Operation) -> Result<(), OperationError> {
        if self.session.is_authenticated() {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn invalid_state(&self, operation: Operation) -> OperationError {
        OperationError::new(
            operation,
            ValidationError::InvalidState {
                operation,
                status: self.status(),
            },
        )
    }
}

const fn discarded(reason: DiscardReason) -> SyncUpdate {
    SyncUpdate::Discarded { reason }
}
