//! Session and resource synchronization for the Branches client.
//!
//! [`SessionController`] owns the authentication state, the [`ResourceCache`]
//! of boards and columns, and the outstanding requests. Credentials persist
//! through a [`TokenStore`].

mod cache;
mod dispatch;
pub mod errors;
mod event;
mod session;
pub mod store;

pub use cache::ResourceCache;
pub use dispatch::Generation;
pub use errors::{Operation, OperationError, SyncError, ValidationError};
pub use event::{DiscardReason, SignOutReason, SyncEvent, SyncUpdate};
pub use session::SessionController;
pub use store::{FileTokenStore, MemoryTokenStore, StoreError, TokenStore};
