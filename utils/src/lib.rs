//! Shared infrastructure utilities for the Branches client.
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename) with
//!   owner-only permissions for secrets such as the session token.

pub mod atomic_write;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, PersistMode, atomic_write, atomic_write_with_options,
    ensure_private_dir, remove_file_if_exists,
};
