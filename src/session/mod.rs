//! Session and credential management
//!
//! The coordinator owns credential state and serializes refresh; storage
//! persists credentials across runs; the auth client talks to the backend's
//! token endpoints.

mod auth;
mod coordinator;
mod storage;

pub use auth::{AuthClient, AuthError, HttpAuthClient};
pub use coordinator::{SessionError, SessionTokenCoordinator};
pub use storage::{CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, StoreError};
