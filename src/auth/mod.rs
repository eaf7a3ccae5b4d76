//! Authentication overlay: token lifecycle, login flow and permissions.

pub mod overlay;
pub mod permissions;
pub mod token_store;

pub use overlay::{AuthAction, AuthMethod, AuthOverlay, AuthState, Credentials};
pub use permissions::PermissionSet;
pub use token_store::{FileTokenStore, MemoryTokenStore, StoredToken, TokenStore};
