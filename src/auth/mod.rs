// Authentication module
// Credential storage, token inspection and single-flight refresh

mod credentials;
mod inspector;
mod refresh;
mod types;

pub use credentials::{CredentialStore, TOKEN_KEY};
pub use inspector::{decode, needs_refresh};
pub use refresh::RefreshCoordinator;
pub use types::{AuthSettings, Claims, Token};
