//! Session and permission collaborator.
//!
//! The gateway talks to the session store only through [`AuthProvider`]
//! and [`AuthSession`]; [`TokenAuth`] is the bundled in-memory store.

mod token;
mod traits;

pub use token::{TokenAuth, TokenGrant};
pub use traits::{AuthProvider, AuthSession};
