//! Credential resolution and connection authentication for Beacon.
//!
//! Beacon doesn't own a user database. It defines the seams a credential
//! store plugs into, two resolvers built on them, and the pipeline that
//! runs those resolvers against a new connection:
//!
//! 1. **Stores**: [`TokenStore`] and [`SessionStore`]: the external
//!    lookups (database, cache, auth service).
//! 2. **Resolvers**: [`TokenResolver`] and [`SessionResolver`], both
//!    implementing [`CredentialResolver`]: credential in, identity or
//!    "absent" out.
//! 3. **Pipeline**: an ordered list of [`AuthStage`]s run once per
//!    connection. The first stage to produce an identity wins.
//!
//! # How it fits in the stack
//!
//! ```text
//! Gateway (above)  ← runs the pipeline on connect, resolvers on re-auth
//!     ↕
//! Auth Layer (this crate)  ← credential → identity
//!     ↕
//! Stores (external)  ← token / session / identity lookups
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod pipeline;
mod resolver;
mod store;

pub use config::AuthConfig;
pub use error::{AuthError, StoreError};
pub use pipeline::{
    AuthContext, AuthStage, Pipeline, SessionStage, StageOutcome, TokenStage,
};
pub use resolver::{CredentialResolver, SessionResolver, TokenResolver};
pub use store::{
    MemorySessionStore, MemoryTokenStore, SessionStore, TokenRecord,
    TokenStore,
};
