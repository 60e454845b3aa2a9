//! Identity session management
//!
//! The module is organized by concern:
//!
//! | Module     | Responsibility                                      |
//! |------------|-----------------------------------------------------|
//! | `provider` | Identity-provider contract and error-code mapping   |
//! | `exchange` | Backend exchange of identity token → session token  |
//! | `validate` | Local input validation before any network call      |
//! | `session`  | Session types and subscriber snapshots              |
//! | `manager`  | The state machine tying it all together             |
//!
//! Two external auth systems (identity provider + backend token) collapse
//! into one state machine here, so there is no "authenticated with the
//! provider but not with the backend" split-brain state.

mod manager;
mod validate;

pub mod exchange;
pub mod provider;
pub mod session;

pub use exchange::{ExchangeRequest, HttpSessionBackend, SessionBackend};
pub use manager::{SessionEvents, SessionManager};
pub use provider::{IdentityProvider, ProviderFailure, ProviderIdentity};
pub use session::{Registration, Session, SessionPhase, SessionSnapshot};
