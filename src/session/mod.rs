pub mod confirm;
pub mod login;
pub mod store;

pub use confirm::{ConfirmationSignal, ReadyConfirmation, StdinConfirmation};
pub use login::{AuthenticatedSession, LoginFlow, LoginOutcome, LoginState};
pub use store::{FileSessionStore, MemorySessionStore, SessionCookie, SessionState, SessionStore};
