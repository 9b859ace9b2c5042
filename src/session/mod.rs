// * Session lifecycle: browser ownership, login, liveness.

pub mod browser;
pub mod manager;

pub use manager::{is_login_url, Liveness, SessionError, SessionManager};
