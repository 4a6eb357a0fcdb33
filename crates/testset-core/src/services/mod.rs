//! Services for resolving per-test settings and tracking database state
//! between tests.

mod session_cache;
mod settings_resolver;

pub use session_cache::{RememberedState, SessionCache};
pub use settings_resolver::{ClassRegistration, MethodRegistration, SettingsResolver};
