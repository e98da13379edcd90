//! The thin HTTP surface over the coordinator core: request parsing,
//! signature/user-identity extraction, and response shaping. No business
//! logic lives here — every handler is a few lines delegating to the
//! registry, scheduler, lock manager, or chunk aggregator.

pub mod extract;
pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::build;
pub use state::AppState;
