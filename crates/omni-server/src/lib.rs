//! Axum HTTP+WS front door: a dual-port listener pair (message
//! channel on `port`, health/config on `port + 1`), wired over
//! `omni-wire`'s envelope handler.

mod health;
mod router;
mod serve;
mod state;
mod ws;

pub use router::{health_router, message_router};
pub use serve::serve;
pub use state::{build_state, AppState, RedactedConfig};
