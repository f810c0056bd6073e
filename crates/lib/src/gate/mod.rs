//! Session gate: credential check, cookie flags, and the inactivity auto-logout timer.
//!
//! Access state lives entirely in client cookies (`isAuthenticated`, `analyticsAuth`);
//! no server-side session store is consulted.

pub mod cookie;
mod credentials;
mod idle;

pub use credentials::{CredentialGate, CredentialPair};
pub use idle::{ActivitySignal, IdleConfig, IdlePhase, InactivityTimer, TimerHold};
