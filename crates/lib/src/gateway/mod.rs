//! Gateway: HTTP boundary for the chat UI.
//!
//! Single port serves login/logout, the chat entry point, session recording, and the
//! analytics listing. Access is gated by cookie flags set at login.

mod protocol;
mod server;

pub use protocol::{
    ChatParams, ErrorBody, LoginParams, SessionReport, StartSessionParams, StartSessionResponse,
};
pub use server::{router, run_gateway, GatewayState};
