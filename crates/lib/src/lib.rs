//! Parley core library: remote assistant client, reply orchestrator, session gate,
//! session recorder, and the HTTP gateway used by the CLI.

pub mod config;
pub mod gate;
pub mod gateway;
pub mod init;
pub mod orchestrator;
pub mod recorder;
pub mod remote;
