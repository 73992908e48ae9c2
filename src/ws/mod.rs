//! WebSocket surface: tracker reports, operator commands, state fanout

pub mod handler;
pub mod protocol;
