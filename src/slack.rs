//! Slack transport: Socket Mode for receiving mentions, Web API for replying.

pub mod envelope;
mod socket_mode;
mod web;

pub use socket_mode::SocketModeClient;
pub use web::{AuthIdentity, SlackWebClient};
