//! twilio-messaging-mcp: send SMS through Twilio from any MCP client.
//!
//! Single Rust binary speaking the Model Context Protocol over stdio.
//! Exposes one tool (`send-message`), two resources for the latest Twilio
//! status callback, and one prompt template.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callbacks;
pub mod capabilities;
pub mod carrier;
pub mod config;
pub mod logging;
pub mod mcp;
pub mod webhook;
