//! Ridx Server — line-oriented query channel over TCP and stdio

pub mod channel;
pub mod output;
pub mod protocol;

pub use channel::{execute, run_stdio, serve_tcp};
pub use output::{format_location, render};
pub use protocol::{OutputFlags, ProtocolError, QueryMode, Request};
