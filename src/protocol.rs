//! Wire protocol for the weather-station controller
//!
//! The device speaks an ASCII protocol of parenthesized tokens over serial.
//! Unsolicited status bulletins arrive roughly once per second; requests are
//! short parenthesized strings answered by one or more response lines.
//!
//! - `framer`: reassembles CR-LF terminated frames from the byte stream
//! - `bulletin`: fixed-width decoding of the status line into readings
//! - `commands`: the request/response vocabulary and parameter descriptors

pub mod bulletin;
pub mod commands;
pub mod framer;

pub use bulletin::{decode_bulletin, BulletinKind, Reading};
pub use commands::{CommandSpec, Parameter};
pub use framer::Framer;
