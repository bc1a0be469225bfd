//! IRC protocol layer: line parsing, event formatting, user commands and the server connection.

pub mod commands;
pub mod connection;
pub mod format;
pub mod message;
