//! Core client logic: the session registry, the dispatch loop and the connection supervisor.

pub mod action;
pub mod client;
pub mod dispatch;
pub mod event;
pub mod registry;
