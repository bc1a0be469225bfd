//! Per-topic directories and the `in` pipe listeners.

pub mod layout;
pub mod listener;
