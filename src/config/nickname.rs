//! Default nickname.
//!
//! The login name of the current user, or `fifo` plus four random digits
//! when none is available.

use rand::RngExt;

pub fn default_nickname() -> String {
    ["USER", "LOGNAME"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|name| !name.trim().is_empty())
        .unwrap_or_else(generate_nickname)
}

/// Generate a nickname like `fifo0427`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let num: u16 = rng.random_range(0..10000);
    format!("fifo{:04}", num)
}
