//! Terminal styling helpers.

use std::sync::atomic::{AtomicBool, Ordering};

pub mod colors;

use colors::SemanticStyle;

/// Global flag to track if colors are disabled.
static NO_COLOR: AtomicBool = AtomicBool::new(false);

/// Sets the global no-color flag.
pub fn set_no_color(value: bool) {
    NO_COLOR.store(value, Ordering::SeqCst);
}

/// Checks if colors are disabled.
pub fn no_color() -> bool {
    NO_COLOR.load(Ordering::SeqCst)
}

pub fn success(text: &str) -> String {
    text.success()
}

pub fn error(text: &str) -> String {
    text.error()
}
