//! Utility functions shared across the kernel.
//!
//! All diagnostic records use [`current_timestamp_ms`] so trace entries,
//! command log entries, and error records sort consistently against each
//! other.

/// Returns the current Unix timestamp in milliseconds.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch, which
/// should never happen on a functioning host.
pub fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

/// Extracts a human-readable message from a caught panic payload.
///
/// Panics raised with `panic!("...")` carry either a `&str` or a `String`;
/// anything else gets a generic message.
pub fn panic_message(panic_info: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked with unknown payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_monotonic_enough() {
        let a = current_timestamp_ms();
        let b = current_timestamp_ms();
        assert!(b >= a);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let caught = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(caught), "panicked: boom");

        let caught =
            std::panic::catch_unwind(|| std::panic::panic_any(String::from("owned boom")))
                .unwrap_err();
        assert_eq!(panic_message(caught), "panicked: owned boom");
    }
}
