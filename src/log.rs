//! Logging macros
//!
//! Output goes to the serial console through `esp-println` when the
//! `esp32-log` feature is enabled. Without it the macros only type-check
//! their arguments, so call sites cost nothing in release firmware.
//!
//! The module is declared with `#[macro_use]` at the crate root, so the
//! macros are in scope for every module declared after it.

macro_rules! log_at {
    ($level:literal, $($arg:tt)*) => {{
        #[cfg(feature = "esp32-log")]
        ::esp_println::println!("[{}] {}", $level, format_args!($($arg)*));
        #[cfg(not(feature = "esp32-log"))]
        {
            let _ = format_args!($($arg)*);
        }
    }};
}

#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => { log_at!("DEBUG", $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => { log_at!("INFO", $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => { log_at!("WARN", $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => { log_at!("ERROR", $($arg)*) };
}
