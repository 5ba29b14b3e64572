//! Macros for submitting events with attributes.
//!
//! # Examples
//!
//! ```no_run
//! use bulk_log_shipper::prelude::*;
//! use bulk_log_shipper::{event, info};
//!
//! let handler = Handler::builder().index("app").build().unwrap();
//!
//! // Message only
//! info!(handler, "Server started");
//!
//! // With attributes
//! let port = 8080;
//! event!(handler, LogLevel::Info, "listening", port = port, tls = false);
//!
//! // Formatted message, then attributes after a `;`
//! event!(handler, LogLevel::Warn, "retry {} of {}", 2, 5; host = "es-1");
//! ```

/// Build an [`Event`](crate::Event) and submit it.
///
/// Attributes are `name = value` pairs where the value converts into
/// [`FieldValue`](crate::FieldValue). A formatted message takes its format
/// arguments first and the attributes after a `;`.
#[macro_export]
macro_rules! event {
    ($handler:expr, $level:expr, $fmt:literal, $($arg:expr),+ ; $($key:ident = $value:expr),+ $(,)?) => {
        $handler.submit(
            &$crate::Event::new($level, format!($fmt, $($arg),+))
                $(.with_attribute(stringify!($key), $value))+
        )
    };
    ($handler:expr, $level:expr, $msg:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $handler.submit(
            &$crate::Event::new($level, $msg)
                $(.with_attribute(stringify!($key), $value))+
        )
    };
    ($handler:expr, $level:expr, $msg:expr $(,)?) => {
        $handler.submit(&$crate::Event::new($level, $msg))
    };
}

/// Submit a formatted message at the given level.
#[macro_export]
macro_rules! log {
    ($handler:expr, $level:expr, $($arg:tt)+) => {
        $handler.log($level, format!($($arg)+))
    };
}

/// Submit a formatted info-level message.
#[macro_export]
macro_rules! info {
    ($handler:expr, $($arg:tt)+) => {
        $crate::log!($handler, $crate::LogLevel::Info, $($arg)+)
    };
}

/// Submit a formatted warning-level message.
#[macro_export]
macro_rules! warn {
    ($handler:expr, $($arg:tt)+) => {
        $crate::log!($handler, $crate::LogLevel::Warn, $($arg)+)
    };
}

/// Submit a formatted error-level message.
#[macro_export]
macro_rules! error {
    ($handler:expr, $($arg:tt)+) => {
        $crate::log!($handler, $crate::LogLevel::Error, $($arg)+)
    };
}
