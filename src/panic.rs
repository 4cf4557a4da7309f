//! Formatting of caught panic payloads.
//!
//! Connection tasks and user callbacks run under `catch_unwind`; the payload
//! they leave behind is logged through [`format_panic`].

use std::{any::Any, fmt};

/// Borrowed panic payload that renders as text when displayed.
///
/// `String` and `&'static str` payloads print verbatim; anything else falls
/// back to its `Debug` form.
///
/// ```
/// use wshub::panic::format_panic;
///
/// let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
/// assert_eq!(format_panic(&*payload).to_string(), "boom");
/// let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
/// assert!(format_panic(&*payload).to_string().contains("Any"));
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage<'a>(&'a (dyn Any + Send));

impl fmt::Display for PanicMessage<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Wrap a panic payload for display.
pub fn format_panic(payload: &(dyn Any + Send)) -> PanicMessage<'_> { PanicMessage(payload) }
