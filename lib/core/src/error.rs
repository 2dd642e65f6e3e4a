//! Error handling foundation for the relay.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Each crate defines its own error enums in its own error module and
//! converts lower-level reports with `Report::context` as they propagate.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_type_works() {
        let ok: Result<i32> = Ok(42);
        assert_eq!(ok.expect("should be ok"), 42);
    }
}
