//! Crate-wide `Result` alias
//!
//! Every fallible library operation returns [`VeilError`]; the binary wraps
//! it in `anyhow` only at the command boundary.

use super::errors::VeilError;

/// `Result` with [`VeilError`] as the error type
///
/// ```
/// use veil::domain::result::Result;
/// use veil::domain::errors::VeilError;
///
/// fn parse_tag(text: &str) -> Result<u32> {
///     u32::from_str_radix(text, 16).map_err(|e| VeilError::format(e.to_string()))
/// }
///
/// assert_eq!(parse_tag("00100010").unwrap(), 0x0010_0010);
/// assert!(parse_tag("PatientName").is_err());
/// ```
pub type Result<T> = std::result::Result<T, VeilError>;
