//! Record name rules
//!
//! Length is counted in Unicode scalar values, not bytes, so multi-byte
//! names get the same 3..=128 window as ASCII ones.

use crate::error::ValidationError;

pub const NAME_MIN_LEN: usize = 3;
pub const NAME_MAX_LEN: usize = 128;

pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let actual = name.chars().count();
    if actual > NAME_MAX_LEN {
        return Err(ValidationError::TooLong {
            max: NAME_MAX_LEN,
            actual,
        });
    }
    if actual < NAME_MIN_LEN {
        return Err(ValidationError::TooShort {
            min: NAME_MIN_LEN,
            actual,
        });
    }
    Ok(())
}
