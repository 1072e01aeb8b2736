use regex::Regex;

use crate::error::{Error, Result};

pub const MAX_NAME_BYTES: usize = 100;

/// Check the shape of a function name. Availability is checked elsewhere.
pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("Name cannot be empty"));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(Error::validation(format!(
            "Name must be at most {} bytes",
            MAX_NAME_BYTES
        )));
    }
    // Lowercase alphanumeric runs joined by single dashes
    let well_formed = Regex::new(r"^[a-z0-9](-?[a-z0-9])*$")
        .map(|re| re.is_match(name))
        .unwrap_or(false);
    if !well_formed {
        return Err(Error::validation(
            "Name must be lowercase alphanumeric with single dashes, not starting or ending with a dash",
        ));
    }
    Ok(())
}
