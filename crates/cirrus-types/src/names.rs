//! Container and object name validation.
//!
//! Container names:
//! - 3 to 63 characters
//! - Only lowercase ASCII letters, digits and `-`
//! - Must not start or end with `-`
//! - Must not contain consecutive dashes (`--`)
//!
//! Object names:
//! - 1 to 1024 characters
//! - Only lowercase ASCII letters, digits and the punctuation
//!   `` $ & ! * ` , . ( ) + - ``
//!
//! Validation runs before every store operation, so an invalid name never
//! reaches a backend.

use crate::error::{TypeResult, ValidationError};
use crate::object_ref::ObjectRef;

pub const MIN_CONTAINER_LEN: usize = 3;
pub const MAX_CONTAINER_LEN: usize = 63;
pub const MIN_NAME_LEN: usize = 1;
pub const MAX_NAME_LEN: usize = 1024;

/// Punctuation allowed in object names besides `[a-z0-9]`.
const NAME_PUNCTUATION: &[char] = &['$', '&', '!', '*', '`', ',', '.', '(', ')', '+', '-'];

fn is_lower_alnum(ch: char) -> bool {
    ch.is_ascii_lowercase() || ch.is_ascii_digit()
}

/// Validate an object name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use cirrus_types::names::validate_object_name;
///
/// assert!(validate_object_name("doc1", "put").is_ok());
/// assert!(validate_object_name("report(final).pdf", "put").is_ok());
/// assert!(validate_object_name("", "put").is_err());
/// assert!(validate_object_name("Upper.txt", "put").is_err());
/// ```
pub fn validate_object_name(name: &str, operation: &str) -> TypeResult<()> {
    let len = name.chars().count();
    if !(MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        return Err(ValidationError::new(
            "name",
            truncate_for_display(name),
            operation,
            format!("length {len} is outside {MIN_NAME_LEN}..={MAX_NAME_LEN}"),
        ));
    }

    if let Some(ch) = name
        .chars()
        .find(|ch| !is_lower_alnum(*ch) && !NAME_PUNCTUATION.contains(ch))
    {
        return Err(ValidationError::new(
            "name",
            truncate_for_display(name),
            operation,
            format!("contains forbidden character: {ch:?}"),
        ));
    }

    Ok(())
}

/// Validate a container name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use cirrus_types::names::validate_container_name;
///
/// assert!(validate_container_name("sagelabs", "put").is_ok());
/// assert!(validate_container_name("my-team-01", "put").is_ok());
/// assert!(validate_container_name("ab", "put").is_err());
/// assert!(validate_container_name("double--dash", "put").is_err());
/// ```
pub fn validate_container_name(container: &str, operation: &str) -> TypeResult<()> {
    let len = container.chars().count();
    if !(MIN_CONTAINER_LEN..=MAX_CONTAINER_LEN).contains(&len) {
        return Err(ValidationError::new(
            "container",
            container,
            operation,
            format!("length {len} is outside {MIN_CONTAINER_LEN}..={MAX_CONTAINER_LEN}"),
        ));
    }

    if let Some(ch) = container
        .chars()
        .find(|ch| !is_lower_alnum(*ch) && *ch != '-')
    {
        return Err(ValidationError::new(
            "container",
            container,
            operation,
            format!("contains forbidden character: {ch:?}"),
        ));
    }

    // Dash-separated runs of [a-z0-9], each non-empty.
    if container.split('-').any(str::is_empty) {
        return Err(ValidationError::new(
            "container",
            container,
            operation,
            "dashes must separate non-empty runs of letters and digits",
        ));
    }

    Ok(())
}

/// Validate both halves of an object reference. The name is checked first.
pub fn validate(object: &ObjectRef, operation: &str) -> TypeResult<()> {
    validate_object_name(&object.name, operation)?;
    validate_container_name(&object.container, operation)
}

fn truncate_for_display(name: &str) -> String {
    const SHOWN: usize = 64;
    if name.chars().count() <= SHOWN {
        name.to_string()
    } else {
        let head: String = name.chars().take(SHOWN).collect();
        format!("{head}...")
    }
}
