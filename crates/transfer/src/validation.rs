use crate::TransferError;

/// Characters the drive service refuses in item names.
const FORBIDDEN_CHARS: &[char] = &['"', '*', ':', '<', '>', '?', '/', '\\', '|'];

/// Validates the name of the item an upload will create.
///
/// Rejects:
/// - Empty names
/// - Names containing `" * : < > ? / \ |` or control characters
/// - Names ending in a dot or a space
/// - `.` and `..`
pub fn validate_item_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidName("empty name".into()));
    }

    if name == "." || name == ".." {
        return Err(TransferError::InvalidName(format!(
            "reserved name not allowed: {name}"
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| FORBIDDEN_CHARS.contains(c) || c.is_control())
    {
        return Err(TransferError::InvalidName(format!(
            "character {c:?} not allowed: {name}"
        )));
    }

    if name.ends_with('.') || name.ends_with(' ') {
        return Err(TransferError::InvalidName(format!(
            "trailing dot or space not allowed: {name}"
        )));
    }

    Ok(())
}
