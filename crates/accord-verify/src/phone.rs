use crate::VerificationError;

/// Normalize a raw phone number to the canonical form used everywhere in
/// the system: country code + subscriber number, digits only, no
/// separators. An 11-digit number with the domestic trunk prefix 8 is
/// rewritten to the 7 country code (e.g. 87001234567 → 77001234567).
pub fn normalize_phone(raw: &str) -> Result<String, VerificationError> {
    if raw
        .chars()
        .any(|c| !(c.is_ascii_digit() || " \t-().+".contains(c)))
    {
        return Err(VerificationError::InvalidPhoneFormat);
    }

    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.len() == 11 && digits.starts_with('8') {
        digits.replace_range(0..1, "7");
    }

    if !(10..=15).contains(&digits.len()) {
        return Err(VerificationError::InvalidPhoneFormat);
    }

    Ok(digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators() {
        assert_eq!(normalize_phone("+7 (700) 123-45-67").unwrap(), "77001234567");
        assert_eq!(normalize_phone("77001234567").unwrap(), "77001234567");
    }

    #[test]
    fn trunk_prefix_rewritten() {
        assert_eq!(normalize_phone("87001234567").unwrap(), "77001234567");
        // a 10-digit number starting with 8 is left alone
        assert_eq!(normalize_phone("8700123456").unwrap(), "8700123456");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            normalize_phone("not a phone"),
            Err(VerificationError::InvalidPhoneFormat)
        ));
        assert!(matches!(
            normalize_phone("1234"),
            Err(VerificationError::InvalidPhoneFormat)
        ));
        assert!(matches!(
            normalize_phone("7700123456789012345"),
            Err(VerificationError::InvalidPhoneFormat)
        ));
    }
}
