//! Card-number validation and display formatting.

/// Number of digits a card number must have.
pub const CARD_DIGITS: usize = 16;

/// Normalizes user card input: strips whitespace, then requires exactly
/// 16 ASCII digits. Returns `None` for anything else; the caller
/// re-prompts without changing state.
pub fn normalize_card_number(input: &str) -> Option<String> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() == CARD_DIGITS && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(digits)
    } else {
        None
    }
}

/// Renders a 16-digit card number as four space-separated groups of
/// four. Values of unexpected length (legacy rows) are shown as-is.
pub fn format_card(digits: &str) -> String {
    if digits.len() != CARD_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return digits.to_string();
    }
    format!("{} {} {} {}", &digits[..4], &digits[4..8], &digits[8..12], &digits[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalize_accepts_plain_digits() {
        assert_eq!(normalize_card_number("1234567812345678").as_deref(), Some("1234567812345678"));
    }

    #[test]
    fn normalize_strips_whitespace() {
        assert_eq!(
            normalize_card_number(" 1234 5678 1234 5678 ").as_deref(),
            Some("1234567812345678")
        );
    }

    #[test]
    fn normalize_rejects_wrong_length() {
        assert_eq!(normalize_card_number("123456781234567"), None);
        assert_eq!(normalize_card_number("12345678123456789"), None);
        assert_eq!(normalize_card_number(""), None);
    }

    #[test]
    fn normalize_rejects_non_digits() {
        assert_eq!(normalize_card_number("1234-5678-1234-5678"), None);
        assert_eq!(normalize_card_number("1234567812345abc"), None);
    }

    #[test]
    fn format_groups_of_four() {
        assert_eq!(format_card("8600120312345678"), "8600 1203 1234 5678");
    }

    #[test]
    fn format_leaves_odd_values_alone() {
        assert_eq!(format_card("not-a-card"), "not-a-card");
    }
}
