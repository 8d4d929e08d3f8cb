/// Secret redaction utilities for logging
///
/// Masks credentials so logs still show which one is configured
/// without leaking it.

/// Redact a bot token, keeping only the last 4 characters visible.
/// Example: "MTIzNDU2.abc.xyz1234" -> "****************1234"
pub fn token(token: &str) -> String {
    let chars: Vec<char> = token.trim().chars().collect();

    if chars.len() <= 8 {
        // Too short to show anything safely
        return "*".repeat(chars.len());
    }

    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
