//! Pairing request helpers.

use crate::error::ProxyError;

/// Separator between pairing code groups.
const CODE_GROUP_SEPARATOR: &str = "-";

/// Characters per pairing code group.
const CODE_GROUP_SIZE: usize = 4;

/// A gate-approved request to pair a phone number.
///
/// Lives only until a pairing code (or an error) is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingRequest {
    phone_number: String,
}

impl PairingRequest {
    /// Validate a raw phone number from the query string.
    pub fn new(raw: Option<&str>) -> Result<Self, ProxyError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if normalize_phone_number(raw).is_empty() {
            return Err(ProxyError::MissingPhoneNumber);
        }

        Ok(Self {
            phone_number: raw.to_string(),
        })
    }

    /// The number as submitted.
    pub fn raw(&self) -> &str {
        &self.phone_number
    }

    /// The number with every non-digit stripped.
    pub fn digits(&self) -> String {
        normalize_phone_number(&self.phone_number)
    }
}

/// Strip all non-digit characters.
pub fn normalize_phone_number(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Split a pairing code into dash-separated groups of four.
pub fn format_pairing_code(code: &str) -> String {
    let chars: Vec<char> = code.trim().chars().collect();

    chars
        .chunks(CODE_GROUP_SIZE)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(CODE_GROUP_SEPARATOR)
}
