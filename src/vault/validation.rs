//! Field checks run before any storage call.

use super::{CardInput, CredentialInput};
use thiserror::Error;

/// Length of an accepted card number, after spaces are removed.
const CARD_NUMBER_DIGITS: usize = 16;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service name is required")]
    MissingServiceName,
    #[error("identity is required")]
    MissingIdentity,
    #[error("password is required")]
    MissingPassword,
    #[error("invalid card number")]
    CardNumber,
    #[error("invalid expiration date")]
    ExpirationDate,
    #[error("invalid holder name")]
    HolderName,
    #[error("invalid CVV")]
    Cvv,
}

pub fn validate_credential(input: &CredentialInput) -> Result<(), ValidationError> {
    if input.service_name.trim().is_empty() {
        return Err(ValidationError::MissingServiceName);
    }
    if input.identity.trim().is_empty() {
        return Err(ValidationError::MissingIdentity);
    }
    if input.password.is_empty() {
        return Err(ValidationError::MissingPassword);
    }
    Ok(())
}

/// Validate a card and return it with the number normalised (spaces removed).
pub fn validate_card(input: &CardInput) -> Result<CardInput, ValidationError> {
    let number = normalize_card_number(&input.number);
    if number.len() != CARD_NUMBER_DIGITS || !is_numeric(&number) || !luhn_valid(&number) {
        return Err(ValidationError::CardNumber);
    }
    if !is_valid_expiry(&input.expiration_date) {
        return Err(ValidationError::ExpirationDate);
    }
    if !is_valid_holder(&input.holder_name) {
        return Err(ValidationError::HolderName);
    }
    if input.cvv.len() != 3 || !is_numeric(&input.cvv) {
        return Err(ValidationError::Cvv);
    }

    Ok(CardInput {
        number,
        ..input.clone()
    })
}

pub fn normalize_card_number(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ').collect()
}

/// Luhn checksum over ASCII digits. Any non-digit fails.
pub fn luhn_valid(number: &str) -> bool {
    let parity = number.len() % 2;
    let mut sum = 0u32;
    for (i, c) in number.chars().enumerate() {
        let Some(mut digit) = c.to_digit(10) else {
            return false;
        };
        if i % 2 == parity {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    sum % 10 == 0
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// `MM/YY` with month 01 through 12.
fn is_valid_expiry(raw: &str) -> bool {
    let Some((month, year)) = raw.split_once('/') else {
        return false;
    };
    if raw.len() != 5 || month.len() != 2 || year.len() != 2 {
        return false;
    }
    if !is_numeric(month) || !is_numeric(year) {
        return false;
    }
    matches!(month.parse::<u8>(), Ok(1..=12))
}

fn is_valid_holder(raw: &str) -> bool {
    !raw.trim().is_empty() && raw.chars().all(|c| c.is_alphabetic() || c == ' ')
}
