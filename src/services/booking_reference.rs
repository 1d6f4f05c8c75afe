//! Короткий человекочитаемый код брони.

use rand::Rng;

pub const REFERENCE_LEN: usize = 8;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Генератор кода брони. Уникальность не гарантируется: вызывающий код
/// обязан повторить попытку, если хранилище отвергло код как занятый.
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BookingReferenceGenerator;

impl ReferenceGenerator for BookingReferenceGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..REFERENCE_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn code_is_eight_uppercase_alphanumerics() {
        let code = BookingReferenceGenerator.generate();
        assert_eq!(code.len(), REFERENCE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn codes_rarely_repeat() {
        let codes: HashSet<String> = (0..1000).map(|_| BookingReferenceGenerator.generate()).collect();
        assert!(codes.len() > 990);
    }
}
