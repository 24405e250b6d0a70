//! ISBN normalization and checksums.

/// Strip hyphens and spaces; upper-case a trailing ISBN-10 `x`.
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn is_valid_isbn13(raw: &str) -> bool {
    let isbn = normalize_isbn(raw);
    if isbn.len() != 13 || !isbn.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = isbn.chars().filter_map(|c| c.to_digit(10)).collect();
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 3 })
        .sum();
    (10 - sum % 10) % 10 == digits[12]
}

pub fn is_valid_isbn10(raw: &str) -> bool {
    let isbn = normalize_isbn(raw);
    if isbn.len() != 10 {
        return false;
    }
    let mut sum = 0;
    for (i, c) in isbn.chars().enumerate() {
        let value = match (i, c) {
            (9, 'X') => 10,
            (_, c) => match c.to_digit(10) {
                Some(d) => d,
                None => return false,
            },
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

/// Convert a valid ISBN-10 into its 978-prefixed ISBN-13.
pub fn isbn10_to_isbn13(raw: &str) -> Option<String> {
    if !is_valid_isbn10(raw) {
        return None;
    }
    let isbn = normalize_isbn(raw);
    let body = format!("978{}", &isbn[..9]);
    let sum: u32 = body
        .chars()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    let check = (10 - sum % 10) % 10;
    Some(format!("{}{}", body, check))
}

/// Best ISBN-13 available from an ISBN-13 or ISBN-10 candidate.
pub fn canonical_isbn13(isbn13: &str, isbn10: &str) -> Option<String> {
    if is_valid_isbn13(isbn13) {
        return Some(normalize_isbn(isbn13));
    }
    isbn10_to_isbn13(isbn10)
}
