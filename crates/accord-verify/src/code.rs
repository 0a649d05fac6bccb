use rand::Rng;

/// Uniformly-random numeric code of the given length. Leading zeros are
/// allowed. Draws from the thread-local CSPRNG — a predictable source here
/// would let an attacker skip the SMS entirely.
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_all_digits() {
        for len in [4, 5, 6] {
            let code = generate_code(len);
            assert_eq!(code.len(), len);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn every_digit_appears_and_leading_zero_is_legal() {
        let mut seen = [false; 10];
        let mut leading_zero = false;
        for _ in 0..2000 {
            let code = generate_code(4);
            if code.starts_with('0') {
                leading_zero = true;
            }
            for c in code.bytes() {
                seen[(c - b'0') as usize] = true;
            }
        }
        assert!(seen.iter().all(|&s| s), "some digit never generated");
        assert!(leading_zero, "leading zeros should be possible");
    }
}
