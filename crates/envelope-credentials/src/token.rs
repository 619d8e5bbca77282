use rand::Rng;

/// Alphabet tokens are drawn from. Letters only, so tokens survive URLs and
/// form encoding untouched.
pub const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub const MIN_TOKEN_LENGTH: usize = 20;
pub const MAX_TOKEN_LENGTH: usize = 32;

/// Generate a token of `len` characters drawn uniformly from `alphabet`.
pub fn generate_token(alphabet: &[u8], len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_requested_length_and_alphabet() {
        for len in [MIN_TOKEN_LENGTH, 26, MAX_TOKEN_LENGTH] {
            let token = generate_token(LETTERS, len);
            assert_eq!(token.len(), len);
            assert!(token.bytes().all(|b| b.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn tokens_differ_between_calls() {
        let a = generate_token(LETTERS, MIN_TOKEN_LENGTH);
        let b = generate_token(LETTERS, MIN_TOKEN_LENGTH);
        assert_ne!(a, b);
    }
}
