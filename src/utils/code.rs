// src/utils/code.rs

use rand::Rng;

/// Join-code alphabet: visually ambiguous characters (0/O, 1/I) are
/// excluded so codes survive being read aloud or written on a board.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LEN: usize = 6;

/// Generates a 6-character session join code. Uniqueness is enforced by
/// the database; callers retry on a collision.
pub fn generate_join_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_use_only_the_unambiguous_alphabet() {
        for _ in 0..200 {
            let code = generate_join_code();
            assert_eq!(code.len(), CODE_LEN);
            for c in code.bytes() {
                assert!(CODE_ALPHABET.contains(&c), "unexpected character {}", c as char);
                assert!(!b"01OI".contains(&c));
            }
        }
    }
}
