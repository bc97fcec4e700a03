// Login challenge response
//
// The server answers the identify step with a salt. The client proves
// knowledge of the password with a keyed double MD5 whose pads are the
// salt XOR'd with the HMAC constants, padded to one 64-byte block.

use md5::{Digest, Md5};

const BLOCK_LEN: usize = 64;
const OUTER_PAD: u8 = 0x5C;
const INNER_PAD: u8 = 0x36;

/// Compute the uppercase hex response for the `92` login step.
///
/// Pads are built per salt *character* (its code point XOR the pad
/// constant) and hashed as UTF-8, which is how the server builds them.
/// Positions past the end of the salt use the bare constant; salt
/// characters beyond the block length are ignored.
pub fn salted_hash(username: &str, password: &str, salt: &str) -> String {
    let outer = pad(salt, OUTER_PAD);
    let inner = pad(salt, INNER_PAD);

    let inner_digest = md5_upper_hex(&[inner.as_bytes(), username.as_bytes(), password.as_bytes()]);
    md5_upper_hex(&[outer.as_bytes(), inner_digest.as_bytes()])
}

fn pad(salt: &str, constant: u8) -> String {
    let mut chars = salt.chars();
    (0..BLOCK_LEN)
        .map(|_| match chars.next() {
            Some(c) => char::from_u32(u32::from(c) ^ u32::from(constant))
                .unwrap_or(char::REPLACEMENT_CHARACTER),
            None => char::from(constant),
        })
        .collect()
}

fn md5_upper_hex(parts: &[&[u8]]) -> String {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode_upper(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_vector() {
        assert_eq!(
            salted_hash("alice", "secret", "saltvalue"),
            "DEE4D9FF4390E4008C3AEEDBBA6BFBE8"
        );
        assert_eq!(
            salted_hash("admin", "gira", "0123456789abcdef"),
            "43178C558342D1DA04042DE6E67D1217"
        );
    }

    #[test]
    fn empty_salt_uses_constant_pads() {
        assert_eq!(
            salted_hash("alice", "secret", ""),
            "BF90119942CBB9743E9298B5E3666324"
        );
    }

    #[test]
    fn non_ascii_salt_is_hashed_as_utf8() {
        assert_eq!(
            salted_hash("alice", "secret", "sälz"),
            "383FC7CDEF02B9197B194C5DE1A8B4D4"
        );
    }

    #[test]
    fn salt_beyond_block_is_ignored() {
        let long = "x".repeat(80);
        let block = "x".repeat(64);
        assert_eq!(salted_hash("alice", "secret", &long), salted_hash("alice", "secret", &block));
        assert_eq!(
            salted_hash("alice", "secret", &block),
            "F59CE1D70679197CD5001CF59F02845E"
        );
    }

    #[test]
    fn single_byte_change_alters_response() {
        let base = salted_hash("alice", "secret", "saltvalue");
        assert_ne!(base, salted_hash("alicf", "secret", "saltvalue"));
        assert_ne!(base, salted_hash("alice", "secreu", "saltvalue"));
        assert_ne!(base, salted_hash("alice", "secret", "saltvaluf"));
        assert_eq!(
            salted_hash("alice", "secreu", "saltvalue"),
            "3967D60E19AF1E9329F751C9D439BC0F"
        );
    }

    #[test]
    fn response_is_uppercase_hex() {
        let hash = salted_hash("alice", "secret", "saltvalue");
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }
}
