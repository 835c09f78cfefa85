//! Random workspace tags.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of the tag keying every shadow workspace and remote temp tree.
pub const TAG_LEN: usize = 12;

/// Generate a random tag of ASCII letters.
pub fn random_tag() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .map(char::from)
        .filter(|c| c.is_ascii_alphabetic())
        .take(TAG_LEN)
        .collect()
}
