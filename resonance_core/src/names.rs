//! Synthetic identity generators (user ids, display names, content hashes).

use crate::rng::LcgRng;

/// Display-name stems; a three-digit suffix is appended.
const NAME_STEMS: [&str; 8] = [
    "Resonator", "Echo", "Wave", "Signal", "Node", "Core", "Pulse", "Stream",
];

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

const AVATAR_BASE: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

/// `user1` ..= `user100`
pub fn user_id(rng: &mut LcgRng) -> String {
    format!("user{}", rng.next_int(1, 100))
}

/// e.g. `Pulse417`
pub fn user_name(rng: &mut LcgRng) -> String {
    let stem = rng.pick(&NAME_STEMS).copied().unwrap_or("Node");
    format!("{}{}", stem, rng.next_int(100, 999))
}

/// Six uppercase hex digits.
pub fn content_hash(rng: &mut LcgRng) -> String {
    (0..6)
        .map(|_| HEX_DIGITS[rng.next_int(0, 15) as usize] as char)
        .collect()
}

/// Avatar reference derived from a user id. Pure function of its input.
pub fn avatar_url(user_id: &str) -> String {
    format!("{AVATAR_BASE}{user_id}")
}
