use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 8;

/// Human-readable ticket number: `TIX-{event prefix}-{issue time}-{random}`.
///
/// The event prefix is the first six hex digits of the event id, the issue
/// time is the unix second in base 36 and the suffix is eight random base-36
/// characters. Uniqueness is still enforced by the store.
pub fn ticket_number(event_id: Uuid, issued_at: DateTime<Utc>) -> String {
    let simple = event_id.simple().to_string();
    let prefix = simple[..6].to_uppercase();
    let stamp = base36(issued_at.timestamp().max(0) as u64);

    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();

    format!("TIX-{}-{}-{}", prefix, stamp, suffix)
}

fn base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
