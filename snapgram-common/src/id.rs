//! Client-side generation of document ids.
//!
//! Ids follow the backend's `ID.unique()` layout: the creation second and
//! millisecond in hex, followed by random hex padding. They sort roughly
//! by creation time and stay well below the 36 character id limit.

use rand::Rng;
use time::UtcDateTime;

pub const UNIQUE_ID_PADDING: usize = 7;
pub const MAX_ID_LEN: usize = 36;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

#[must_use]
pub fn unique_id() -> String {
    unique_id_at(UtcDateTime::now(), &mut rand::rng())
}

pub fn unique_id_at<R: Rng + ?Sized>(time: UtcDateTime, rng: &mut R) -> String {
    let seconds = time.unix_timestamp();
    let millis = time.millisecond();

    let mut id = format!("{seconds:x}{millis:05x}");
    for _ in 0..UNIQUE_ID_PADDING {
        id.push(char::from(HEX_DIGITS[rng.random_range(0..HEX_DIGITS.len())]));
    }

    id
}

#[cfg(test)]
mod tests {
    use crate::id::{MAX_ID_LEN, UNIQUE_ID_PADDING, unique_id, unique_id_at};
    use rand::{SeedableRng, rngs::StdRng};
    use time::macros::utc_datetime;

    #[test]
    fn timestamp_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let id = unique_id_at(utc_datetime!(2023-10-17 09:08:43.361), &mut rng);

        assert!(id.starts_with("652e4f1b00169"));
        assert_eq!(id.len(), "652e4f1b00169".len() + UNIQUE_ID_PADDING);
    }

    #[test]
    fn only_lowercase_hex() {
        for _ in 0..100 {
            let id = unique_id();
            assert!(id.len() <= MAX_ID_LEN);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
            );
        }
    }

    #[test]
    fn same_instant_differs_in_padding() {
        let time = utc_datetime!(2025-10-24 10:55);
        let mut rng = StdRng::seed_from_u64(1);

        let first = unique_id_at(time, &mut rng);
        let second = unique_id_at(time, &mut rng);

        assert_eq!(first[..13], second[..13]);
        assert_ne!(first, second);
    }
}
