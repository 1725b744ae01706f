//! Physical keyboard proximity, the last tie-break of suggestion ranking.
//!
//! Keys are laid out on a staggered QWERTY grid; the proximity of two
//! keys is the complement of their euclidean distance scaled by the
//! farthest pair, so it always falls in `[0, 1]`.

use std::collections::HashMap;

use once_cell::sync::Lazy;

const ROWS: [(&str, f64); 3] = [("qwertyuiop", 0.0), ("asdfghjkl", 0.25), ("zxcvbnm", 0.75)];

struct KeyDistance {
    positions: HashMap<char, (f64, f64)>,
    max_distance: f64,
}

impl KeyDistance {
    fn new() -> KeyDistance {
        let mut positions = HashMap::new();
        for (row, (keys, stagger)) in ROWS.iter().enumerate() {
            for (column, key) in keys.chars().enumerate() {
                positions.insert(key, (column as f64 + stagger, row as f64));
            }
        }

        let mut max_distance = 0.0f64;
        for &first in positions.values() {
            for &second in positions.values() {
                max_distance = max_distance.max(distance(first, second));
            }
        }

        KeyDistance { positions, max_distance }
    }
}

fn distance((ax, ay): (f64, f64), (bx, by): (f64, f64)) -> f64 {
    ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
}

static KEY_DISTANCE: Lazy<KeyDistance> = Lazy::new(KeyDistance::new);

/// How close two keys sit on the keyboard: 1 for the same key, 0 for the
/// farthest pair or for characters that are not on the grid.
pub fn key_proximity(first: char, second: char) -> f64 {
    if first == second {
        return 1.0;
    }
    let table = &*KEY_DISTANCE;
    let first = table.positions.get(&first.to_ascii_lowercase());
    let second = table.positions.get(&second.to_ascii_lowercase());
    match (first, second) {
        (Some(&first), Some(&second)) => 1.0 - distance(first, second) / table.max_distance,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_keys_score_one() {
        assert_eq!(key_proximity('q', 'q'), 1.0);
        assert_eq!(key_proximity('é', 'é'), 1.0);
    }

    #[test]
    fn neighbors_beat_distant_keys() {
        assert!(key_proximity('q', 'w') > key_proximity('q', 'p'));
        assert!(key_proximity('j', 'k') > key_proximity('j', 'z'));
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(key_proximity('Q', 'w'), key_proximity('q', 'w'));
    }

    #[test]
    fn unknown_characters_score_zero() {
        assert_eq!(key_proximity('q', 'é'), 0.0);
        assert_eq!(key_proximity('!', 'q'), 0.0);
    }

    #[test]
    fn proximity_stays_in_range() {
        for first in "qwertyuiopasdfghjklzxcvbnm".chars() {
            for second in "qwertyuiopasdfghjklzxcvbnm".chars() {
                let proximity = key_proximity(first, second);
                assert!((0.0..=1.0).contains(&proximity));
            }
        }
    }
}
