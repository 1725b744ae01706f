//! Picks the single best replacement for a misspelled word.
//!
//! The candidates come out of [`SpellingIndex::open_termlist`]; each one
//! gets its true Damerau-Levenshtein distance to the query and the winner
//! is the minimum by distance, then by descending stored frequency, then
//! by keyboard penalty (a substitution between neighboring keys is the
//! likelier slip), then alphabetically.

use heed::RoTxn;

use crate::index::SpellingIndex;
use crate::{keyboard, Result};

pub struct Suggestion<'a> {
    rtxn: &'a RoTxn<'a>,
    index: &'a SpellingIndex,
    word: &'a str,
    prefix: &'a str,
    max_edits: u32,
}

impl<'a> Suggestion<'a> {
    pub fn new(rtxn: &'a RoTxn<'a>, index: &'a SpellingIndex, word: &'a str) -> Suggestion<'a> {
        let max_edits = word.chars().count() as u32;
        Suggestion { rtxn, index, word, prefix: "", max_edits }
    }

    pub fn prefix(&mut self, prefix: &'a str) -> &mut Suggestion<'a> {
        self.prefix = prefix;
        self
    }

    pub fn max_edits(&mut self, max_edits: u32) -> &mut Suggestion<'a> {
        self.max_edits = max_edits;
        self
    }

    pub fn execute(&self) -> Result<Option<String>> {
        let query: Vec<char> = self.word.chars().collect();
        let list = self.index.open_termlist(self.rtxn, self.word, self.prefix, self.max_edits)?;
        let Some(mut list) = list else { return Ok(None) };

        let mut best: Option<Candidate> = None;
        loop {
            list.next()?;
            if list.at_end() {
                break;
            }
            let name = list.get_termname();
            // The query itself is never a suggestion, even when stored.
            if name == self.word {
                continue;
            }

            let candidate: Vec<char> = name.chars().collect();
            let distance = edit_distance(&query, &candidate);
            if distance > self.max_edits {
                continue;
            }

            let freq = self.index.word_frequency(self.rtxn, name, self.prefix)?;
            let challenger = Candidate {
                distance,
                freq,
                penalty: keyboard_penalty(&query, &candidate),
                word: name.to_owned(),
            };
            best = Some(match best.take() {
                Some(current) if !challenger.beats(&current) => current,
                _ => challenger,
            });
        }

        Ok(best.map(|candidate| candidate.word))
    }
}

impl SpellingIndex {
    /// Starts a [`Suggestion`] lookup over this table.
    pub fn suggestion<'a>(&'a self, rtxn: &'a RoTxn<'a>, word: &'a str) -> Suggestion<'a> {
        Suggestion::new(rtxn, self, word)
    }
}

struct Candidate {
    distance: u32,
    freq: u32,
    penalty: f64,
    word: String,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.distance != other.distance {
            return self.distance < other.distance;
        }
        if self.freq != other.freq {
            return self.freq > other.freq;
        }
        if self.penalty != other.penalty {
            return self.penalty < other.penalty;
        }
        self.word < other.word
    }
}

/// Summed awkwardness of the substituted keys; only same-length pairs
/// qualify, anything else ties at zero.
fn keyboard_penalty(query: &[char], candidate: &[char]) -> f64 {
    if query.len() != candidate.len() {
        return 0.0;
    }
    query
        .iter()
        .zip(candidate)
        .filter(|(q, c)| q != c)
        .map(|(&q, &c)| 1.0 - keyboard::key_proximity(q, c))
        .sum()
}

/// The Damerau-Levenshtein distance over code points, counting inserts,
/// deletes, substitutions and adjacent transpositions.
pub(crate) fn edit_distance(a: &[char], b: &[char]) -> u32 {
    if a.is_empty() {
        return b.len() as u32;
    }
    if b.is_empty() {
        return a.len() as u32;
    }

    let cols = b.len() + 1;
    let mut two_ago = vec![0u32; cols];
    let mut one_ago: Vec<u32> = (0..cols as u32).collect();
    let mut current = vec![0u32; cols];

    for i in 1..=a.len() {
        current[0] = i as u32;
        for j in 1..=b.len() {
            let substitution = u32::from(a[i - 1] != b[j - 1]);
            let mut distance = (one_ago[j] + 1)
                .min(current[j - 1] + 1)
                .min(one_ago[j - 1] + substitution);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                distance = distance.min(two_ago[j - 2] + 1);
            }
            current[j] = distance;
        }
        std::mem::swap(&mut two_ago, &mut one_ago);
        std::mem::swap(&mut one_ago, &mut current);
    }

    one_ago[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SpellingEngine;
    use crate::index::tests::TempSpelling;
    use crate::SpellingSession;

    fn distance(a: &str, b: &str) -> u32 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        edit_distance(&a, &b)
    }

    #[test]
    fn edit_distance_basics() {
        assert_eq!(distance("hello", "hello"), 0);
        assert_eq!(distance("hello", "helo"), 1);
        assert_eq!(distance("helo", "hello"), 1);
        assert_eq!(distance("hello", "jello"), 1);
        assert_eq!(distance("", "abc"), 3);
        assert_eq!(distance("abc", ""), 3);
        assert_eq!(distance("kitten", "sitting"), 3);
    }

    #[test]
    fn adjacent_transpositions_count_as_one() {
        assert_eq!(distance("cat", "cta"), 1);
        assert_eq!(distance("hello", "ehllo"), 1);
        // A swap of distant characters is not a transposition.
        assert_eq!(distance("abcd", "dbca"), 2);
    }

    #[test]
    fn frequency_breaks_distance_ties() {
        for engine in [SpellingEngine::Trigram, SpellingEngine::Fastss] {
            let index = TempSpelling::new(engine);
            let mut wtxn = index.write_txn().unwrap();
            let mut session = SpellingSession::new(&mut wtxn, &index);
            session.add_word("hello", "", 3).unwrap();
            session.add_word("hells", "", 1).unwrap();
            session.execute().unwrap();
            wtxn.commit().unwrap();

            let rtxn = index.read_txn().unwrap();
            let best = index.suggestion(&rtxn, "hellp").max_edits(2).execute().unwrap();
            assert_eq!(best.as_deref(), Some("hello"));
        }
    }

    #[test]
    fn the_query_itself_is_never_suggested() {
        let index = TempSpelling::new(SpellingEngine::Fastss);
        let mut wtxn = index.write_txn().unwrap();
        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 5).unwrap();
        session.add_word("hullo", "", 1).unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        let best = index.suggestion(&rtxn, "hello").max_edits(2).execute().unwrap();
        assert_eq!(best.as_deref(), Some("hullo"));
    }

    #[test]
    fn no_candidate_within_the_edit_allowance() {
        let index = TempSpelling::new(SpellingEngine::Fastss);
        let mut wtxn = index.write_txn().unwrap();
        let mut session = SpellingSession::new(&mut wtxn, &index);
        session.add_word("hello", "", 1).unwrap();
        session.execute().unwrap();
        wtxn.commit().unwrap();

        let rtxn = index.read_txn().unwrap();
        let best = index.suggestion(&rtxn, "zzz").max_edits(1).execute().unwrap();
        assert_eq!(best, None);
    }

    #[test]
    fn keyboard_penalty_prefers_the_neighboring_slip() {
        // "hellq" and "hellp" differ from "hellw" by one substitution
        // each; 'w' sits next to 'q' and far from 'p'.
        let query: Vec<char> = "hellw".chars().collect();
        let near: Vec<char> = "hellq".chars().collect();
        let far: Vec<char> = "hellp".chars().collect();
        assert!(keyboard_penalty(&query, &near) < keyboard_penalty(&query, &far));
        assert_eq!(keyboard_penalty(&query, &query), 0.0);
    }
}
