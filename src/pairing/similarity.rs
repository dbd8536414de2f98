//! Ratcliff/Obershelp ("gestalt pattern matching") similarity.
//!
//! Produces the same ratio as Python's `difflib.SequenceMatcher(None, a, b).ratio()`,
//! including the automatic junk heuristic for long second sequences, so pairing
//! decisions stay stable against reports produced by the existing tooling.

use std::collections::HashMap;

/// Second sequences at least this long drop their popular elements from the index.
const AUTOJUNK_MIN_LEN: usize = 200;

/// `2·M / T` where `M` is the number of matched characters and `T` the total
/// length of both strings. Two empty strings are identical.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched = Matcher::new(&a, &b).matched_len();
    2.0 * matched as f64 / total as f64
}

struct Matcher<'a> {
    a: &'a [char],
    b: &'a [char],
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> Matcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b2j.entry(*c).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let popular = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= popular);
        }

        Self { a, b, b2j }
    }

    /// Longest common block in `a[alo..ahi]` / `b[blo..bhi]`, earliest in `a`
    /// then earliest in `b` on ties. Returns `(i, j, size)`.
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        let mut j2len: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let previous = j
                        .checked_sub(1)
                        .and_then(|p| j2len.get(&p))
                        .copied()
                        .unwrap_or(0);
                    let k = previous + 1;
                    next_j2len.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            j2len = next_j2len;
        }

        // Popular elements are missing from the index; grow across them.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }

    /// Total size of all matching blocks.
    fn matched_len(&self) -> usize {
        let mut matched = 0;
        let mut queue = vec![(0, self.a.len(), 0, self.b.len())];

        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let (i, j, k) = self.longest_match(alo, ahi, blo, bhi);
            if k == 0 {
                continue;
            }
            matched += k;
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }

        matched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_and_disjoint() {
        assert!(close(similarity_ratio("RelValZMM_13", "RelValZMM_13"), 1.0));
        assert!(close(similarity_ratio("abc", "xyz"), 0.0));
        assert!(close(similarity_ratio("", ""), 1.0));
        assert!(close(similarity_ratio("abc", ""), 0.0));
    }

    #[test]
    fn matches_difflib_reference_values() {
        // Values computed with difflib.SequenceMatcher(None, a, b).ratio()
        assert!(close(similarity_ratio("abcd", "bcde"), 0.75));
        assert!(close(similarity_ratio("ab", "ba"), 0.5));
        assert!(close(similarity_ratio("abxcd", "abcd"), 8.0 / 9.0));
        assert!(close(similarity_ratio("private Thread currentThread;",
                                       "private volatile Thread currentThread;"),
                      0.8656716417910447));
    }

    #[test]
    fn ratio_is_bounded() {
        let samples = [
            ("RelValTTbar_13_PU25ns_105X_upgrade2018_realistic_v2_rsb", "RelValTTbar_13_PUpmx25ns_105X_upgrade2018_realistic_v2"),
            ("RelValZEE_13_PU25ns", "RelValZMM_13_PU25ns"),
            ("a", "aaaa"),
        ];
        for (a, b) in samples {
            let ratio = similarity_ratio(a, b);
            assert!((0.0..=1.0).contains(&ratio), "{a} vs {b} -> {ratio}");
        }
    }

    #[test]
    fn long_sequences_use_popular_element_heuristic() {
        let a = format!("{}{}", "x".repeat(10), "a".repeat(250));
        let b = format!("{}b", "a".repeat(249));
        // Every 'a' in b is popular and unindexed and 'b' never occurs in a,
        // so there is no seed to grow from.
        assert!(close(similarity_ratio(&a, &b), 0.0));

        // Growth from the empty match at the origin still crosses popular elements.
        let a = "a".repeat(250);
        assert!(close(similarity_ratio(&a, &b), 0.996));
    }
}
