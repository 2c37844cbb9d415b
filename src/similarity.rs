use serde::{Deserialize, Serialize};

/// Similarity function used for fuzzy player and team matching. Both variants
/// compare token-sorted strings, so word order does not matter, and report an
/// integer 0-100 score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scorer {
    /// Indel ratio: `2 * lcs / (len_a + len_b)`.
    #[default]
    TokenSort,
    JaroWinkler,
}

impl Scorer {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "token_sort" | "token-sort" | "tokensort" => Some(Scorer::TokenSort),
            "jaro_winkler" | "jaro-winkler" | "jarowinkler" => Some(Scorer::JaroWinkler),
            _ => None,
        }
    }

    pub fn score(self, a: &str, b: &str) -> u8 {
        self.score_sorted(&token_sorted(a), &token_sorted(b))
    }

    /// Same as [`Scorer::score`] for inputs already passed through
    /// [`token_sorted`].
    pub fn score_sorted(self, a: &str, b: &str) -> u8 {
        if a.is_empty() || b.is_empty() {
            return 0;
        }
        match self {
            Scorer::TokenSort => indel_ratio(a, b),
            Scorer::JaroWinkler => to_percent(strsim::jaro_winkler(a, b)),
        }
    }
}

pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    Scorer::TokenSort.score(a, b)
}

pub fn token_sorted(key: &str) -> String {
    let mut tokens = key.split_whitespace().collect::<Vec<_>>();
    tokens.sort_unstable();
    tokens.join(" ")
}

// Floored so that `score >= threshold` agrees with the unrounded ratio for
// every integer threshold.
fn indel_ratio(a: &str, b: &str) -> u8 {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    let total = a.len() + b.len();
    if total == 0 {
        return 0;
    }
    let lcs = lcs_len(&a, &b);
    u8::try_from(200 * lcs / total).unwrap_or(100)
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn to_percent(sim: f64) -> u8 {
    (sim.clamp(0.0, 1.0) * 100.0).floor() as u8
}
