use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Canonical comparison key for a free-text name.
///
/// Accents are stripped, text is lowercased and every run of characters that
/// are not alphanumeric collapses into a single space. Single-letter initials
/// survive as their own token ("A. Markanich" -> "a markanich"). An empty
/// result means the input cannot be matched.
pub fn normalize(input: &str) -> String {
    let folded = input
        .chars()
        .filter(|ch| !is_zero_width(*ch))
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch))
        .flat_map(char::to_lowercase)
        .nfkd()
        .filter(|ch| !is_combining_mark(*ch));

    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for ch in folded {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

fn is_zero_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{2060}' | '\u{feff}' | '\u{00ad}'
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClubKey {
    Blank,
    /// A 2-4 letter code, uppercased ("MIN", "RBNY").
    Abbr(String),
    /// Anything else, as a normalized label ("atl united").
    Name(String),
}

impl ClubKey {
    /// Lowercase key usable against the label universe, whatever the variant.
    pub fn label_key(&self) -> Option<String> {
        match self {
            ClubKey::Blank => None,
            ClubKey::Abbr(code) => Some(code.to_lowercase()),
            ClubKey::Name(name) => Some(name.clone()),
        }
    }
}

/// Team labels arrive as codes ("min", " MIN ") or as club names
/// ("Minnesota United FC", "D.C. United"). Dots and apostrophes are dropped
/// first so "D.C." reads as the code "DC".
pub fn normalize_club(input: &str) -> ClubKey {
    let compact = strip_label_punctuation(input);
    let upper = compact.trim().to_uppercase();
    if upper.is_empty() {
        return ClubKey::Blank;
    }
    if is_team_code(&upper) {
        return ClubKey::Abbr(upper);
    }
    let name = normalize(&compact);
    if name.is_empty() {
        ClubKey::Blank
    } else {
        ClubKey::Name(name)
    }
}

/// Key under which a full club name or alias is indexed.
pub fn club_label_key(label: &str) -> String {
    normalize(&strip_label_punctuation(label))
}

fn strip_label_punctuation(input: &str) -> String {
    input
        .chars()
        .filter(|ch| !matches!(ch, '.' | '\'' | '\u{2019}'))
        .collect()
}

pub fn is_team_code(raw: &str) -> bool {
    (2..=4).contains(&raw.chars().count()) && raw.chars().all(|ch| ch.is_ascii_alphabetic())
}

/// First initial plus last token of a normalized name:
/// "alejandro markanich" and "a markanich" both give `('a', "markanich")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InitialKey {
    pub initial: char,
    pub last: String,
}

pub fn initial_key(normalized: &str) -> Option<InitialKey> {
    let mut tokens = normalized.split_whitespace();
    let first = tokens.next()?;
    let last = tokens.last()?;
    let initial = first.chars().next()?;
    Some(InitialKey {
        initial,
        last: last.to_string(),
    })
}

/// True when the name leads with a bare initial ("r lod").
pub fn is_initialed(normalized: &str) -> bool {
    let mut tokens = normalized.split_whitespace();
    let Some(first) = tokens.next() else {
        return false;
    };
    first.chars().count() == 1 && tokens.next().is_some()
}
