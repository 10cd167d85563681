//! Maven version ordering.
//!
//! Versions are split into numeric and qualifier items on `.`, `-` and
//! digit/letter transitions. Numeric items compare numerically; qualifiers
//! order as
//!
//! ```text
//! alpha < beta < milestone < rc < snapshot < (release) < sp < anything else
//! ```
//!
//! with `ga`, `final` and `release` meaning a plain release and `cr` meaning
//! `rc`. Trailing zeros and release qualifiers are insignificant, so `1`,
//! `1.0` and `1.0.0-final` are equal.

use std::cmp::Ordering;
use std::fmt;

/// Qualifiers with a fixed rank; index is the rank.
const QUALIFIERS: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];

#[derive(Debug, Clone)]
enum Item {
    /// Decimal digits without leading zeros (`"0"` for zero).
    Int(String),
    /// Lowercase qualifier with aliases resolved.
    Str(String),
    /// Items after a `-` or a digit/letter transition.
    List(Vec<Item>),
}

impl Item {
    fn int(digits: &str) -> Item {
        let trimmed = digits.trim_start_matches('0');
        Item::Int(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
    }

    fn qualifier(token: &str, followed_by_digit: bool) -> Item {
        let token = match token {
            "a" if followed_by_digit => "alpha",
            "b" if followed_by_digit => "beta",
            "m" if followed_by_digit => "milestone",
            "ga" | "final" | "release" => "",
            "cr" => "rc",
            other => other,
        };
        Item::Str(token.to_string())
    }

    fn is_null(&self) -> bool {
        match self {
            Item::Int(digits) => digits == "0",
            Item::Str(qualifier) => qualifier.is_empty(),
            Item::List(items) => items.is_empty(),
        }
    }

    /// Compare against a missing item.
    fn cmp_missing(&self) -> Ordering {
        match self {
            Item::Int(digits) if digits == "0" => Ordering::Equal,
            Item::Int(_) => Ordering::Greater,
            Item::Str(qualifier) => qualifier_rank(qualifier).cmp(&qualifier_rank("")),
            Item::List(items) => items.first().map_or(Ordering::Equal, Item::cmp_missing),
        }
    }

    fn cmp_item(&self, other: &Item) -> Ordering {
        match (self, other) {
            (Item::Int(a), Item::Int(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Item::Int(_), _) => Ordering::Greater,
            (Item::Str(_), Item::Int(_)) => Ordering::Less,
            (Item::Str(a), Item::Str(b)) => qualifier_rank(a).cmp(&qualifier_rank(b)),
            (Item::Str(_), Item::List(_)) => Ordering::Less,
            (Item::List(_), Item::Int(_)) => Ordering::Less,
            (Item::List(_), Item::Str(_)) => Ordering::Greater,
            (Item::List(a), Item::List(b)) => cmp_items(a, b),
        }
    }
}

/// Known qualifiers by rank, then unknown ones lexically after all of them.
fn qualifier_rank(qualifier: &str) -> (usize, &str) {
    match QUALIFIERS.iter().position(|known| *known == qualifier) {
        Some(rank) => (rank, ""),
        None => (QUALIFIERS.len(), qualifier),
    }
}

fn cmp_items(a: &[Item], b: &[Item]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let ordering = match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => x.cmp_item(y),
            (Some(x), None) => x.cmp_missing(),
            (None, Some(y)) => y.cmp_missing().reverse(),
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Drop trailing null items, stopping at the first significant one.
fn normalize(items: &mut Vec<Item>) {
    let mut i = items.len();
    while i > 0 {
        i -= 1;
        if items[i].is_null() {
            if i + 1 == items.len() || matches!(items[i + 1], Item::Str(_)) {
                items.remove(i);
            }
        } else if !matches!(items[i], Item::List(_)) {
            break;
        }
    }
}

fn push_token(items: &mut Vec<Item>, token: &str, is_digit: bool) {
    if token.is_empty() {
        items.push(Item::Int("0".to_string()));
    } else if is_digit {
        items.push(Item::int(token));
    } else {
        items.push(Item::qualifier(token, false));
    }
}

fn parse_items(raw: &str) -> Vec<Item> {
    let version = raw.to_ascii_lowercase();
    // Each `-` or digit/letter transition opens a nested list that becomes
    // the last item of the enclosing one.
    let mut levels: Vec<Vec<Item>> = vec![Vec::new()];
    let mut start = 0;
    let mut is_digit = false;

    for (i, c) in version.char_indices() {
        let Some(current) = levels.last_mut() else {
            break;
        };
        match c {
            '.' => {
                push_token(current, &version[start..i], is_digit);
                start = i + 1;
            }
            '-' => {
                push_token(current, &version[start..i], is_digit);
                start = i + 1;
                levels.push(Vec::new());
            }
            c if c.is_ascii_digit() => {
                if !is_digit && i > start {
                    current.push(Item::qualifier(&version[start..i], true));
                    start = i;
                    levels.push(Vec::new());
                }
                is_digit = true;
            }
            _ => {
                if is_digit && i > start {
                    current.push(Item::int(&version[start..i]));
                    start = i;
                    levels.push(Vec::new());
                }
                is_digit = false;
            }
        }
    }
    if start < version.len() {
        if let Some(current) = levels.last_mut() {
            push_token(current, &version[start..], is_digit);
        }
    }

    let mut nested: Option<Vec<Item>> = None;
    while let Some(mut level) = levels.pop() {
        if let Some(child) = nested.take() {
            level.push(Item::List(child));
        }
        normalize(&mut level);
        nested = Some(level);
    }
    nested.unwrap_or_default()
}

/// A version string with Maven ordering.
///
/// Equality follows the ordering, so `MavenVersion::parse("1.0")` equals
/// `MavenVersion::parse("1")`; the original text is kept for display.
#[derive(Debug, Clone)]
pub struct MavenVersion {
    raw: String,
    items: Vec<Item>,
}

impl MavenVersion {
    pub fn parse(raw: &str) -> Self {
        MavenVersion {
            raw: raw.to_string(),
            items: parse_items(raw),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot(&self.raw)
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_items(&self.items, &other.items)
    }
}

/// Compare two version strings with Maven ordering.
pub fn compare(a: &str, b: &str) -> Ordering {
    MavenVersion::parse(a).cmp(&MavenVersion::parse(b))
}

/// Whether `version` names a snapshot build.
pub fn is_snapshot(version: &str) -> bool {
    version.to_ascii_uppercase().ends_with("SNAPSHOT")
}
