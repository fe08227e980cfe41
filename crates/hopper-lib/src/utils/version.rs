use std::cmp::Ordering;

/// Loose version ordering used for loader versions
/// (`0.14.22`, `47.2.0`, `1.20.1-47.1.3`, `20.4.80-beta`).
///
/// Numeric runs compare numerically, text runs lexically, and a version with a
/// `-tag` suffix sorts before the same version without one.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Version(String);

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Part {
    Numeric(u64),
    Text(String),
}

impl Version {
    pub fn new(v: &str) -> Self {
        Version(v.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parts(s: &str) -> Vec<Part> {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut numeric = false;

        let flush = |current: &mut String, numeric: bool, parts: &mut Vec<Part>| {
            if current.is_empty() {
                return;
            }
            if numeric {
                parts.push(Part::Numeric(current.parse().unwrap_or(0)));
            } else {
                parts.push(Part::Text(current.clone()));
            }
            current.clear();
        };

        for c in s.chars() {
            if c == '.' || c == '-' || c == '+' {
                flush(&mut current, numeric, &mut parts);
                continue;
            }
            let is_digit = c.is_ascii_digit();
            if !current.is_empty() && is_digit != numeric {
                flush(&mut current, numeric, &mut parts);
            }
            numeric = is_digit;
            current.push(c);
        }
        flush(&mut current, numeric, &mut parts);
        parts
    }

    fn compare_parts(a: &[Part], b: &[Part]) -> Ordering {
        for (ap, bp) in a.iter().zip(b.iter()) {
            match ap.cmp(bp) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        a.len().cmp(&b.len())
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a_base, a_tag) = match self.0.split_once('-') {
            Some((b, t)) => (b, Some(t)),
            None => (self.0.as_str(), None),
        };
        let (b_base, b_tag) = match other.0.split_once('-') {
            Some((b, t)) => (b, Some(t)),
            None => (other.0.as_str(), None),
        };

        match Self::compare_parts(&Self::parts(a_base), &Self::parts(b_base)) {
            Ordering::Equal => {}
            ord => return ord,
        }

        match (a_tag, b_tag) {
            (None, None) => Ordering::Equal,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(at), Some(bt)) => Self::compare_parts(&Self::parts(at), &Self::parts(bt)),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::new(a).cmp(&Version::new(b))
}

/// True when `version` sorts strictly before `threshold`.
pub fn is_below(version: &str, threshold: &str) -> bool {
    compare_versions(version, threshold) == Ordering::Less
}

/// Highest version in `versions` starting with `prefix`.
pub fn latest_with_prefix<'a, I>(versions: I, prefix: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    versions
        .into_iter()
        .filter(|v| v.starts_with(prefix))
        .max_by(|a, b| compare_versions(a, b))
        .cloned()
}
