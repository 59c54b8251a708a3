//! Structured version comparison (major.minor.patch, optional prerelease).

use std::cmp::Ordering;
use std::fmt;

/// A parsed version number. Prerelease versions order below the
/// corresponding release (`1.2.0-beta.1 < 1.2.0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl Version {
    /// Parses "1.2.3", "v1.2.3" or "1.2.3-beta.1". Missing patch defaults
    /// to zero; fewer than two numeric components is a parse failure.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().strip_prefix('v').unwrap_or_else(|| s.trim());
        let (numbers, pre) = match s.split_once('-') {
            Some((n, p)) => (n, Some(p.to_string())),
            None => (s, None),
        };

        let mut parts = numbers.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }

        Some(Self { major, minor, patch, pre })
    }

    /// Parses a release tag. Release tags carry a single non-numeric prefix
    /// character ("v1.2.0", "r1.2.0") which is stripped before parsing.
    /// Multi-character prefixes are not handled and will fail to parse.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::parse(strip_tag_prefix(tag))
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }
}

/// Strips at most one leading non-numeric character from a release tag.
pub fn strip_tag_prefix(tag: &str) -> &str {
    let tag = tag.trim();
    match tag.chars().next() {
        Some(c) if !c.is_ascii_digit() => &tag[c.len_utf8()..],
        _ => tag,
    }
}

/// Whether `candidate` is strictly newer than `current`. Unparseable
/// candidates are never newer; an unparseable current version always is.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (Version::parse(candidate), Version::parse(current)) {
        (Some(c), Some(cur)) => c.is_newer_than(&cur),
        (Some(_), None) => true,
        _ => false,
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        match &self.pre {
            Some(pre) => write!(f, "-{}", pre),
            None => Ok(()),
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // release > prerelease at the same number
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_and_prefixed() {
        let v = Version::parse("1.2.3").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 2, 3));
        assert!(v.pre.is_none());

        let v = Version::parse("v0.9").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (0, 9, 0));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Version::parse("").is_none());
        assert!(Version::parse("1").is_none());
        assert!(Version::parse("a.b.c").is_none());
        assert!(Version::parse("1.2.3.4").is_none());
    }

    #[test]
    fn newer_comparison() {
        assert!(is_newer("1.0.2", "1.0.1"));
        assert!(!is_newer("1.0.1", "1.0.1"));
        assert!(!is_newer("1.0.0", "1.0.1"));
        assert!(is_newer("2.0.0", "1.9.9"));
    }

    #[test]
    fn prerelease_orders_below_release() {
        let pre = Version::parse("1.2.0-beta.1").unwrap();
        let rel = Version::parse("1.2.0").unwrap();
        assert!(rel.is_newer_than(&pre));
        assert!(!pre.is_newer_than(&rel));
        assert!(pre.is_prerelease());
    }

    #[test]
    fn tag_prefix_strip() {
        assert_eq!(strip_tag_prefix("v1.2.0"), "1.2.0");
        assert_eq!(strip_tag_prefix("1.2.0"), "1.2.0");
        // single-character strip only; multi-character prefixes mis-parse
        assert_eq!(strip_tag_prefix("rel-1.2.0"), "el-1.2.0");
        assert!(Version::from_tag("r1.0.1").is_some());
        assert!(Version::from_tag("rel-1.0.1").is_none());
    }
}
