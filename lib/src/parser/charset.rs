/*!
Character-set predicates used by the AST, the automatons and the VM.

[`CharSet`] is a thin wrapper around [`regex_syntax::hir::ClassUnicode`],
which provides interval-set arithmetic, Unicode general categories and
simple case folding. Only the pieces the analyzer needs are exposed.
*/

use indexmap::IndexMap;
use regex_syntax::hir::{Class, ClassUnicode, ClassUnicodeRange, HirKind};

use crate::errors::Error;

/// A set of Unicode code points, used as the predicate on character
/// transitions and VM class instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharSet {
    inner: ClassUnicode,
}

impl CharSet {
    pub fn empty() -> Self {
        Self { inner: ClassUnicode::empty() }
    }

    pub fn single(c: char) -> Self {
        Self::range(c, c)
    }

    pub fn range(lo: char, hi: char) -> Self {
        let mut inner = ClassUnicode::empty();
        inner.push(ClassUnicodeRange::new(lo, hi));
        Self { inner }
    }

    /// The set matched by the dot: any character, optionally excluding
    /// the line terminator.
    pub fn dot(matches_new_line: bool) -> Self {
        let mut set = Self::range('\0', char::MAX);
        if !matches_new_line {
            let mut nl = Self::single('\n');
            nl.negate();
            set.intersect(&nl);
        }
        set
    }

    /// One of the predefined classes `\d`, `\w` or `\s` (or the negated
    /// uppercase variant). In non-Unicode mode the ASCII sets are used.
    pub fn perl_class(kind: char, unicode: bool) -> Result<Self, Error> {
        let negated = kind.is_ascii_uppercase();
        let mut set = if unicode {
            Self::from_syntax(&format!("\\{}", kind.to_ascii_lowercase()))?
        } else {
            match kind.to_ascii_lowercase() {
                'd' => Self::range('0', '9'),
                's' => {
                    let mut s = Self::range('\t', '\r');
                    s.push(' ', ' ');
                    s
                }
                'w' => {
                    let mut s = Self::range('a', 'z');
                    s.push('A', 'Z');
                    s.push('0', '9');
                    s.push('_', '_');
                    s
                }
                other => {
                    return Err(Error::Internal(format!(
                        "not a perl class: \\{other}"
                    )))
                }
            }
        };
        if negated {
            set.negate();
        }
        Ok(set)
    }

    /// A Unicode general category or script class, e.g. `\p{Greek}`.
    pub fn unicode_class(name: &str, negated: bool) -> Result<Self, Error> {
        let mut set = Self::from_syntax(&format!("\\p{{{name}}}"))?;
        if negated {
            set.negate();
        }
        Ok(set)
    }

    /// Resolves a class through regex-syntax, which owns the Unicode
    /// tables. Only ever called with single-class patterns.
    fn from_syntax(pattern: &str) -> Result<Self, Error> {
        let hir = regex_syntax::Parser::new().parse(pattern).map_err(|_| {
            Error::syntax(format!("unknown character class `{pattern}`"), 0)
        })?;
        match hir.into_kind() {
            HirKind::Class(Class::Unicode(inner)) => Ok(Self { inner }),
            _ => Err(Error::Internal(format!(
                "`{pattern}` did not resolve to a class"
            ))),
        }
    }

    pub fn push(&mut self, lo: char, hi: char) {
        self.inner.push(ClassUnicodeRange::new(lo, hi));
    }

    pub fn union(&mut self, other: &CharSet) {
        self.inner.union(&other.inner);
    }

    pub fn intersect(&mut self, other: &CharSet) {
        self.inner.intersect(&other.inner);
    }

    pub fn negate(&mut self) {
        self.inner.negate();
    }

    /// Adds the simple case-folded closure of the set, implementing the
    /// `ignore_case` flag.
    pub fn case_fold(&mut self) {
        self.inner.case_fold_simple();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ranges().is_empty()
    }

    pub fn contains(&self, c: char) -> bool {
        let c = c as u32;
        self.inner
            .ranges()
            .binary_search_by(|r| {
                if (r.end() as u32) < c {
                    std::cmp::Ordering::Less
                } else if (r.start() as u32) > c {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn ranges(&self) -> impl Iterator<Item = (char, char)> + '_ {
        self.inner.ranges().iter().map(|r| (r.start(), r.end()))
    }

    /// Number of code points in the set, saturating.
    pub fn len(&self) -> usize {
        self.inner
            .ranges()
            .iter()
            .map(|r| (r.end() as usize).saturating_sub(r.start() as usize) + 1)
            .sum()
    }

    /// Returns a representative character, preferring readable ASCII so
    /// generated attack strings stay printable. Deterministic.
    pub fn sample(&self) -> Option<char> {
        if self.is_empty() {
            return None;
        }
        for c in ('a'..='z').chain('0'..='9').chain('A'..='Z') {
            if self.contains(c) {
                return Some(c);
            }
        }
        for c in '\u{21}'..='\u{7e}' {
            if self.contains(c) {
                return Some(c);
            }
        }
        self.inner.ranges().first().map(|r| r.start())
    }

    /// Returns a printable character that is *not* in the set, used when
    /// synthesizing the failing suffix of an attack string.
    pub fn complement_sample(&self) -> Option<char> {
        for c in ['!', '#', '?', '0', 'z', 'A', ' ', '~']
            .into_iter()
            .chain('\u{21}'..='\u{7e}')
            .chain(['\u{1}', '\u{10fffe}'])
        {
            if !self.contains(c) {
                return Some(c);
            }
        }
        None
    }

    fn covers(&self, lo: u32, hi: u32) -> bool {
        self.inner
            .ranges()
            .iter()
            .any(|r| (r.start() as u32) <= lo && hi <= (r.end() as u32))
    }
}

/// Partitions the code-point space touched by `sets` into *atoms*:
/// disjoint sets such that every input set is a union of atoms and any two
/// sets either share an atom completely or not at all. The automatons use
/// atom indices as their finite alphabet.
///
/// Returns the atoms plus, for each input set, the indices of the atoms it
/// is made of. Code points grouped into one atom always belong to exactly
/// the same input sets, so the grouping is maximal. Atom order is
/// deterministic.
pub(crate) fn atomize(sets: &[&CharSet]) -> (Vec<CharSet>, Vec<Vec<u32>>) {
    let mut points: Vec<u32> = Vec::new();
    for set in sets {
        for (lo, hi) in set.ranges() {
            points.push(lo as u32);
            points.push(hi as u32 + 1);
        }
    }
    points.sort_unstable();
    points.dedup();

    let mut by_signature: IndexMap<Vec<bool>, CharSet> = IndexMap::new();
    for window in points.windows(2) {
        let (lo, hi) = (window[0], window[1] - 1);
        let signature: Vec<bool> =
            sets.iter().map(|s| s.covers(lo, hi)).collect();
        if !signature.iter().any(|&b| b) {
            continue;
        }
        // Intervals in the surrogate gap never carry a signature because
        // ClassUnicode ranges exclude surrogates.
        let (Some(lo), Some(hi)) = (char::from_u32(lo), char::from_u32(hi))
        else {
            continue;
        };
        by_signature
            .entry(signature)
            .or_insert_with(CharSet::empty)
            .push(lo, hi);
    }

    let mut memberships = vec![Vec::new(); sets.len()];
    for (atom_id, signature) in by_signature.keys().enumerate() {
        for (set_id, &member) in signature.iter().enumerate() {
            if member {
                memberships[set_id].push(atom_id as u32);
            }
        }
    }
    (by_signature.into_values().collect(), memberships)
}

#[cfg(test)]
pub(crate) fn partition(sets: &[&CharSet]) -> Vec<CharSet> {
    atomize(sets).0
}

#[cfg(test)]
mod tests {
    use super::{partition, CharSet};

    #[test]
    fn dot_excludes_newline() {
        let dot = CharSet::dot(false);
        assert!(dot.contains('a'));
        assert!(!dot.contains('\n'));
        assert!(CharSet::dot(true).contains('\n'));
    }

    #[test]
    fn case_folding() {
        let mut set = CharSet::single('a');
        set.case_fold();
        assert!(set.contains('A'));
        assert!(set.contains('a'));
        assert!(!set.contains('b'));
    }

    #[test]
    fn perl_classes() {
        let digits = CharSet::perl_class('d', true).unwrap();
        assert!(digits.contains('7'));
        assert!(!digits.contains('x'));

        let non_word = CharSet::perl_class('W', false).unwrap();
        assert!(!non_word.contains('a'));
        assert!(non_word.contains('@'));
    }

    #[test]
    fn samples_prefer_readable_ascii() {
        let mut not_at = CharSet::single('@');
        not_at.negate();
        assert_eq!(not_at.sample(), Some('a'));
        assert_eq!(CharSet::single('@').complement_sample(), Some('!'));
    }

    #[test]
    fn partition_splits_overlap() {
        let a = CharSet::single('a');
        let az = CharSet::range('a', 'z');
        let atoms = partition(&[&a, &az]);
        // {a} and {b..z}.
        assert_eq!(atoms.len(), 2);
        assert!(atoms[0].contains('a'));
        assert!(!atoms[1].contains('a'));
        assert!(atoms[1].contains('b'));
        assert!(atoms[1].contains('z'));
    }

    #[test]
    fn partition_groups_equal_membership() {
        // Disjoint pieces with identical membership collapse to one atom.
        let mut set = CharSet::single('a');
        set.push('x', 'z');
        let atoms = partition(&[&set]);
        assert_eq!(atoms.len(), 1);
        assert!(atoms[0].contains('a'));
        assert!(atoms[0].contains('y'));
    }
}
