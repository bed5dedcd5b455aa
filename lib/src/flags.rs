use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Match flags for a regular expression.
///
/// Flags are fixed at parse time. `ignore_case` is baked into character
/// class predicates while parsing, `dot_matches_new_line` widens the dot,
/// and `multiline` changes the meaning of the `^` and `$` anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    /// Case-insensitive matching (`i`).
    pub ignore_case: bool,
    /// `^` and `$` match at line boundaries (`m`).
    pub multiline: bool,
    /// The dot matches line terminators too (`s`).
    pub dot_matches_new_line: bool,
    /// Unicode mode (`u`). Enabled by default.
    pub unicode: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            ignore_case: false,
            multiline: false,
            dot_matches_new_line: false,
            unicode: true,
        }
    }
}

impl Flags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_case(mut self, yes: bool) -> Self {
        self.ignore_case = yes;
        self
    }

    pub fn multiline(mut self, yes: bool) -> Self {
        self.multiline = yes;
        self
    }

    pub fn dot_matches_new_line(mut self, yes: bool) -> Self {
        self.dot_matches_new_line = yes;
        self
    }

    pub fn unicode(mut self, yes: bool) -> Self {
        self.unicode = yes;
        self
    }

    /// Parses a compact flag string like `"ims"`. Unknown letters are
    /// reported back as an error.
    pub fn parse(s: &str) -> Result<Self, char> {
        let mut flags = Self { unicode: false, ..Self::default() };
        for c in s.chars() {
            match c {
                'i' => flags.ignore_case = true,
                'm' => flags.multiline = true,
                's' => flags.dot_matches_new_line = true,
                'u' => flags.unicode = true,
                other => return Err(other),
            }
        }
        Ok(flags)
    }
}

impl Display for Flags {
    /// Renders the flags in the compact `imsu` form used by diagnostics.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.ignore_case {
            write!(f, "i")?;
        }
        if self.multiline {
            write!(f, "m")?;
        }
        if self.dot_matches_new_line {
            write!(f, "s")?;
        }
        if self.unicode {
            write!(f, "u")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Flags;

    #[test]
    fn flag_string_round_trip() {
        let flags = Flags::parse("imsu").unwrap();
        assert!(flags.ignore_case);
        assert!(flags.multiline);
        assert!(flags.dot_matches_new_line);
        assert!(flags.unicode);
        assert_eq!(flags.to_string(), "imsu");

        let flags = Flags::parse("").unwrap();
        assert_eq!(flags.to_string(), "");

        assert_eq!(Flags::parse("x"), Err('x'));
    }

    #[test]
    fn unicode_is_on_by_default() {
        assert!(Flags::default().unicode);
        assert_eq!(Flags::default().to_string(), "u");
    }
}
