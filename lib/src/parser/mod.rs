/*!
Regular expression parser.

A hand-written recursive-descent parser that turns a pattern string and a
set of [`Flags`] into a [`Pattern`] AST. Case folding, class negation and
the dot/anchor flag variants are resolved here, so downstream consumers
never look at the flags again for character semantics.

The accepted surface covers the usual Perl-style syntax: literals and
escapes, bracket classes with ranges, predefined classes (`\d`, `\w`,
`\s`), Unicode classes (`\p{…}`), anchors (`^`, `$`, `\A`, `\Z`, `\b`,
`\B`), alternation, capturing/non-capturing/named groups, greedy and lazy
repetition including `{n,m}` bounds, numeric and named backreferences, and
the four look-around assertions.
*/

pub mod ast;
pub mod charset;

use crate::errors::Error;
use crate::flags::Flags;
use crate::parser::ast::{AnchorKind, Node, Pattern, Span};
use crate::parser::charset::CharSet;

/// Parses `source` into a [`Pattern`].
pub fn parse(source: &str, flags: Flags) -> Result<Pattern, Error> {
    let mut parser = Parser::new(source, flags);
    let root = parser.parse_alternation()?;
    if let Some(c) = parser.peek() {
        // The only way to stop early is an orphan ')'.
        debug_assert_eq!(c, ')');
        return Err(Error::syntax("unbalanced parenthesis", parser.offset()));
    }
    Ok(Pattern { source: source.to_string(), flags, root, captures: parser.captures })
}

struct Parser<'a> {
    source: &'a str,
    /// (byte offset, char) pairs.
    chars: Vec<(usize, char)>,
    pos: usize,
    /// Scope stack for inline flag groups; the last entry is active.
    flags: Vec<Flags>,
    captures: u32,
    names: Vec<(String, u32)>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str, flags: Flags) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
            flags: vec![flags],
            captures: 0,
            names: Vec::new(),
        }
    }

    fn flags(&self) -> Flags {
        *self.flags.last().unwrap()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.chars.get(self.pos + n).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Byte offset of the current position.
    fn offset(&self) -> usize {
        self.chars
            .get(self.pos)
            .map(|&(off, _)| off)
            .unwrap_or(self.source.len())
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(start, self.offset())
    }

    fn err(&self, msg: impl Into<String>) -> Error {
        Error::syntax(msg, self.offset())
    }

    // ---------------------------------------------------------------
    // Grammar
    // ---------------------------------------------------------------

    fn parse_alternation(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        let mut alternatives = vec![self.parse_concat()?];
        while self.eat('|') {
            alternatives.push(self.parse_concat()?);
        }
        if alternatives.len() == 1 {
            Ok(alternatives.pop().unwrap())
        } else {
            Ok(Node::Alt { children: alternatives, span: self.span_from(start) })
        }
    }

    fn parse_concat(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        let mut children = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            children.push(self.parse_repeat()?);
        }
        match children.len() {
            0 => Ok(Node::Empty(self.span_from(start))),
            1 => Ok(children.pop().unwrap()),
            _ => Ok(Node::Concat { children, span: self.span_from(start) }),
        }
    }

    fn parse_repeat(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        let atom = self.parse_atom()?;
        let bounds = match self.peek() {
            Some('?') => {
                self.bump();
                Some((0, Some(1)))
            }
            Some('*') => {
                self.bump();
                Some((0, None))
            }
            Some('+') => {
                self.bump();
                Some((1, None))
            }
            Some('{') => self.try_parse_bounds()?,
            _ => None,
        };

        let Some((min, max)) = bounds else { return Ok(atom) };

        if !quantifiable(&atom) {
            return Err(Error::syntax("nothing to repeat", start));
        }
        if let Some(max) = max {
            if min > max {
                return Err(Error::syntax(
                    "min repeat greater than max repeat",
                    start,
                ));
            }
        }

        let greedy = !self.eat('?');
        if matches!(self.peek(), Some('?' | '*' | '+')) {
            return Err(self.err("multiple repeat"));
        }

        Ok(Node::Repeat {
            child: Box::new(atom),
            min,
            max,
            greedy,
            span: self.span_from(start),
        })
    }

    /// Parses `{n}`, `{n,}` or `{n,m}`. A `{` that does not introduce a
    /// well-formed bound is left in place and later taken as a literal.
    fn try_parse_bounds(&mut self) -> Result<Option<(u32, Option<u32>)>, Error> {
        let save = self.pos;
        debug_assert_eq!(self.peek(), Some('{'));
        self.bump();

        let min = self.parse_decimal();
        let bounds = match (min, self.peek()) {
            (Some(min), Some('}')) => Some((min, Some(min))),
            (Some(min), Some(',')) => {
                self.bump();
                if self.peek() == Some('}') {
                    Some((min, None))
                } else {
                    self.parse_decimal().map(|max| (min, Some(max)))
                }
            }
            _ => None,
        };

        match (bounds, self.peek()) {
            (Some(bounds), Some('}')) => {
                self.bump();
                Ok(Some(bounds))
            }
            _ => {
                self.pos = save;
                Ok(None)
            }
        }
    }

    fn parse_decimal(&mut self) -> Option<u32> {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    }

    fn parse_atom(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        match self.peek() {
            Some('(') => self.parse_group(),
            Some('[') => self.parse_class(),
            Some('.') => {
                self.bump();
                let span = self.span_from(start);
                if self.flags().dot_matches_new_line {
                    Ok(Node::AnyChar { span })
                } else {
                    Ok(Node::Dot { span })
                }
            }
            Some('^') => {
                self.bump();
                let kind = if self.flags().multiline {
                    AnchorKind::LineStart
                } else {
                    AnchorKind::Start
                };
                Ok(Node::Anchor { kind, span: self.span_from(start) })
            }
            Some('$') => {
                self.bump();
                let kind = if self.flags().multiline {
                    AnchorKind::LineEnd
                } else {
                    AnchorKind::End
                };
                Ok(Node::Anchor { kind, span: self.span_from(start) })
            }
            Some('\\') => self.parse_escape(),
            Some('*' | '+' | '?') => {
                Err(Error::syntax("nothing to repeat", start))
            }
            Some(c) => {
                self.bump();
                Ok(self.literal(c, self.span_from(start)))
            }
            None => Err(self.err("unexpected end of pattern")),
        }
    }

    /// A literal character, folded into a class when `ignore_case` gives
    /// it more than one equivalent.
    fn literal(&self, c: char, span: Span) -> Node {
        if self.flags().ignore_case {
            let mut set = CharSet::single(c);
            set.case_fold();
            if set.len() > 1 {
                return Node::Class { set, span };
            }
        }
        Node::Literal { c, span }
    }

    // ---------------------------------------------------------------
    // Groups
    // ---------------------------------------------------------------

    fn parse_group(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        debug_assert_eq!(self.peek(), Some('('));
        self.bump();

        if !self.eat('?') {
            // Plain capturing group.
            self.captures += 1;
            let index = self.captures;
            let child = self.parse_alternation()?;
            self.expect_group_close(start)?;
            return Ok(Node::Group {
                child: Box::new(child),
                index: Some(index),
                name: None,
                span: self.span_from(start),
            });
        }

        match self.peek() {
            Some(':') => {
                self.bump();
                let child = self.parse_alternation()?;
                self.expect_group_close(start)?;
                Ok(Node::Group {
                    child: Box::new(child),
                    index: None,
                    name: None,
                    span: self.span_from(start),
                })
            }
            Some('=') => {
                self.bump();
                self.parse_look(start, false, false)
            }
            Some('!') => {
                self.bump();
                self.parse_look(start, false, true)
            }
            Some('<') => {
                self.bump();
                match self.peek() {
                    Some('=') => {
                        self.bump();
                        self.parse_look(start, true, false)
                    }
                    Some('!') => {
                        self.bump();
                        self.parse_look(start, true, true)
                    }
                    _ => self.parse_named_group(start),
                }
            }
            Some('P') => {
                self.bump();
                match self.peek() {
                    Some('<') => {
                        self.bump();
                        self.parse_named_group(start)
                    }
                    Some('=') => {
                        self.bump();
                        let name = self.parse_group_name()?;
                        self.expect_group_close(start)?;
                        let span = self.span_from(start);
                        self.named_backref(name, span)
                    }
                    _ => Err(self.err("unknown extension ?P")),
                }
            }
            Some(c) if c == '-' || "imsu".contains(c) => {
                self.parse_flags_group(start)
            }
            _ => Err(self.err("unknown group extension")),
        }
    }

    fn parse_look(
        &mut self,
        start: usize,
        behind: bool,
        negated: bool,
    ) -> Result<Node, Error> {
        let child = self.parse_alternation()?;
        self.expect_group_close(start)?;
        Ok(Node::Look {
            child: Box::new(child),
            behind,
            negated,
            span: self.span_from(start),
        })
    }

    fn parse_named_group(&mut self, start: usize) -> Result<Node, Error> {
        let name = self.parse_group_name()?;
        if self.names.iter().any(|(n, _)| *n == name) {
            return Err(Error::syntax(
                format!("redefinition of group name `{name}`"),
                start,
            ));
        }
        self.captures += 1;
        let index = self.captures;
        self.names.push((name.clone(), index));
        let child = self.parse_alternation()?;
        self.expect_group_close(start)?;
        Ok(Node::Group {
            child: Box::new(child),
            index: Some(index),
            name: Some(name),
            span: self.span_from(start),
        })
    }

    fn parse_group_name(&mut self) -> Result<String, Error> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.err("missing group name"));
        }
        if !self.eat('>') && self.peek() != Some(')') {
            return Err(self.err("malformed group name"));
        }
        Ok(name)
    }

    /// `(?imsu)` toggles flags for the rest of the enclosing group;
    /// `(?imsu-imsu:…)` scopes them to the group body.
    fn parse_flags_group(&mut self, start: usize) -> Result<Node, Error> {
        let mut enable = Vec::new();
        let mut disable = Vec::new();
        let mut disabling = false;
        loop {
            match self.peek() {
                Some(c) if "imsu".contains(c) => {
                    self.bump();
                    if disabling {
                        disable.push(c);
                    } else {
                        enable.push(c);
                    }
                }
                Some('-') if !disabling => {
                    self.bump();
                    disabling = true;
                }
                Some(':') | Some(')') => break,
                _ => return Err(self.err("malformed flags group")),
            }
        }

        let mut flags = self.flags();
        for c in enable {
            apply_flag(&mut flags, c, true);
        }
        for c in disable {
            apply_flag(&mut flags, c, false);
        }

        if self.eat(':') {
            self.flags.push(flags);
            let child = self.parse_alternation()?;
            self.flags.pop();
            self.expect_group_close(start)?;
            Ok(Node::Group {
                child: Box::new(child),
                index: None,
                name: None,
                span: self.span_from(start),
            })
        } else {
            self.bump(); // the ')'
            *self.flags.last_mut().unwrap() = flags;
            Ok(Node::Empty(self.span_from(start)))
        }
    }

    fn expect_group_close(&mut self, start: usize) -> Result<(), Error> {
        if !self.eat(')') {
            return Err(Error::syntax("missing ), unterminated group", start));
        }
        Ok(())
    }

    fn named_backref(&self, name: String, span: Span) -> Result<Node, Error> {
        let Some(&(_, index)) =
            self.names.iter().find(|(n, _)| *n == name)
        else {
            return Err(Error::syntax(
                format!("unknown group name `{name}`"),
                span.start,
            ));
        };
        Ok(Node::Backref { index, name: Some(name), span })
    }

    // ---------------------------------------------------------------
    // Escapes and classes
    // ---------------------------------------------------------------

    fn parse_escape(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        debug_assert_eq!(self.peek(), Some('\\'));
        self.bump();
        let Some(c) = self.bump() else {
            return Err(Error::syntax("bad escape (end of pattern)", start));
        };
        let span = self.span_from(start);
        match c {
            'd' | 'D' | 'w' | 'W' | 's' | 'S' => {
                let mut set =
                    CharSet::perl_class(c, self.flags().unicode)?;
                if self.flags().ignore_case {
                    set.case_fold();
                }
                Ok(Node::Class { set, span: self.span_from(start) })
            }
            'b' => Ok(Node::Anchor { kind: AnchorKind::WordBoundary, span }),
            'B' => {
                Ok(Node::Anchor { kind: AnchorKind::NonWordBoundary, span })
            }
            'A' => Ok(Node::Anchor { kind: AnchorKind::TextStart, span }),
            'Z' => Ok(Node::Anchor { kind: AnchorKind::TextEnd, span }),
            '1'..='9' => {
                let index = c.to_digit(10).unwrap();
                if index > self.captures {
                    return Err(Error::syntax(
                        format!("invalid group reference \\{index}"),
                        start,
                    ));
                }
                Ok(Node::Backref { index, name: None, span })
            }
            'g' => {
                if !self.eat('<') {
                    return Err(self.err("missing < after \\g"));
                }
                let name = self.parse_group_name()?;
                let span = self.span_from(start);
                if let Ok(index) = name.parse::<u32>() {
                    if index == 0 || index > self.captures {
                        return Err(Error::syntax(
                            format!("invalid group reference \\g<{index}>"),
                            start,
                        ));
                    }
                    Ok(Node::Backref { index, name: None, span })
                } else {
                    self.named_backref(name, span)
                }
            }
            'p' | 'P' => {
                let negated = c == 'P';
                let name = self.parse_unicode_class_name()?;
                let mut set = CharSet::unicode_class(&name, negated)
                    .map_err(|_| {
                        Error::syntax(
                            format!("unknown unicode class \\p{{{name}}}"),
                            start,
                        )
                    })?;
                if self.flags().ignore_case {
                    set.case_fold();
                }
                Ok(Node::Class { set, span: self.span_from(start) })
            }
            _ => {
                let c = self.escaped_char(c, start)?;
                Ok(self.literal(c, self.span_from(start)))
            }
        }
    }

    fn parse_unicode_class_name(&mut self) -> Result<String, Error> {
        if self.eat('{') {
            let mut name = String::new();
            loop {
                match self.bump() {
                    Some('}') => return Ok(name),
                    Some(c) => name.push(c),
                    None => {
                        return Err(self.err("unterminated unicode class"))
                    }
                }
            }
        }
        // Single-letter form, e.g. `\pL`.
        match self.bump() {
            Some(c) if c.is_ascii_alphabetic() => Ok(c.to_string()),
            _ => Err(self.err("malformed unicode class")),
        }
    }

    /// Resolves a single-character escape (`\n`, `\x41`, `\u{1F600}`, a
    /// quoted metacharacter, …) to its character.
    fn escaped_char(&mut self, c: char, start: usize) -> Result<char, Error> {
        match c {
            'n' => Ok('\n'),
            't' => Ok('\t'),
            'r' => Ok('\r'),
            'f' => Ok('\x0c'),
            'v' => Ok('\x0b'),
            '0' => Ok('\0'),
            'x' => {
                let hi = self.hex_digit(start)?;
                let lo = self.hex_digit(start)?;
                char::from_u32(hi * 16 + lo)
                    .ok_or_else(|| Error::syntax("bad \\x escape", start))
            }
            'u' => {
                if self.eat('{') {
                    let mut value: u32 = 0;
                    let mut digits = 0;
                    loop {
                        match self.peek() {
                            Some('}') => {
                                self.bump();
                                break;
                            }
                            Some(d) if d.is_ascii_hexdigit() => {
                                self.bump();
                                value = value
                                    .saturating_mul(16)
                                    .saturating_add(d.to_digit(16).unwrap());
                                digits += 1;
                            }
                            _ => {
                                return Err(Error::syntax(
                                    "unterminated \\u{…} escape",
                                    start,
                                ))
                            }
                        }
                    }
                    if digits == 0 {
                        return Err(Error::syntax("empty \\u{…} escape", start));
                    }
                    char::from_u32(value)
                        .ok_or_else(|| Error::syntax("bad \\u escape", start))
                } else {
                    let mut value = 0;
                    for _ in 0..4 {
                        value = value * 16 + self.hex_digit(start)?;
                    }
                    char::from_u32(value)
                        .ok_or_else(|| Error::syntax("bad \\u escape", start))
                }
            }
            c if c.is_ascii_alphanumeric() => {
                Err(Error::syntax(format!("bad escape \\{c}"), start))
            }
            c => Ok(c),
        }
    }

    fn hex_digit(&mut self, start: usize) -> Result<u32, Error> {
        match self.bump() {
            Some(c) if c.is_ascii_hexdigit() => Ok(c.to_digit(16).unwrap()),
            _ => Err(Error::syntax("missing hex digit", start)),
        }
    }

    fn parse_class(&mut self) -> Result<Node, Error> {
        let start = self.offset();
        debug_assert_eq!(self.peek(), Some('['));
        self.bump();
        let negated = self.eat('^');

        let mut set = CharSet::empty();
        let mut first = true;
        loop {
            match self.peek() {
                None => {
                    return Err(Error::syntax(
                        "unterminated character set",
                        start,
                    ))
                }
                Some(']') if !first => {
                    self.bump();
                    break;
                }
                _ => {}
            }
            first = false;
            self.parse_class_item(&mut set, start)?;
        }

        if self.flags().ignore_case {
            set.case_fold();
        }
        if negated {
            set.negate();
        }
        Ok(Node::Class { set, span: self.span_from(start) })
    }

    fn parse_class_item(
        &mut self,
        set: &mut CharSet,
        class_start: usize,
    ) -> Result<(), Error> {
        // Nested predefined classes contribute whole sets and cannot form
        // ranges.
        if self.peek() == Some('\\') {
            if let Some(c) = self.peek_at(1) {
                if "dDwWsS".contains(c) {
                    self.pos += 2;
                    set.union(&CharSet::perl_class(
                        c,
                        self.flags().unicode,
                    )?);
                    return Ok(());
                }
                if c == 'p' || c == 'P' {
                    self.pos += 2;
                    let name = self.parse_unicode_class_name()?;
                    set.union(&CharSet::unicode_class(&name, c == 'P')?);
                    return Ok(());
                }
            }
        }

        let lo = self.class_char(class_start)?;
        // A range, unless the '-' is the final character of the class.
        if self.peek() == Some('-') && self.peek_at(1) != Some(']') {
            self.bump();
            let hi = self.class_char(class_start)?;
            if (hi as u32) < (lo as u32) {
                return Err(Error::syntax(
                    "bad character range",
                    class_start,
                ));
            }
            set.push(lo, hi);
        } else {
            set.push(lo, lo);
        }
        Ok(())
    }

    fn class_char(&mut self, class_start: usize) -> Result<char, Error> {
        match self.bump() {
            Some('\\') => {
                let c = self.bump().ok_or_else(|| {
                    Error::syntax("bad escape (end of pattern)", class_start)
                })?;
                // Inside a class `\b` is the backspace character, not a
                // word boundary.
                if c == 'b' {
                    return Ok('\x08');
                }
                self.escaped_char(c, class_start)
            }
            Some(c) => Ok(c),
            None => {
                Err(Error::syntax("unterminated character set", class_start))
            }
        }
    }
}

fn quantifiable(node: &Node) -> bool {
    !matches!(node, Node::Anchor { .. } | Node::Look { .. } | Node::Empty(_))
}

fn apply_flag(flags: &mut Flags, c: char, value: bool) {
    match c {
        'i' => flags.ignore_case = value,
        'm' => flags.multiline = value,
        's' => flags.dot_matches_new_line = value,
        'u' => flags.unicode = value,
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::ast::{AnchorKind, Node};
    use super::parse;
    use crate::errors::Error;
    use crate::flags::Flags;

    fn parse_ok(src: &str) -> Node {
        parse(src, Flags::default()).unwrap().root
    }

    #[test]
    fn literals_and_concat() {
        match parse_ok("ab") {
            Node::Concat { children, .. } => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Node::Literal { c: 'a', .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn quantifier_bounds() {
        match parse_ok("a{2,5}?") {
            Node::Repeat { min, max, greedy, .. } => {
                assert_eq!(min, 2);
                assert_eq!(max, Some(5));
                assert!(!greedy);
            }
            other => panic!("unexpected node: {other:?}"),
        }
        // Malformed bound is a literal brace.
        match parse_ok("a{2,") {
            Node::Concat { children, .. } => assert_eq!(children.len(), 4),
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        assert!(matches!(
            parse("a{3,1}", Flags::default()),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn anchors_respect_multiline() {
        match parse_ok("^a$") {
            Node::Concat { children, .. } => {
                assert!(matches!(
                    children[0],
                    Node::Anchor { kind: AnchorKind::Start, .. }
                ));
                assert!(matches!(
                    children[2],
                    Node::Anchor { kind: AnchorKind::End, .. }
                ));
            }
            other => panic!("unexpected node: {other:?}"),
        }
        let root =
            parse("^a$", Flags::default().multiline(true)).unwrap().root;
        match root {
            Node::Concat { children, .. } => {
                assert!(matches!(
                    children[0],
                    Node::Anchor { kind: AnchorKind::LineStart, .. }
                ));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn classes() {
        match parse_ok("[a-z0]") {
            Node::Class { set, .. } => {
                assert!(set.contains('m'));
                assert!(set.contains('0'));
                assert!(!set.contains('1'));
            }
            other => panic!("unexpected node: {other:?}"),
        }
        match parse_ok("[^@]") {
            Node::Class { set, .. } => {
                assert!(!set.contains('@'));
                assert!(set.contains('a'));
            }
            other => panic!("unexpected node: {other:?}"),
        }
        // ']' allowed in first position.
        match parse_ok("[]a]") {
            Node::Class { set, .. } => {
                assert!(set.contains(']'));
                assert!(set.contains('a'));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn nested_perl_class_in_brackets() {
        match parse_ok(r"[\d_]") {
            Node::Class { set, .. } => {
                assert!(set.contains('3'));
                assert!(set.contains('_'));
                assert!(!set.contains('a'));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn groups_and_captures() {
        let pattern = parse("(a)(?:b)(?P<x>c)", Flags::default()).unwrap();
        assert_eq!(pattern.captures, 2);
        match pattern.root {
            Node::Concat { children, .. } => {
                assert!(matches!(
                    &children[0],
                    Node::Group { index: Some(1), .. }
                ));
                assert!(matches!(&children[1], Node::Group { index: None, .. }));
                match &children[2] {
                    Node::Group { index: Some(2), name: Some(name), .. } => {
                        assert_eq!(name, "x")
                    }
                    other => panic!("unexpected node: {other:?}"),
                }
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn backrefs_must_refer_to_earlier_groups() {
        assert!(parse(r"(a)\1", Flags::default()).is_ok());
        assert!(matches!(
            parse(r"\1(a)", Flags::default()),
            Err(Error::Syntax { .. })
        ));
        assert!(parse(r"(?P<x>a)(?P=x)", Flags::default()).is_ok());
        assert!(parse(r"(?P<x>a)\g<x>", Flags::default()).is_ok());
        assert!(matches!(
            parse(r"(?P=y)(?P<y>a)", Flags::default()),
            Err(Error::Syntax { .. })
        ));
    }

    #[test]
    fn lookaround() {
        match parse_ok("(?=a)") {
            Node::Look { behind: false, negated: false, .. } => {}
            other => panic!("unexpected node: {other:?}"),
        }
        match parse_ok("(?<!a)") {
            Node::Look { behind: true, negated: true, .. } => {}
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn inline_flags() {
        // Scoped group.
        let root = parse_ok("(?i:a)b");
        match root {
            Node::Concat { children, .. } => {
                match &children[0] {
                    Node::Group { child, .. } => {
                        assert!(matches!(**child, Node::Class { .. }))
                    }
                    other => panic!("unexpected node: {other:?}"),
                }
                // 'b' outside the group is unaffected.
                assert!(matches!(children[1], Node::Literal { c: 'b', .. }));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn error_positions_are_byte_offsets() {
        match parse("ab(", Flags::default()) {
            Err(Error::Syntax { pos, .. }) => assert_eq!(pos, 2),
            other => panic!("unexpected result: {other:?}"),
        }
        match parse("a)", Flags::default()) {
            Err(Error::Syntax { msg, pos }) => {
                assert_eq!(pos, 1);
                assert!(msg.contains("unbalanced"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn nothing_to_repeat() {
        for src in ["*a", "^*", "(?=a)*"] {
            assert!(
                matches!(
                    parse(src, Flags::default()),
                    Err(Error::Syntax { .. })
                ),
                "{src}"
            );
        }
    }

    #[test]
    fn ignore_case_folds_literals() {
        let root = parse("a", Flags::default().ignore_case(true))
            .unwrap()
            .root;
        match root {
            Node::Class { set, .. } => {
                assert!(set.contains('A'));
                assert!(set.contains('a'));
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn escapes() {
        assert!(matches!(parse_ok(r"\n"), Node::Literal { c: '\n', .. }));
        assert!(matches!(parse_ok(r"\x41"), Node::Literal { c: 'A', .. }));
        assert!(matches!(
            parse_ok(r"\u{1F600}"),
            Node::Literal { c: '\u{1F600}', .. }
        ));
        assert!(matches!(parse_ok(r"A"), Node::Literal { c: 'A', .. }));
        assert!(matches!(parse_ok(r"\."), Node::Literal { c: '.', .. }));
        assert!(matches!(
            parse(r"\q", Flags::default()),
            Err(Error::Syntax { .. })
        ));
    }
}
