//! Relationship fields (`Depends`, `Breaks`, `Built-Using`, ...).
//!
//! A field is a comma-separated list of relations, each relation a
//! `|`-separated list of alternatives:
//!
//! ```text
//! libc6 (>= 2.34), libssl3 | libssl1.1, python3:any, foo [amd64] <!nocheck>
//! ```

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::version::Version;

/// Parse failure with the byte offset it was detected at.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid relationship at offset {position}: {message}")]
pub struct DependencyError {
    /// Byte offset into the parsed text.
    pub position: usize,
    /// What was expected.
    pub message: String,
}

/// Version comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<<`
    Earlier,
    /// `<=` (also the deprecated `<`)
    EarlierOrEqual,
    /// `=`
    Exactly,
    /// `>=` (also the deprecated `>`)
    LaterOrEqual,
    /// `>>`
    Later,
}

impl Operator {
    /// Canonical spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Earlier => "<<",
            Self::EarlierOrEqual => "<=",
            Self::Exactly => "=",
            Self::LaterOrEqual => ">=",
            Self::Later => ">>",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(op version)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConstraint {
    /// Comparison operator.
    pub operator: Operator,
    /// Right-hand side.
    pub version: Version,
}

impl VersionConstraint {
    /// Whether `candidate` satisfies the constraint.
    pub fn matches(&self, candidate: &Version) -> bool {
        let ord = candidate.cmp(&self.version);
        match self.operator {
            Operator::Earlier => ord.is_lt(),
            Operator::EarlierOrEqual => ord.is_le(),
            Operator::Exactly => ord.is_eq(),
            Operator::LaterOrEqual => ord.is_ge(),
            Operator::Later => ord.is_gt(),
        }
    }
}

/// `[amd64 arm64]` or `[!i386 !armel]`. Debian forbids mixing the two forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchRestriction {
    /// All entries carried a `!`.
    pub negated: bool,
    /// Architecture names without the `!`.
    pub arches: Vec<String>,
}

/// One term of a `<...>` build-profile group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTerm {
    /// Written with a leading `!`.
    pub negated: bool,
    /// Profile name.
    pub name: String,
}

/// A single alternative inside a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Possibility {
    /// Package name.
    pub name: String,
    /// Qualifier after `:` (`any`, `native`, an architecture).
    pub arch_qualifier: Option<String>,
    /// Optional version constraint.
    pub version: Option<VersionConstraint>,
    /// Optional architecture restriction.
    pub architectures: Option<ArchRestriction>,
    /// Build-profile groups; the possibility applies if any group matches.
    pub profiles: Vec<Vec<ProfileTerm>>,
}

/// Alternatives joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// At least one alternative.
    pub alternatives: Vec<Possibility>,
}

/// A whole relationship field. Empty when the field is absent or blank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// Relations joined by `,`.
    pub relations: Vec<Relation>,
}

impl Dependency {
    /// Parse a relationship field.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] pointing at the first malformed token.
    pub fn parse(text: &str) -> Result<Self, DependencyError> {
        let mut parser = Parser { src: text, pos: 0 };
        let mut relations = Vec::new();

        parser.skip_ws();
        while !parser.at_end() {
            relations.push(parser.relation()?);
            parser.skip_ws();
            match parser.peek() {
                None => break,
                Some(',') => {
                    parser.bump();
                    parser.skip_ws();
                }
                Some(c) => return Err(parser.error(format!("unexpected {c:?}"))),
            }
        }
        Ok(Self { relations })
    }

    /// Whether no relations are present.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Iterate relations in field order.
    pub fn iter(&self) -> std::slice::Iter<'_, Relation> {
        self.relations.iter()
    }
}

impl<'a> IntoIterator for &'a Dependency {
    type Item = &'a Relation;
    type IntoIter = std::slice::Iter<'a, Relation>;

    fn into_iter(self) -> Self::IntoIter {
        self.relations.iter()
    }
}

impl FromStr for Dependency {
    type Err = DependencyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_')
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !f(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    fn error(&self, message: impl Into<String>) -> DependencyError {
        DependencyError {
            position: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, c: char) -> Result<(), DependencyError> {
        if self.peek() == Some(c) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(format!("expected {c:?}")))
        }
    }

    fn relation(&mut self) -> Result<Relation, DependencyError> {
        let mut alternatives = vec![self.possibility()?];
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                break;
            }
            self.bump();
            alternatives.push(self.possibility()?);
        }
        Ok(Relation { alternatives })
    }

    fn possibility(&mut self) -> Result<Possibility, DependencyError> {
        self.skip_ws();
        let name = self.take_while(is_name_char);
        if name.is_empty() {
            return Err(self.error("expected package name"));
        }

        let mut arch_qualifier = None;
        if self.peek() == Some(':') {
            self.bump();
            let qualifier = self.take_while(is_name_char);
            if qualifier.is_empty() {
                return Err(self.error("expected architecture qualifier after ':'"));
            }
            arch_qualifier = Some(qualifier.to_string());
        }

        self.skip_ws();
        let version = if self.peek() == Some('(') {
            self.bump();
            Some(self.constraint()?)
        } else {
            None
        };

        self.skip_ws();
        let architectures = if self.peek() == Some('[') {
            self.bump();
            Some(self.restriction()?)
        } else {
            None
        };

        let mut profiles = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some('<') {
                break;
            }
            self.bump();
            profiles.push(self.profile_group()?);
        }

        Ok(Possibility {
            name: name.to_string(),
            arch_qualifier,
            version,
            architectures,
            profiles,
        })
    }

    fn operator(&mut self) -> Result<Operator, DependencyError> {
        let rest = &self.src[self.pos..];
        let (operator, len) = if rest.starts_with("<<") {
            (Operator::Earlier, 2)
        } else if rest.starts_with("<=") {
            (Operator::EarlierOrEqual, 2)
        } else if rest.starts_with(">>") {
            (Operator::Later, 2)
        } else if rest.starts_with(">=") {
            (Operator::LaterOrEqual, 2)
        } else if rest.starts_with('=') {
            (Operator::Exactly, 1)
        } else if rest.starts_with('<') {
            (Operator::EarlierOrEqual, 1)
        } else if rest.starts_with('>') {
            (Operator::LaterOrEqual, 1)
        } else {
            return Err(self.error("expected version operator"));
        };
        self.pos += len;
        Ok(operator)
    }

    fn constraint(&mut self) -> Result<VersionConstraint, DependencyError> {
        self.skip_ws();
        let operator = self.operator()?;
        self.skip_ws();
        let start = self.pos;
        let raw = self.take_while(|c| !c.is_whitespace() && c != ')');
        if raw.is_empty() {
            return Err(self.error("expected version"));
        }
        let version = Version::parse(raw).map_err(|e| DependencyError {
            position: start,
            message: e.to_string(),
        })?;
        self.skip_ws();
        self.expect(')')?;
        Ok(VersionConstraint { operator, version })
    }

    fn restriction(&mut self) -> Result<ArchRestriction, DependencyError> {
        let mut negated = None;
        let mut arches = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.bump();
                break;
            }
            let neg = self.peek() == Some('!');
            if neg {
                self.bump();
            }
            let arch = self.take_while(is_name_char);
            if arch.is_empty() {
                return Err(self.error("expected architecture name"));
            }
            if *negated.get_or_insert(neg) != neg {
                return Err(self.error("cannot mix negated and plain architectures"));
            }
            arches.push(arch.to_string());
        }
        match negated {
            Some(negated) => Ok(ArchRestriction { negated, arches }),
            None => Err(self.error("empty architecture list")),
        }
    }

    fn profile_group(&mut self) -> Result<Vec<ProfileTerm>, DependencyError> {
        let mut terms = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('>') {
                self.bump();
                break;
            }
            let negated = self.peek() == Some('!');
            if negated {
                self.bump();
            }
            let name = self.take_while(is_name_char);
            if name.is_empty() {
                return Err(self.error("expected build profile"));
            }
            terms.push(ProfileTerm {
                negated,
                name: name.to_string(),
            });
        }
        if terms.is_empty() {
            return Err(self.error("empty build profile group"));
        }
        Ok(terms)
    }
}

impl fmt::Display for Possibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(q) = &self.arch_qualifier {
            write!(f, ":{q}")?;
        }
        if let Some(c) = &self.version {
            write!(f, " ({} {})", c.operator, c.version)?;
        }
        if let Some(r) = &self.architectures {
            let bang = if r.negated { "!" } else { "" };
            let list: Vec<String> = r.arches.iter().map(|a| format!("{bang}{a}")).collect();
            write!(f, " [{}]", list.join(" "))?;
        }
        for group in &self.profiles {
            let terms: Vec<String> = group
                .iter()
                .map(|t| format!("{}{}", if t.negated { "!" } else { "" }, t.name))
                .collect();
            write!(f, " <{}>", terms.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, alt) in self.alternatives.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{alt}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rel) in self.relations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{rel}")?;
        }
        Ok(())
    }
}
