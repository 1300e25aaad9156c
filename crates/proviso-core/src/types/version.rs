//! PEP 440 version values.
//!
//! A `Version` is an optional epoch, a dotted release, and optional
//! pre-release, post-release, dev-release and local segments. Parsing accepts
//! the alternate spellings allowed by PEP 440 and normalizes them, so
//! `1.0-Alpha_2` and `1.0a2` produce the same value.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// PEP 440 version (`[N!]N(.N)*[{a|b|rc}N][.postN][.devN][+local]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    epoch: u64,
    release: Vec<u64>,
    pre: Option<PreRelease>,
    post: Option<u64>,
    dev: Option<u64>,
    local: Vec<LocalSegment>,
}

/// Pre-release phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha, // a
    Beta,  // b
    Rc,    // rc
}

/// Pre-release phase and number (`rc2`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PreRelease {
    pub kind: PreKind,
    pub number: u64,
}

/// One dot-separated piece of a local label.
///
/// Text segments sort before numeric ones, so the variant order matters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Text(String),
    Number(u64),
}

/// Version and specifier parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("Invalid version specifier '{input}': {reason}")]
    InvalidSpecifier { input: String, reason: String },
}

impl VersionError {
    pub(crate) fn version(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn specifier(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSpecifier {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Position of the pre-release segment in the sort order.
///
/// A dev-only release (`1.0.dev0`) sorts below every pre-release of the same
/// release, and a final release sorts above them.
#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum PreKey {
    DevOnly,
    Pre(PreRelease),
    Final,
}

impl Version {
    /// Create a final release version from its release segments
    pub fn new(release: impl Into<Vec<u64>>) -> Self {
        let mut release = release.into();
        if release.is_empty() {
            release.push(0);
        }
        Self {
            epoch: 0,
            release,
            pre: None,
            post: None,
            dev: None,
            local: Vec::new(),
        }
    }

    /// Set the epoch
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Set the pre-release segment
    pub fn with_pre(mut self, kind: PreKind, number: u64) -> Self {
        self.pre = Some(PreRelease { kind, number });
        self
    }

    /// Set the post-release segment
    pub fn with_post(mut self, number: u64) -> Self {
        self.post = Some(number);
        self
    }

    /// Set the dev-release segment
    pub fn with_dev(mut self, number: u64) -> Self {
        self.dev = Some(number);
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn pre(&self) -> Option<PreRelease> {
        self.pre
    }

    pub fn post(&self) -> Option<u64> {
        self.post
    }

    pub fn dev(&self) -> Option<u64> {
        self.dev
    }

    pub fn local(&self) -> &[LocalSegment] {
        &self.local
    }

    /// First release segment
    pub fn major(&self) -> u64 {
        self.release_at(0)
    }

    /// Second release segment, zero when absent
    pub fn minor(&self) -> u64 {
        self.release_at(1)
    }

    /// Third release segment, zero when absent
    pub fn micro(&self) -> u64 {
        self.release_at(2)
    }

    /// Release segment at `index`, zero-padded
    pub fn release_at(&self, index: usize) -> u64 {
        self.release.get(index).copied().unwrap_or(0)
    }

    /// Check if this is a pre-release (dev releases count as pre-releases)
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    pub fn is_devrelease(&self) -> bool {
        self.dev.is_some()
    }

    pub fn is_local(&self) -> bool {
        !self.local.is_empty()
    }

    /// The epoch and release only (`1!2.0rc1.post3+abc` becomes `1!2.0`)
    pub fn base(&self) -> Version {
        Version::new(self.release.clone()).with_epoch(self.epoch)
    }

    /// This version with the local label removed
    pub fn without_local(&self) -> Version {
        Version {
            local: Vec::new(),
            ..self.clone()
        }
    }

    /// Compare release segments, padding the shorter one with zeros
    fn release_cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        (0..len)
            .map(|i| self.release_at(i).cmp(&other.release_at(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    fn pre_key(&self) -> PreKey {
        match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => PreKey::DevOnly,
            (Some(pre), _, _) => PreKey::Pre(pre),
            _ => PreKey::Final,
        }
    }

    /// Release segments without trailing zeros, used for hashing
    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|segment| *segment != 0)
            .map_or(0, |i| i + 1);
        &self.release[..end]
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::new(vec![0])
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| self.release_cmp(other))
            .then_with(|| self.pre_key().cmp(&other.pre_key()))
            .then_with(|| self.post.cmp(&other.post))
            // dev: a release without a dev segment sorts last
            .then_with(|| {
                (self.dev.is_none(), self.dev).cmp(&(other.dev.is_none(), other.dev))
            })
            .then_with(|| self.local.cmp(&other.local))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epoch.hash(state);
        self.trimmed_release().hash(state);
        self.pre.hash(state);
        self.post.hash(state);
        self.dev.hash(state);
        self.local.hash(state);
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(VersionError::version(s, "empty version"));
        }

        let mut cursor = Cursor::new(&normalized);
        cursor.eat("v");

        // Epoch and release
        let first = cursor
            .number()
            .ok_or_else(|| VersionError::version(s, "expected a release number"))?
            .map_err(|reason| VersionError::version(s, reason))?;
        let (epoch, first) = if cursor.eat("!") {
            let release_first = cursor
                .number()
                .ok_or_else(|| VersionError::version(s, "expected a release number after epoch"))?
                .map_err(|reason| VersionError::version(s, reason))?;
            (first, release_first)
        } else {
            (0, first)
        };
        let mut release = vec![first];
        while cursor.peek() == Some('.') && cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            cursor.bump();
            if let Some(segment) = cursor.number() {
                release.push(segment.map_err(|reason| VersionError::version(s, reason))?);
            }
        }

        let pre = cursor
            .phase(&[
                ("alpha", PreKind::Alpha),
                ("a", PreKind::Alpha),
                ("beta", PreKind::Beta),
                ("b", PreKind::Beta),
                ("preview", PreKind::Rc),
                ("pre", PreKind::Rc),
                ("rc", PreKind::Rc),
                ("c", PreKind::Rc),
            ])
            .map(|(kind, number)| {
                number
                    .map(|number| PreRelease { kind, number })
                    .map_err(|reason| VersionError::version(s, reason))
            })
            .transpose()?;

        let post = if cursor.peek() == Some('-')
            && cursor.peek_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            // Implicit post-release: `1.0-1`
            cursor.bump();
            match cursor.number() {
                Some(number) => Some(number.map_err(|reason| VersionError::version(s, reason))?),
                None => None,
            }
        } else {
            cursor
                .phase(&[("post", ()), ("rev", ()), ("r", ())])
                .map(|(_, number)| number.map_err(|reason| VersionError::version(s, reason)))
                .transpose()?
        };

        let dev = cursor
            .phase(&[("dev", ())])
            .map(|(_, number)| number.map_err(|reason| VersionError::version(s, reason)))
            .transpose()?;

        let local = if cursor.eat("+") {
            parse_local(cursor.rest()).map_err(|reason| VersionError::version(s, reason))?
        } else {
            if !cursor.rest().is_empty() {
                return Err(VersionError::version(
                    s,
                    format!("unexpected trailing text '{}'", cursor.rest()),
                ));
            }
            Vec::new()
        };

        Ok(Version {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

fn parse_local(text: &str) -> Result<Vec<LocalSegment>, String> {
    if text.is_empty() {
        return Err("empty local label".to_string());
    }
    text.split(['.', '-', '_'])
        .map(|segment| {
            if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(format!("invalid local segment '{}'", segment));
            }
            if segment.chars().all(|c| c.is_ascii_digit()) {
                segment
                    .parse()
                    .map(LocalSegment::Number)
                    .map_err(|_| format!("local segment '{}' is too large", segment))
            } else {
                Ok(LocalSegment::Text(segment.to_string()))
            }
        })
        .collect()
}

/// Byte cursor over a lower-cased version string
struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn eat_separator(&mut self) -> bool {
        if matches!(self.peek(), Some('.' | '-' | '_')) {
            self.bump();
            true
        } else {
            false
        }
    }

    /// Parse a run of digits; `None` when there are none
    fn number(&mut self) -> Option<Result<u64, String>> {
        let digits: &str = {
            let rest = self.rest();
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            &rest[..end]
        };
        if digits.is_empty() {
            return None;
        }
        self.pos += digits.len();
        Some(
            digits
                .parse()
                .map_err(|_| format!("number '{}' is too large", digits)),
        )
    }

    /// Parse `[sep]word[sep][N]` for one of `words`, restoring the position
    /// when none matches. A missing number means zero.
    fn phase<T: Copy>(&mut self, words: &[(&str, T)]) -> Option<(T, Result<u64, String>)> {
        let start = self.pos;
        self.eat_separator();

        let Some(value) = words
            .iter()
            .find(|(word, _)| self.rest().starts_with(word))
            .map(|(word, value)| {
                self.pos += word.len();
                *value
            })
        else {
            self.pos = start;
            return None;
        };

        let before_number = self.pos;
        self.eat_separator();
        match self.number() {
            Some(number) => Some((value, number)),
            None => {
                self.pos = before_number;
                Some((value, Ok(0)))
            },
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(u64::to_string).collect();
        write!(f, "{}", release.join("."))?;
        if let Some(pre) = self.pre {
            write!(f, "{}", pre)?;
        }
        if let Some(post) = self.post {
            write!(f, ".post{}", post)?;
        }
        if let Some(dev) = self.dev {
            write!(f, ".dev{}", dev)?;
        }
        if !self.local.is_empty() {
            let local: Vec<String> = self.local.iter().map(LocalSegment::to_string).collect();
            write!(f, "+{}", local.join("."))?;
        }
        Ok(())
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.kind {
            PreKind::Alpha => "a",
            PreKind::Beta => "b",
            PreKind::Rc => "rc",
        };
        write!(f, "{}{}", phase, self.number)
    }
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSegment::Text(text) => f.write_str(text),
            LocalSegment::Number(number) => write!(f, "{}", number),
        }
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}
