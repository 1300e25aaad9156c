//! PEP 508 environment markers.
//!
//! Markers are boolean expressions over environment variables, used to make
//! a dependency edge conditional (`python_version < "3.8"`) or optional
//! (`extra == "socks"`). Parsing is a small recursive descent where `and`
//! binds tighter than `or`.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::environment::Environment;
use super::name::canonicalize;
use super::specifier::VersionSpecifier;
use super::version::Version;

/// Marker parsing error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid marker '{input}': {reason}")]
pub struct MarkerError {
    pub input: String,
    pub reason: String,
}

/// Variables a marker may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerVariable {
    PythonVersion,
    PythonFullVersion,
    OsName,
    SysPlatform,
    PlatformRelease,
    PlatformSystem,
    PlatformVersion,
    PlatformMachine,
    PlatformPythonImplementation,
    ImplementationName,
    ImplementationVersion,
    Extra,
}

impl MarkerVariable {
    /// Look up a variable by name, accepting the legacy dotted spellings
    pub fn from_name(name: &str) -> Option<Self> {
        let variable = match name {
            "python_version" => Self::PythonVersion,
            "python_full_version" => Self::PythonFullVersion,
            "os_name" | "os.name" => Self::OsName,
            "sys_platform" | "sys.platform" => Self::SysPlatform,
            "platform_release" => Self::PlatformRelease,
            "platform_system" => Self::PlatformSystem,
            "platform_version" | "platform.version" => Self::PlatformVersion,
            "platform_machine" | "platform.machine" => Self::PlatformMachine,
            "platform_python_implementation"
            | "platform.python_implementation"
            | "python_implementation" => Self::PlatformPythonImplementation,
            "implementation_name" => Self::ImplementationName,
            "implementation_version" => Self::ImplementationVersion,
            "extra" => Self::Extra,
            _ => return None,
        };
        Some(variable)
    }

    /// Canonical variable name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PythonVersion => "python_version",
            Self::PythonFullVersion => "python_full_version",
            Self::OsName => "os_name",
            Self::SysPlatform => "sys_platform",
            Self::PlatformRelease => "platform_release",
            Self::PlatformSystem => "platform_system",
            Self::PlatformVersion => "platform_version",
            Self::PlatformMachine => "platform_machine",
            Self::PlatformPythonImplementation => "platform_python_implementation",
            Self::ImplementationName => "implementation_name",
            Self::ImplementationVersion => "implementation_version",
            Self::Extra => "extra",
        }
    }
}

/// Operand of a comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerValue {
    Variable(MarkerVariable),
    Literal(String),
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    Compatible,
    ArbitraryEqual,
    In,
    NotIn,
}

impl MarkerOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::LessThan => "<",
            Self::LessThanEqual => "<=",
            Self::GreaterThan => ">",
            Self::GreaterThanEqual => ">=",
            Self::Compatible => "~=",
            Self::ArbitraryEqual => "===",
            Self::In => "in",
            Self::NotIn => "not in",
        }
    }
}

/// A single `lhs op rhs` comparison
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MarkerExpression {
    pub lhs: MarkerValue,
    pub operator: MarkerOperator,
    pub rhs: MarkerValue,
}

/// Boolean combination of marker expressions
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerTree {
    Expression(MarkerExpression),
    And(Vec<MarkerTree>),
    Or(Vec<MarkerTree>),
}

/// How clauses on `extra` are decided
#[derive(Clone, Copy)]
enum ExtraMode<'a> {
    /// Compare against this (possibly empty) extra
    Value(&'a str),
    /// Treat every `extra` clause as satisfied
    Ignore,
}

impl MarkerTree {
    /// Evaluate with `extra` set to the empty string
    pub fn evaluate(&self, env: &Environment) -> bool {
        self.eval(Some(env), ExtraMode::Value(""))
    }

    /// Evaluate with `extra` set to `extra`
    pub fn evaluate_with_extra(&self, env: &Environment, extra: &str) -> bool {
        self.eval(Some(env), ExtraMode::Value(extra))
    }

    /// Evaluate treating every clause on `extra` as satisfied.
    ///
    /// Used for top-level requirements, which were already selected for the
    /// activated extras before resolution.
    pub fn evaluate_ignoring_extra(&self, env: &Environment) -> bool {
        self.eval(Some(env), ExtraMode::Ignore)
    }

    /// Evaluate only the clauses on `extra`, treating every environment
    /// clause as satisfied
    pub fn holds_for_extra(&self, extra: &str) -> bool {
        self.eval(None, ExtraMode::Value(extra))
    }

    /// Check if any clause compares `extra`
    pub fn references_extra(&self) -> bool {
        match self {
            MarkerTree::Expression(expression) => expression.references_extra(),
            MarkerTree::And(children) | MarkerTree::Or(children) => {
                children.iter().any(MarkerTree::references_extra)
            },
        }
    }

    /// Extras compared with `==` anywhere in this marker, normalized
    pub fn extra_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_extras(&mut names);
        names.sort();
        names.dedup();
        names
    }

    fn collect_extras(&self, names: &mut Vec<String>) {
        match self {
            MarkerTree::Expression(expression) => {
                if expression.operator != MarkerOperator::Equal {
                    return;
                }
                match (&expression.lhs, &expression.rhs) {
                    (MarkerValue::Variable(MarkerVariable::Extra), MarkerValue::Literal(value))
                    | (MarkerValue::Literal(value), MarkerValue::Variable(MarkerVariable::Extra)) => {
                        names.push(canonicalize(value))
                    },
                    _ => {},
                }
            },
            MarkerTree::And(children) | MarkerTree::Or(children) => {
                children.iter().for_each(|child| child.collect_extras(names))
            },
        }
    }

    fn eval(&self, env: Option<&Environment>, extra: ExtraMode<'_>) -> bool {
        match self {
            MarkerTree::Expression(expression) => expression.eval(env, extra),
            MarkerTree::And(children) => children.iter().all(|child| child.eval(env, extra)),
            MarkerTree::Or(children) => children.iter().any(|child| child.eval(env, extra)),
        }
    }
}

impl MarkerExpression {
    fn references_extra(&self) -> bool {
        matches!(self.lhs, MarkerValue::Variable(MarkerVariable::Extra))
            || matches!(self.rhs, MarkerValue::Variable(MarkerVariable::Extra))
    }

    fn eval(&self, env: Option<&Environment>, extra: ExtraMode<'_>) -> bool {
        if self.references_extra() {
            let ExtraMode::Value(active) = extra else {
                return true;
            };
            let lhs = self.resolve_extra(&self.lhs, active);
            let rhs = self.resolve_extra(&self.rhs, active);
            return compare(&lhs, self.operator, &rhs);
        }

        let Some(env) = env else {
            return true;
        };
        let lhs = resolve(&self.lhs, env);
        let rhs = resolve(&self.rhs, env);
        compare(lhs, self.operator, rhs)
    }

    fn resolve_extra(&self, value: &MarkerValue, active: &str) -> String {
        match value {
            MarkerValue::Variable(_) => canonicalize(active),
            MarkerValue::Literal(literal) => canonicalize(literal),
        }
    }
}

fn resolve<'a>(value: &'a MarkerValue, env: &'a Environment) -> &'a str {
    match value {
        MarkerValue::Variable(variable) => env.get(variable.as_str()),
        MarkerValue::Literal(literal) => literal,
    }
}

/// Compare as versions when both sides parse, otherwise as strings
fn compare(lhs: &str, operator: MarkerOperator, rhs: &str) -> bool {
    let membership = matches!(operator, MarkerOperator::In | MarkerOperator::NotIn);
    if let (false, Ok(version)) = (membership, lhs.parse::<Version>()) {
        let clause = format!("{}{}", operator.as_str(), rhs);
        if let Ok(specifier) = clause.parse::<VersionSpecifier>() {
            return specifier.contains(&version);
        }
    }

    match operator {
        MarkerOperator::Equal | MarkerOperator::ArbitraryEqual => lhs == rhs,
        MarkerOperator::NotEqual => lhs != rhs,
        MarkerOperator::LessThan => lhs < rhs,
        MarkerOperator::LessThanEqual => lhs <= rhs,
        MarkerOperator::GreaterThan => lhs > rhs,
        MarkerOperator::GreaterThanEqual => lhs >= rhs,
        // `~=` has no string meaning
        MarkerOperator::Compatible => false,
        MarkerOperator::In => rhs.contains(lhs),
        MarkerOperator::NotIn => !rhs.contains(lhs),
    }
}

impl FromStr for MarkerTree {
    type Err = MarkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: String| MarkerError {
            input: s.to_string(),
            reason,
        };
        let tokens = tokenize(s).map_err(error)?;
        let mut parser = Parser { tokens, pos: 0 };
        let tree = parser.or_expr().map_err(error)?;
        if let Some(token) = parser.tokens.get(parser.pos) {
            return Err(error(format!("unexpected {}", token)));
        }
        Ok(tree)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Ident(String),
    Str(String),
    Op(MarkerOperator),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Ident(ident) => write!(f, "'{}'", ident),
            Token::Str(value) => write!(f, "string {:?}", value),
            Token::Op(operator) => write!(f, "operator '{}'", operator.as_str()),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            },
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            },
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            },
            '\'' | '"' => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == c {
                        closed = true;
                        break;
                    }
                    value.push(next);
                }
                if !closed {
                    return Err(format!("unterminated string starting at {}", start));
                }
                tokens.push(Token::Str(value));
            },
            '=' | '!' | '<' | '>' | '~' => {
                let rest = &input[start..];
                let (text, operator) = [
                    ("===", MarkerOperator::ArbitraryEqual),
                    ("==", MarkerOperator::Equal),
                    ("!=", MarkerOperator::NotEqual),
                    ("<=", MarkerOperator::LessThanEqual),
                    (">=", MarkerOperator::GreaterThanEqual),
                    ("~=", MarkerOperator::Compatible),
                    ("<", MarkerOperator::LessThan),
                    (">", MarkerOperator::GreaterThan),
                ]
                .into_iter()
                .find(|(text, _)| rest.starts_with(text))
                .ok_or_else(|| format!("invalid operator at {}", start))?;
                for _ in 0..text.len() {
                    chars.next();
                }
                tokens.push(Token::Op(operator));
            },
            c if c.is_ascii_alphanumeric() || c == '_' || c == '.' => {
                let mut ident = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' || next == '.' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            },
            other => return Err(format!("unexpected character '{}' at {}", other, start)),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(ident)) if ident == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<MarkerTree, String> {
        let mut children = vec![self.and_expr()?];
        while self.eat_keyword("or") {
            children.push(self.and_expr()?);
        }
        Ok(flatten(children, MarkerTree::Or))
    }

    fn and_expr(&mut self) -> Result<MarkerTree, String> {
        let mut children = vec![self.atom()?];
        while self.eat_keyword("and") {
            children.push(self.atom()?);
        }
        Ok(flatten(children, MarkerTree::And))
    }

    fn atom(&mut self) -> Result<MarkerTree, String> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let tree = self.or_expr()?;
            return match self.next() {
                Some(Token::RParen) => Ok(tree),
                Some(token) => Err(format!("expected ')', found {}", token)),
                None => Err("expected ')', found end of input".to_string()),
            };
        }

        let lhs = self.value()?;
        let operator = self.operator()?;
        let rhs = self.value()?;

        if matches!(
            (&lhs, &rhs),
            (MarkerValue::Variable(_), MarkerValue::Variable(_))
        ) {
            return Err("comparison between two variables".to_string());
        }

        Ok(MarkerTree::Expression(MarkerExpression { lhs, operator, rhs }))
    }

    fn value(&mut self) -> Result<MarkerValue, String> {
        match self.next() {
            Some(Token::Str(value)) => Ok(MarkerValue::Literal(value)),
            Some(Token::Ident(ident)) => MarkerVariable::from_name(&ident)
                .map(MarkerValue::Variable)
                .ok_or_else(|| format!("unknown marker variable '{}'", ident)),
            Some(token) => Err(format!("expected a variable or string, found {}", token)),
            None => Err("expected a variable or string, found end of input".to_string()),
        }
    }

    fn operator(&mut self) -> Result<MarkerOperator, String> {
        match self.next() {
            Some(Token::Op(operator)) => Ok(operator),
            Some(Token::Ident(ident)) if ident == "in" => Ok(MarkerOperator::In),
            Some(Token::Ident(ident)) if ident == "not" => {
                if self.eat_keyword("in") {
                    Ok(MarkerOperator::NotIn)
                } else {
                    Err("expected 'in' after 'not'".to_string())
                }
            },
            Some(token) => Err(format!("expected an operator, found {}", token)),
            None => Err("expected an operator, found end of input".to_string()),
        }
    }
}

fn flatten(mut children: Vec<MarkerTree>, combine: fn(Vec<MarkerTree>) -> MarkerTree) -> MarkerTree {
    if children.len() == 1 {
        children.remove(0)
    } else {
        combine(children)
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Variable(variable) => f.write_str(variable.as_str()),
            MarkerValue::Literal(value) if value.contains('"') => write!(f, "'{}'", value),
            MarkerValue::Literal(value) => write!(f, "\"{}\"", value),
        }
    }
}

impl fmt::Display for MarkerExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.operator.as_str(), self.rhs)
    }
}

impl fmt::Display for MarkerTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerTree::Expression(expression) => write!(f, "{}", expression),
            MarkerTree::And(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| match child {
                        MarkerTree::Or(_) => format!("({})", child),
                        _ => child.to_string(),
                    })
                    .collect();
                f.write_str(&parts.join(" and "))
            },
            MarkerTree::Or(children) => {
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                f.write_str(&parts.join(" or "))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(s: &str) -> MarkerTree {
        s.parse().unwrap()
    }

    fn env() -> Environment {
        Environment::new(
            "3.10",
            [
                ("python_version", "3.10"),
                ("python_full_version", "3.10.4"),
                ("sys_platform", "linux"),
                ("os_name", "posix"),
                ("platform_machine", "x86_64"),
                ("implementation_name", "cpython"),
            ],
        )
    }

    #[test]
    fn test_version_comparison() {
        assert!(marker("python_version >= '3.8'").evaluate(&env()));
        assert!(!marker("python_version < '3.8'").evaluate(&env()));
        // 3.10 is newer than 3.9 as a version, though not as a string
        assert!(marker("python_version > \"3.9\"").evaluate(&env()));
        assert!(marker("python_full_version ~= '3.10.0'").evaluate(&env()));
        assert!(marker("python_version == '3.*'").evaluate(&env()));
    }

    #[test]
    fn test_variable_on_right_hand_side() {
        assert!(marker("'3.8' <= python_version").evaluate(&env()));
        assert!(marker("'linux' == sys_platform").evaluate(&env()));
    }

    #[test]
    fn test_string_comparison() {
        assert!(marker("sys_platform == 'linux'").evaluate(&env()));
        assert!(marker("sys_platform != 'win32'").evaluate(&env()));
        assert!(marker("'linux' in sys_platform").evaluate(&env()));
        assert!(marker("'arm' not in platform_machine").evaluate(&env()));
    }

    #[test]
    fn test_precedence_and_parentheses() {
        // and binds tighter than or
        assert!(marker("os_name == 'nt' and sys_platform == 'win32' or python_version >= '3'")
            .evaluate(&env()));
        assert!(!marker("os_name == 'nt' and (sys_platform == 'win32' or python_version >= '3')")
            .evaluate(&env()));
    }

    #[test]
    fn test_extra_modes() {
        let tree = marker("extra == 'Socks_Proxy' and python_version >= '3.8'");
        assert!(!tree.evaluate(&env()));
        assert!(tree.evaluate_with_extra(&env(), "socks-proxy"));
        assert!(!tree.evaluate_with_extra(&env(), "security"));
        assert!(tree.evaluate_ignoring_extra(&env()));

        let old_python = marker("extra == 'socks' and python_version < '3.8'");
        assert!(!old_python.evaluate_ignoring_extra(&env()));
        assert!(old_python.holds_for_extra("socks"));
        assert!(!old_python.holds_for_extra("other"));
    }

    #[test]
    fn test_legacy_names_and_missing_values() {
        assert!(marker("os.name == 'posix'").evaluate(&env()));
        // platform_release is absent from the environment and reads as ""
        assert!(marker("platform_release == ''").evaluate(&env()));
    }

    #[test]
    fn test_invalid_markers() {
        for input in [
            "",
            "python_version",
            "python_version >=",
            "unknown_var == '1'",
            "python_version == '3.8' and",
            "(python_version == '3.8'",
            "python_version == '3.8')",
            "python_version == 'unterminated",
            "python_version not '3'",
            "python_version == sys_platform",
        ] {
            assert!(input.parse::<MarkerTree>().is_err(), "{:?} should fail", input);
        }
    }

    #[test]
    fn test_references_extra() {
        assert!(marker("python_version < '3' or extra == 'a'").references_extra());
        assert!(!marker("python_version < '3'").references_extra());
        assert_eq!(
            marker("extra == 'B_x' or extra == 'a' or extra == 'a'").extra_names(),
            vec!["a".to_string(), "b-x".to_string()]
        );
    }

    #[test]
    fn test_display_round_trip() {
        let tree = marker("python_version>='3.8' and (sys_platform=='linux' or os_name=='nt')");
        assert_eq!(
            tree.to_string(),
            "python_version >= \"3.8\" and (sys_platform == \"linux\" or os_name == \"nt\")"
        );
        assert_eq!(marker(&tree.to_string()), tree);
    }
}
