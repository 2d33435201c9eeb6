//! Positional arguments for remote method calls.

use std::fmt::Write as _;

/// A single positional argument, rendered into the deploy term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RhoArg {
    /// The empty process.
    Nil,
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// String literal.
    Str(String),
    /// Byte array, sent as hex and decoded on chain.
    Bytes(Vec<u8>),
    /// Registry URI such as `rho:id:...`.
    Uri(String),
    /// List of arguments.
    List(Vec<RhoArg>),
}

impl RhoArg {
    /// Build an integer argument from an unsigned amount.
    ///
    /// Returns `None` when the amount does not fit the chain's signed integers.
    #[must_use]
    pub fn amount(value: u64) -> Option<Self> {
        i64::try_from(value).ok().map(Self::Int)
    }

    /// The first URI, at any depth, that cannot be written as a Rholang URI
    /// literal.
    #[must_use]
    pub fn invalid_uri(&self) -> Option<&str> {
        match self {
            Self::Uri(uri) if !is_uri_literal(uri) => Some(uri),
            Self::List(items) => items.iter().find_map(Self::invalid_uri),
            _ => None,
        }
    }

    /// Render as Rholang source.
    #[must_use]
    pub fn to_rholang(&self) -> String {
        let mut out = String::new();
        self.render(&mut out);
        out
    }

    fn render(&self, out: &mut String) {
        match self {
            Self::Nil => out.push_str("Nil"),
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Self::Str(s) => push_string_literal(out, s),
            Self::Bytes(bytes) => {
                out.push('"');
                out.push_str(&hex::encode(bytes));
                out.push_str("\".hexToBytes()");
            }
            Self::Uri(uri) => {
                out.push('`');
                out.push_str(uri);
                out.push('`');
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.render(out);
                }
                out.push(']');
            }
        }
    }
}

/// Whether `uri` fits between backquotes in Rholang source.
#[must_use]
pub fn is_uri_literal(uri: &str) -> bool {
    !uri.is_empty() && !uri.chars().any(|c| c == '`' || c.is_whitespace() || c.is_control())
}

fn push_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
}

impl From<&str> for RhoArg {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for RhoArg {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for RhoArg {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for RhoArg {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<u8>> for RhoArg {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}
