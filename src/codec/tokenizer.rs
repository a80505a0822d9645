//! Regex-driven line tokenizer for the model Markdown dialect.
//!
//! The tokenizer applies an ordered table of `(pattern, replacement)` regex
//! substitutions to every line, rewriting heading and list markup into literal
//! token-kind prefixes (`### Name` becomes `OBJECT Name`). Each rewritten line
//! is then split into a `(TokenKind, content)` pair; a line with no recognized
//! prefix becomes a `DESCRIPTION` token carrying the raw line. Malformed
//! declarations are not rejected here: detection is deferred to the validator
//! and the parser.

use std::{fmt, str::FromStr};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Token vocabulary of the model dialect.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum TokenKind {
    Module,
    Object,
    Attribute,
    Type,
    Option,
    Required,
    Multiple,
    Enum,
    Mapping,
    Parent,
    Description,
    Reference,
    EndOfModel,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Module => "MODULE",
            TokenKind::Object => "OBJECT",
            TokenKind::Attribute => "ATTRIBUTE",
            TokenKind::Type => "TYPE",
            TokenKind::Option => "OPTION",
            TokenKind::Required => "REQUIRED",
            TokenKind::Multiple => "MULTIPLE",
            TokenKind::Enum => "ENUM",
            TokenKind::Mapping => "MAPPING",
            TokenKind::Parent => "PARENT",
            TokenKind::Description => "DESCRIPTION",
            TokenKind::Reference => "REFERENCE",
            TokenKind::EndOfModel => "ENDOFMODEL",
        };
        write!(f, "{name}")
    }
}

impl FromStr for TokenKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MODULE" => Ok(TokenKind::Module),
            "OBJECT" => Ok(TokenKind::Object),
            "ATTRIBUTE" => Ok(TokenKind::Attribute),
            "TYPE" => Ok(TokenKind::Type),
            "OPTION" => Ok(TokenKind::Option),
            "REQUIRED" => Ok(TokenKind::Required),
            "MULTIPLE" => Ok(TokenKind::Multiple),
            "ENUM" => Ok(TokenKind::Enum),
            "MAPPING" => Ok(TokenKind::Mapping),
            "PARENT" => Ok(TokenKind::Parent),
            "DESCRIPTION" => Ok(TokenKind::Description),
            "REFERENCE" => Ok(TokenKind::Reference),
            "ENDOFMODEL" => Ok(TokenKind::EndOfModel),
            _ => Err(()),
        }
    }
}

/// One token in sequence order. Order is semantically significant: it encodes
/// nesting depth through the grammar's per-kind `order` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub content: Option<String>,
}

impl Token {
    pub fn new(kind: TokenKind, content: impl Into<String>) -> Token {
        let content = content.into();
        Token {
            kind,
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
        }
    }

    pub fn bare(kind: TokenKind) -> Token {
        Token {
            kind,
            content: None,
        }
    }

    pub fn content(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Ordered substitution table. Longer heading markers come first so `####`
/// is rewritten before `###` gets a chance to match, and specific option
/// keys come before the generic `OPTION` catch-all.
static SUBSTITUTIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"^```.*$", ""),
        (r"^####\s+(.*\S)\s*$", "ENUM $1"),
        (r"^###\s+(.*\S)\s*$", "OBJECT $1"),
        (r"^##\s+.*$", ""),
        (r"^#\s+(.*\S)\s*$", "MODULE $1"),
        (
            r"^-\s+(?:__|\*\*)([A-Za-z0-9_]+)(?:__|\*\*)(\*)?\s*$",
            "ATTRIBUTE $1$2",
        ),
        (r"^\s+-\s+[Tt]ype\s*:\s*(.*\S)\s*$", "TYPE $1"),
        (r"^\s+-\s+[Dd]escription\s*:\s*(.*\S)\s*$", "DESCRIPTION $1"),
        (r"^\s+-\s+[Mm]ultiple\s*:\s*[Tt]rue\s*$", "MULTIPLE"),
        (r"^\s+-\s+[Mm]ultiple\s*:\s*[Ff]alse\s*$", ""),
        (r"^\s+-\s+[Rr]eference\s*:\s*(.*\S)\s*$", "REFERENCE $1"),
        (
            r"^\s+-\s+([A-Za-z][A-Za-z0-9_]*)\s*:\s*(.*\S)\s*$",
            "OPTION $1: $2",
        ),
        (r#"^\s*([A-Za-z0-9_]+)\s*=\s*(.*\S)\s*$"#, "MAPPING $1 = $2"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        let regex = Regex::new(pattern).expect("substitution table patterns are well-formed");
        (regex, replacement)
    })
    .collect()
});

/// Matches an inheritance marker suffix on an object heading: `Name [_Parent_]`.
static PARENT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.*?)\s*\[_(?P<parent>.+?)_\]\s*$")
        .expect("parent marker pattern is well-formed")
});

/// Matches a linked type `[Name](#anchor)` inside a TYPE content string.
static LINKED_TYPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[(?P<name>[^\]]+)\]\([^)]*\)$").expect("linked type pattern is well-formed")
});

/// Convert raw dialect text into a flat token stream, terminated with a
/// sentinel `ENDOFMODEL` token.
#[tracing::instrument(skip_all)]
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    for raw_line in text.lines() {
        let mut line = raw_line.to_string();
        for (regex, replacement) in SUBSTITUTIONS.iter() {
            if regex.is_match(&line) {
                line = regex.replace(&line, *replacement).into_owned();
                break;
            }
        }
        if line.trim().is_empty() {
            continue;
        }
        split_line(&line, &mut tokens);
    }
    tokens.push(Token::bare(TokenKind::EndOfModel));
    tracing::debug!("tokenized {} tokens", tokens.len());
    tokens
}

/// Split one rewritten line into tokens, applying the per-kind content rules.
fn split_line(line: &str, tokens: &mut Vec<Token>) {
    let (head, rest) = match line.split_once(' ') {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let Ok(kind) = head.parse::<TokenKind>() else {
        // No recognized prefix: the raw line is free-form description text.
        tokens.push(Token::new(TokenKind::Description, line.trim()));
        return;
    };
    match kind {
        TokenKind::Object => {
            if let Some(caps) = PARENT_MARKER.captures(rest) {
                tokens.push(Token::new(TokenKind::Object, caps["name"].trim()));
                tokens.push(Token::new(TokenKind::Parent, caps["parent"].trim()));
            } else {
                tokens.push(Token::new(TokenKind::Object, rest));
            }
        }
        TokenKind::Attribute => {
            if let Some(name) = rest.strip_suffix('*') {
                tokens.push(Token::new(TokenKind::Attribute, name.trim()));
                tokens.push(Token::bare(TokenKind::Required));
            } else {
                tokens.push(Token::new(TokenKind::Attribute, rest));
            }
        }
        TokenKind::Type => {
            // A type line may declare a comma-separated union. Reference
            // (`@Object.attribute`), small-type (`{name: type, ...}`) and
            // remote (`url@Object`) syntax passes through unmodified as a
            // single content string; decomposition happens in the parser.
            for piece in split_union(rest) {
                let piece = piece.trim();
                if piece.is_empty() {
                    continue;
                }
                if let Some(caps) = LINKED_TYPE.captures(piece) {
                    tokens.push(Token::new(TokenKind::Type, caps["name"].trim()));
                } else {
                    tokens.push(Token::new(TokenKind::Type, piece));
                }
            }
        }
        _ => tokens.push(Token::new(kind, rest)),
    }
}

/// Split a TYPE content string on commas at brace/bracket depth zero, so an
/// inline small type keeps its internal commas.
fn split_union(content: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in content.chars() {
        match c {
            '{' | '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' | ')' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
