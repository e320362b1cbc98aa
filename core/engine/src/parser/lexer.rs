//! Tokenizer.

use crate::{Position, TernError, TernResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Number(f64),
    String(String),
    Identifier(String),
    Keyword(Keyword),
    Punctuator(&'static str),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Keyword {
    Let,
    Function,
    Return,
    If,
    Else,
    While,
    Debugger,
    Throw,
    True,
    False,
    Undefined,
}

impl Keyword {
    fn from_identifier(ident: &str) -> Option<Self> {
        Some(match ident {
            "let" | "var" | "const" => Self::Let,
            "function" => Self::Function,
            "return" => Self::Return,
            "if" => Self::If,
            "else" => Self::Else,
            "while" => Self::While,
            "debugger" => Self::Debugger,
            "throw" => Self::Throw,
            "true" => Self::True,
            "false" => Self::False,
            "undefined" => Self::Undefined,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub(crate) kind: TokenKind,
    pub(crate) position: Position,
}

// Longest first so `<=` wins over `<`.
const PUNCTUATORS: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "{", "}", ",", ";", "=", "+", "-",
    "*", "/", "%", "<", ">", "!",
];

pub(crate) fn tokenize(source: &str) -> TernResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    while i < chars.len() {
        let c = chars[i];
        let position = Position::new(line, column);

        if c == '\n' {
            i += 1;
            line += 1;
            column = 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            column += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let number = text
                .parse()
                .map_err(|_| TernError::syntax(format!("invalid number `{text}`"), position))?;
            TokenKind::Number(number)
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            match Keyword::from_identifier(&text) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(text),
            }
        } else if c == '"' || c == '\'' {
            i += 1;
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None | Some('\n') => {
                        return Err(TernError::syntax("unterminated string literal", position));
                    }
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = match chars.get(i + 1) {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some(&other) => other,
                            None => {
                                return Err(TernError::syntax(
                                    "unterminated string literal",
                                    position,
                                ));
                            }
                        };
                        text.push(escaped);
                        i += 2;
                    }
                    Some(&other) => {
                        text.push(other);
                        i += 1;
                    }
                }
            }
            TokenKind::String(text)
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            let punctuator = PUNCTUATORS
                .iter()
                .find(|p| rest.starts_with(**p))
                .ok_or_else(|| TernError::syntax(format!("unexpected character `{c}`"), position))?;
            i += punctuator.chars().count();
            TokenKind::Punctuator(punctuator)
        };

        column += u32::try_from(i - start).unwrap_or(u32::MAX);
        tokens.push(Token { kind, position });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        position: Position::new(line, column),
    });
    Ok(tokens)
}
