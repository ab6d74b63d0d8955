//! Tokenizer: turns macro-expanded source text into a flat token stream.
//!
//! Rules are tried in a fixed order at the current cursor; the first match
//! wins. This is the ordered-regex design this module uses — any
//! equivalent deterministic lexer would produce the same tokens.

use regex::Regex;

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Directive,
    Label,
    Register,
    HexInt,
    BinInt,
    DecInt,
    Ident,
    Comma,
    LBrack,
    RBrack,
    Plus,
    Newline,
    String,
    Eof,
}

/// A single lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub col: usize,
}

/// `kind = None` means the match is discarded (whitespace, comments).
struct Rule {
    kind: Option<TokenKind>,
    regex: Regex,
}

fn rules() -> Vec<Rule> {
    vec![
        Rule { kind: None, regex: Regex::new(r"^[ \t]+").unwrap() }, // whitespace
        Rule { kind: None, regex: Regex::new(r"^;[^\n]*").unwrap() }, // comment
        Rule { kind: Some(TokenKind::Directive), regex: Regex::new(r"^\.[A-Za-z_][A-Za-z0-9_]*").unwrap() },
        Rule { kind: Some(TokenKind::Label), regex: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*:").unwrap() },
        Rule { kind: Some(TokenKind::Register), regex: Regex::new(r"^[rx][0-9]{1,2}\b").unwrap() },
        Rule { kind: Some(TokenKind::HexInt), regex: Regex::new(r"^0x[0-9A-Fa-f]+").unwrap() },
        Rule { kind: Some(TokenKind::BinInt), regex: Regex::new(r"^0b[01]+").unwrap() },
        Rule { kind: Some(TokenKind::DecInt), regex: Regex::new(r"^-?[0-9]+").unwrap() },
        Rule { kind: Some(TokenKind::Ident), regex: Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").unwrap() },
        Rule { kind: Some(TokenKind::Comma), regex: Regex::new(r"^,").unwrap() },
        Rule { kind: Some(TokenKind::LBrack), regex: Regex::new(r"^\[").unwrap() },
        Rule { kind: Some(TokenKind::RBrack), regex: Regex::new(r"^\]").unwrap() },
        Rule { kind: Some(TokenKind::Plus), regex: Regex::new(r"^\+").unwrap() },
        Rule { kind: Some(TokenKind::String), regex: Regex::new(r#"^"(?:\\.|[^"\\])*""#).unwrap() },
        Rule { kind: Some(TokenKind::Newline), regex: Regex::new(r"^\n+").unwrap() },
    ]
}

/// Tokenize `source`, returning a token list terminated by exactly one `Eof`.
pub fn lex(source: &str) -> Result<Vec<Token>, Error> {
    let rules = rules();
    let mut tokens = Vec::new();
    let mut rest = source;
    let mut line = 1usize;
    let mut col = 1usize;

    while !rest.is_empty() {
        let mut matched = false;
        for rule in &rules {
            let Some(m) = rule.regex.find(rest) else { continue };
            if m.start() != 0 {
                continue;
            }
            let text = m.as_str();
            matched = true;

            match rule.kind {
                Some(TokenKind::Newline) => {
                    tokens.push(Token { kind: TokenKind::Newline, lexeme: text.to_string(), line, col });
                    line += text.chars().filter(|&c| c == '\n').count();
                    col = 1;
                }
                Some(kind) => {
                    tokens.push(Token { kind, lexeme: text.to_string(), line, col });
                    col += text.chars().count();
                }
                None => col += text.chars().count(),
            }

            rest = &rest[text.len()..];
            break;
        }

        if !matched {
            return Err(Error::UnknownToken { line, col });
        }
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        lexeme: String::new(),
        line,
        col,
    });
    Ok(tokens)
}

/// An error raised by the lexer.
#[derive(Debug)]
pub enum Error {
    UnknownToken { line: usize, col: usize },
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownToken { line, col } => write!(f, "lex error: unknown token at {line}:{col}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn ends_with_exactly_one_eof() {
        let tokens = lex("ldi r1, 0x2A\nhalt\n").unwrap();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert_eq!(tokens.iter().filter(|t| t.kind == TokenKind::Eof).count(), 1);
    }

    #[test]
    fn discards_whitespace_and_comments() {
        let tokens = lex("  ldi r1, 5 ; comment\n").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Register,
                TokenKind::Comma,
                TokenKind::DecInt,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn collapses_consecutive_newlines() {
        let tokens = lex("halt\n\n\n\nret\n").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Ident,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn recognizes_label_directive_register_and_literals() {
        let tokens = lex("L: .word 0x10\n").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Label,
                TokenKind::Directive,
                TokenKind::HexInt,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
        assert_eq!(tokens[0].lexeme, "L:");
    }

    #[test]
    fn unknown_character_is_an_error() {
        let err = lex("@@@\n").unwrap_err();
        assert!(matches!(err, Error::UnknownToken { line: 1, col: 1 }));
    }

    #[test]
    fn bracket_and_plus_punctuation() {
        let tokens = lex("lw r1, [r2+r3]\n").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Ident,
                TokenKind::Register,
                TokenKind::Comma,
                TokenKind::LBrack,
                TokenKind::Register,
                TokenKind::Plus,
                TokenKind::Register,
                TokenKind::RBrack,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }
}
