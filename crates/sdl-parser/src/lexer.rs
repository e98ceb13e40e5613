//! Lexer for SDL using Logos.

use logos::Logos;
use sdl_core::{Position, Span};
use std::fmt;
use thiserror::Error;

/// The magnitude/ISO-currency-code suffix a numeric literal may carry, e.g.
/// `100KUSD` (magnitude `K`, currency `USD`), `100K` (magnitude only), or
/// `100USD` (currency only).
#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyLiteral {
    pub value: f64,
    pub magnitude: Option<char>,
    pub currency: Option<String>,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum TokenKind {
    // Keywords
    #[token("scenario")]
    Scenario,
    #[token("timeframe")]
    Timeframe,
    #[token("assumption")]
    Assumption,
    #[token("parameter")]
    Parameter,
    #[token("variable")]
    Variable,
    #[token("impact")]
    Impact,
    #[token("branch")]
    Branch,
    #[token("when")]
    When,
    #[token("simulate")]
    Simulate,
    #[token("calibrate")]
    Calibrate,
    #[token("bind")]
    Bind,
    #[token("watch")]
    Watch,
    #[token("warn")]
    Warn,
    #[token("error")]
    Error,

    // Distribution / model names
    #[token("normal")]
    Normal,
    #[token("lognormal")]
    Lognormal,
    #[token("beta")]
    Beta,
    #[token("uniform")]
    Uniform,
    #[token("triangular")]
    Triangular,
    #[token("linear")]
    Linear,
    #[token("exponential")]
    Exponential,
    #[token("logistic")]
    Logistic,
    #[token("sigmoid")]
    Sigmoid,
    #[token("polynomial")]
    Polynomial,
    #[token("slider")]
    Slider,

    // Literals. Longest-match-wins disambiguates these against each other and
    // against a bare `Integer`/`Float` without needing any manual lookahead:
    // `100KUSD` only matches `Currency`'s regex (7 chars) because `Integer`
    // alone tops out at `100` (3 chars), and `100Kg` matches only as far as
    // `100K` (magnitude, no currency) since `g` doesn't complete a 3-letter
    // ISO code, leaving `g` to lex separately as an identifier.
    #[regex(r"[0-9]+(\.[0-9]+)?([KMBT][A-Z]{3}|[KMBT]|[A-Z]{3})", lex_currency)]
    Currency(CurrencyLiteral),
    #[regex(r"[0-9]+(\.[0-9]+)?%", lex_percentage)]
    Percentage(f64),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),
    #[regex(r#""([^"\\]|\\.)*""#, lex_string)]
    StringLit(String),
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token("->")]
    Arrow,

    // Operators. A bare `=`, `&`, or `|` has no pattern of its own and so
    // falls through to the lexer's error path, matching the grammar (only
    // `==`, `&&`, `||` are meaningful).
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("±")]
    PlusMinus,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,

    /// Synthesized by the wrapper `Lexer`, not produced by Logos itself.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

fn lex_currency(lex: &mut logos::Lexer<TokenKind>) -> Option<CurrencyLiteral> {
    let slice = lex.slice();
    let digit_end = slice.find(|c: char| !c.is_ascii_digit() && c != '.').unwrap_or(slice.len());
    let value: f64 = slice[..digit_end].parse().ok()?;
    let mut suffix = slice[digit_end..].chars();
    match suffix.next()? {
        magnitude @ ('K' | 'M' | 'B' | 'T') => {
            let currency: String = suffix.collect();
            let currency = if currency.is_empty() { None } else { Some(currency) };
            Some(CurrencyLiteral { value, magnitude: Some(magnitude), currency })
        }
        first => {
            let mut currency = String::new();
            currency.push(first);
            currency.extend(suffix);
            Some(CurrencyLiteral { value, magnitude: None, currency: Some(currency) })
        }
    }
}

fn lex_percentage(lex: &mut logos::Lexer<TokenKind>) -> Option<f64> {
    let slice = lex.slice();
    slice[..slice.len() - 1].parse().ok()
}

fn lex_string(lex: &mut logos::Lexer<TokenKind>) -> String {
    let slice = lex.slice();
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unterminated string literal at {0}")]
    UnterminatedString(Position),
    #[error("invalid numeric suffix at {0}")]
    InvalidNumericSuffix(Position),
    #[error("unexpected character {0:?} at {1}")]
    UnexpectedChar(char, Position),
}

/// Wraps a Logos token stream with byte-offset-to-line/column tracking and
/// resynchronising error recovery, since Logos itself only reports a
/// `Range<usize>` span per token and aborts a match silently on the first
/// unmatchable byte.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    source: &'a str,
    line: u32,
    column: u32,
    last_pos: usize,
    pub errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            source,
            line: 1,
            column: 1,
            last_pos: 0,
            errors: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> (Vec<Token>, Vec<LexError>) {
        let mut tokens = Vec::new();
        while let Some(tok) = self.next_token() {
            let is_eof = matches!(tok.kind, TokenKind::Eof);
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        (tokens, self.errors)
    }

    /// Advances line/column bookkeeping over the source up to (not
    /// including) byte offset `upto`. None of our tokens themselves span a
    /// newline (strings stop at one, comments/whitespace are skipped before
    /// a token starts), so this is only ever called between tokens.
    fn advance_position_to(&mut self, upto: usize) {
        for c in self.source[self.last_pos..upto].chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.last_pos = upto;
    }

    fn position_at(&mut self, offset: usize) -> Position {
        self.advance_position_to(offset);
        Position::new(self.line, self.column, offset)
    }

    fn next_token(&mut self) -> Option<Token> {
        loop {
            match self.inner.next() {
                None => {
                    let pos = self.position_at(self.source.len());
                    return Some(Token { kind: TokenKind::Eof, span: Span::point(pos) });
                }
                Some(Ok(kind)) => {
                    let span = self.inner.span();
                    let start = self.position_at(span.start);
                    let width = self.inner.slice().chars().count() as u32;
                    let end = Position::new(start.line, start.column + width, span.end);
                    self.last_pos = span.end;
                    return Some(Token { kind, span: Span::new(start, end) });
                }
                Some(Err(())) => {
                    let span = self.inner.span();
                    let start = self.position_at(span.start);
                    match self.inner.slice().chars().next() {
                        Some('"') => self.errors.push(LexError::UnterminatedString(start)),
                        Some(c) => self.errors.push(LexError::UnexpectedChar(c, start)),
                        None => {}
                    }
                    // Resync to the next line instead of re-reporting one
                    // error per unmatchable byte.
                    let remainder = self.inner.remainder();
                    let skip = remainder.find('\n').unwrap_or(remainder.len());
                    self.inner.bump(skip);
                    let new_end = self.inner.span().end;
                    self.advance_position_to(new_end);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let (tokens, errors) = Lexer::new(src).tokenize();
        assert!(errors.is_empty(), "unexpected lex errors: {errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_scenario_header() {
        let ks = kinds(r#"scenario "Demand" {"#);
        assert_eq!(
            ks,
            vec![
                TokenKind::Scenario,
                TokenKind::StringLit("Demand".into()),
                TokenKind::LBrace,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_percentage_and_plain_number() {
        let ks = kinds("50% 12.5 7");
        assert_eq!(
            ks,
            vec![
                TokenKind::Percentage(50.0),
                TokenKind::Float(12.5),
                TokenKind::Integer(7),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_magnitude_currency_literal() {
        let ks = kinds("100KUSD");
        assert_eq!(
            ks,
            vec![
                TokenKind::Currency(CurrencyLiteral { value: 100.0, magnitude: Some('K'), currency: Some("USD".into()) }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_currency_literal_without_magnitude() {
        let ks = kinds("250USD");
        assert_eq!(
            ks,
            vec![
                TokenKind::Currency(CurrencyLiteral { value: 250.0, magnitude: None, currency: Some("USD".into()) }),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_plus_minus_sign() {
        let ks = kinds("±10%");
        assert_eq!(ks, vec![TokenKind::PlusMinus, TokenKind::Percentage(10.0), TokenKind::Eof]);
    }

    #[test]
    fn lexes_comparison_and_logical_operators() {
        let ks = kinds("< > <= >= == != && ||");
        assert_eq!(
            ks,
            vec![
                TokenKind::Lt,
                TokenKind::Gt,
                TokenKind::Le,
                TokenKind::Ge,
                TokenKind::EqEq,
                TokenKind::Ne,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn skips_line_and_block_comments() {
        let ks = kinds("1 // trailing comment\n/* block */ 2");
        assert_eq!(ks, vec![TokenKind::Integer(1), TokenKind::Integer(2), TokenKind::Eof]);
    }

    #[test]
    fn reports_unterminated_string() {
        let (tokens, errors) = Lexer::new("\"unterminated\n1").tokenize();
        assert!(matches!(errors[0], LexError::UnterminatedString(_)));
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn arrow_token_for_timeframe_range() {
        let ks = kinds("2025 -> 2030");
        assert_eq!(ks, vec![TokenKind::Integer(2025), TokenKind::Arrow, TokenKind::Integer(2030), TokenKind::Eof]);
    }
}
