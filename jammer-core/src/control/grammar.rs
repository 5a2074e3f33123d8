#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for control request lines.
//!
//! The lexer uses `regal` to produce a bounded token stream, while the parser
//! composes `winnow` combinators over those tokens to build a
//! [`ControlRequest`].
//!
//! ```text
//! on { nem=5 period=2000000 duty=50 bandwidth=1e6 frequency=2.4e9@10 antenna=omni gain=3 }
//! off
//! ```

use core::fmt;
use core::ops::Range;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::combinator::opt;
use winnow::error::{ErrMode, ModalResult, ParserError};
use winnow::prelude::*;

use super::request::{ControlRequest, RequestKind};
use crate::command::{AntennaKind, FrequencyPower, OnParameters};

/// Maximum number of tokens produced per request line.
pub const MAX_TOKENS: usize = 128;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the request grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Decimal literal with optional sign, fraction, and exponent.
    #[regex(r"-?[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?", priority = 2)]
    Number,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9_-]*")]
    Ident,
    #[token("=")]
    Equals,
    /// Separates a frequency from its power.
    #[token("@")]
    At,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    /// Optional separator between payload fields.
    #[token(",")]
    Comma,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer to avoid dynamic allocation in `no_std` environments.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    InvalidNumber {
        span: Range<usize>,
        lexeme: &'a str,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
    UnknownField {
        span: Range<usize>,
        lexeme: &'a str,
    },
    TooManyFrequencies {
        span: Range<usize>,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::InvalidNumber { span, lexeme } => {
                write!(f, "invalid number `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::UnknownField { span, lexeme } => {
                write!(f, "unknown field `{lexeme}` at {span:?}")
            }
            GrammarErrorKind::TooManyFrequencies { span } => write!(
                f,
                "more than {} frequencies at {span:?}",
                crate::descriptor::MAX_FREQUENCIES
            ),
        }
    }
}

/// Wrapper type enabling a consistent error surface for consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn invalid_number(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidNumber {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn unknown_field(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::UnknownField {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }

    fn too_many_frequencies(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::TooManyFrequencies {
                span: token.span.clone(),
            },
        }
    }
}

type Input<'src, 'slice> = &'slice [Token<'src>];

impl<'src, 'slice> ParserError<Input<'src, 'slice>> for GrammarError<'src>
where
    'src: 'slice,
{
    type Inner = Self;

    fn from_input(input: &Input<'src, 'slice>) -> Self {
        GrammarError::unexpected("token", input.first())
    }

    fn into_inner(self) -> Result<Self::Inner, Self> {
        Ok(self)
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        let lexeme = &line[span.clone()];
        if buffer
            .push(Token {
                kind: record.token,
                lexeme,
                span,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let end = start + partial.fragment.len();
        if buffer
            .push(Token {
                kind: TokenKind::Error,
                lexeme: partial.fragment,
                span: start..end,
            })
            .is_err()
        {
            return Err(LexError::TooManyTokens {
                processed: buffer.len() + 1,
            });
        }
    }

    Ok(buffer)
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a control request from the provided line.
pub fn parse(line: &str) -> Result<ControlRequest, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    for token in tokens.iter() {
        if token.kind == TokenKind::Error {
            return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
        }
    }

    let mut rest = tokens.as_slice();
    let request = match request().parse_next(&mut rest) {
        Ok(request) => request,
        Err(ErrMode::Backtrack(err) | ErrMode::Cut(err)) => {
            return Err(ParseError::Grammar(err));
        }
        Err(ErrMode::Incomplete(_)) => {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "token",
                rest.first(),
            )));
        }
    };

    while let Some((token, remaining)) = rest.split_first() {
        if token.kind == TokenKind::Eol {
            rest = remaining;
        } else {
            return Err(ParseError::Grammar(GrammarError::unexpected(
                "end of request",
                Some(token),
            )));
        }
    }

    Ok(request)
}

fn request<'src, 'slice>()
-> impl Parser<Input<'src, 'slice>, ControlRequest, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let snapshot = *input;
        let kind_token = expect_kind(TokenKind::Ident, "request kind").parse_next(input)?;

        let Some(kind) = RequestKind::from_keyword(kind_token.lexeme) else {
            *input = snapshot;
            return Err(ErrMode::Backtrack(GrammarError::unexpected(
                "request kind",
                Some(&kind_token),
            )));
        };

        let on = opt(payload()).parse_next(input)?;
        Ok(ControlRequest { kind, on })
    }
}

fn payload<'src, 'slice>()
-> impl Parser<Input<'src, 'slice>, OnParameters, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| {
        let _ = expect_kind(TokenKind::LBrace, "{").parse_next(input)?;
        let mut on = OnParameters::default();

        loop {
            match input.split_first() {
                Some((token, rest)) if token.kind == TokenKind::RBrace => {
                    *input = rest;
                    return Ok(on);
                }
                Some((token, rest)) if token.kind == TokenKind::Comma => {
                    *input = rest;
                }
                Some((token, rest)) if token.kind == TokenKind::Ident => {
                    let Some(field) = Field::find(token.lexeme) else {
                        return Err(ErrMode::Cut(GrammarError::unknown_field(token)));
                    };
                    *input = rest;
                    parse_field(field, input, &mut on).map_err(ErrMode::cut)?;
                }
                Some((token, _)) => {
                    return Err(ErrMode::Cut(GrammarError::unexpected(
                        "field or }",
                        Some(token),
                    )));
                }
                None => {
                    return Err(ErrMode::Cut(GrammarError::unexpected("}", None)));
                }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Field {
    Nem,
    Period,
    Duty,
    Bandwidth,
    Frequency,
    Antenna,
    Gain,
    Mask,
}

impl Field {
    const ALL: [(&'static str, Field); 8] = [
        ("nem", Field::Nem),
        ("period", Field::Period),
        ("duty", Field::Duty),
        ("bandwidth", Field::Bandwidth),
        ("frequency", Field::Frequency),
        ("antenna", Field::Antenna),
        ("gain", Field::Gain),
        ("mask", Field::Mask),
    ];

    fn find(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .find(|(keyword, _)| keyword.eq_ignore_ascii_case(name))
            .map(|(_, field)| *field)
    }
}

fn parse_field<'src, 'slice>(
    field: Field,
    input: &mut Input<'src, 'slice>,
    on: &mut OnParameters,
) -> ModalResult<(), GrammarError<'src>>
where
    'src: 'slice,
{
    let _ = expect_kind(TokenKind::Equals, "=").parse_next(input)?;

    match field {
        Field::Nem => on.nem_id = unsigned(input)?,
        Field::Period => on.period_micros = unsigned(input)?,
        Field::Duty => on.duty_cycle_percent = unsigned(input)?,
        Field::Bandwidth => on.bandwidth_hz = hertz(input)?,
        Field::Frequency => {
            let first = input.first().cloned();
            let frequency_hz = hertz(input)?;
            let _ = expect_kind(TokenKind::At, "@").parse_next(input)?;
            let power_dbm = decimal(input)?;
            if on
                .frequencies
                .push(FrequencyPower::new(frequency_hz, power_dbm))
                .is_err()
            {
                return Err(ErrMode::Cut(match first {
                    Some(token) => GrammarError::too_many_frequencies(&token),
                    None => GrammarError::unexpected("frequency", None),
                }));
            }
        }
        Field::Antenna => {
            let token = expect_kind(TokenKind::Ident, "antenna type").parse_next(input)?;
            on.antenna.kind = antenna_kind(token.lexeme);
        }
        Field::Gain => on.antenna.fixed_gain_dbi = decimal(input)?,
        Field::Mask => on.spectral_mask_index = unsigned(input)?,
    }

    Ok(())
}

fn antenna_kind(name: &str) -> AntennaKind {
    if ["omni", "ideal-omni", "ideal_omni"]
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(name))
    {
        AntennaKind::IdealOmni
    } else if name.eq_ignore_ascii_case("profile") {
        AntennaKind::ProfileDefined
    } else {
        AntennaKind::Unrecognized
    }
}

fn expect_kind<'src, 'slice>(
    kind: TokenKind,
    label: &'static str,
) -> impl Parser<Input<'src, 'slice>, Token<'src>, ErrMode<GrammarError<'src>>>
where
    'src: 'slice,
{
    move |input: &mut Input<'src, 'slice>| match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(ErrMode::Backtrack(GrammarError::unexpected(
            label,
            Some(token),
        ))),
        None => Err(ErrMode::Backtrack(GrammarError::unexpected(label, None))),
    }
}

fn unsigned<'src, 'slice, T>(input: &mut Input<'src, 'slice>) -> ModalResult<T, GrammarError<'src>>
where
    'src: 'slice,
    T: core::str::FromStr,
{
    let token = expect_kind(TokenKind::Number, "integer").parse_next(input)?;
    token
        .lexeme
        .parse::<T>()
        .map_err(|_| ErrMode::Cut(GrammarError::invalid_number(&token)))
}

fn decimal<'src, 'slice>(input: &mut Input<'src, 'slice>) -> ModalResult<f32, GrammarError<'src>>
where
    'src: 'slice,
{
    let token = expect_kind(TokenKind::Number, "number").parse_next(input)?;
    match token.lexeme.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ErrMode::Cut(GrammarError::invalid_number(&token))),
    }
}

fn hertz<'src, 'slice>(input: &mut Input<'src, 'slice>) -> ModalResult<u64, GrammarError<'src>>
where
    'src: 'slice,
{
    let token = expect_kind(TokenKind::Number, "frequency").parse_next(input)?;
    integral_hertz(token.lexeme).ok_or_else(|| ErrMode::Cut(GrammarError::invalid_number(&token)))
}

/// Accepts plain integers and exponent notation that lands on a whole number.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]
fn integral_hertz(lexeme: &str) -> Option<u64> {
    if let Ok(value) = lexeme.parse::<u64>() {
        return Some(value);
    }

    let value = lexeme.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value > u64::MAX as f64 {
        return None;
    }

    let whole = value as u64;
    (whole as f64 == value).then_some(whole)
}
