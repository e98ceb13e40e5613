//! Recursive-descent parser over the token stream produced by [`crate::lexer`].
//!
//! Diagnostics accumulate on the parser rather than aborting on first error:
//! `parse` always returns a best-effort [`Scenario`] (when a `scenario` header
//! could be found at all) plus the diagnostics list, and callers decide whether
//! to proceed to validation.

use crate::ast::*;
use crate::lexer::{CurrencyLiteral, LexError, Lexer, Token, TokenKind};
use sdl_core::{Diagnostic, Diagnostics, Position, Span};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected {expected}, found {found} at {span}")]
    UnexpectedToken { expected: String, found: String, span: Span },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    diagnostics: Diagnostics,
}

/// Parses a complete SDL document, returning a best-effort AST plus diagnostics.
pub fn parse(source: &str) -> (Option<Scenario>, Diagnostics) {
    Parser::new(source).parse_document()
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Self {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        let mut diagnostics = Diagnostics::new();
        for err in lex_errors {
            diagnostics.push(lex_error_to_diagnostic(err));
        }
        Self { tokens, pos: 0, source, diagnostics }
    }

    pub fn parse_document(mut self) -> (Option<Scenario>, Diagnostics) {
        let scenario = match self.parse_scenario() {
            Ok(s) => Some(s),
            Err(e) => {
                self.diagnostics.push(parse_error_to_diagnostic(e));
                None
            }
        };
        (scenario, self.diagnostics)
    }

    // --- token stream helpers ---------------------------------------------

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn is_at_end(&self) -> bool {
        matches!(self.peek_kind(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if !self.is_at_end() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek_kind()) == std::mem::discriminant(kind)
    }

    fn matches_kind(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(what))
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        let found = self.peek().kind.to_string();
        let span = self.peek().span;
        if self.is_at_end() {
            ParseError::UnexpectedEof
        } else {
            ParseError::UnexpectedToken { expected: expected.to_string(), found, span }
        }
    }

    fn expect_string(&mut self) -> ParseResult<(String, Span)> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::StringLit(s) => {
                self.advance();
                Ok((s, tok.span))
            }
            _ => Err(self.error("string literal")),
        }
    }

    fn expect_integer(&mut self) -> ParseResult<(i64, Span)> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok((n, tok.span))
            }
            _ => Err(self.error("integer literal")),
        }
    }

    fn expect_colon(&mut self) -> ParseResult<()> {
        self.expect(&TokenKind::Colon, "':'").map(|_| ())
    }

    /// Accepts an identifier-ish field name: a plain identifier, or a keyword
    /// being reused as a field name (e.g. `error: ...` is never valid SDL, but
    /// `window`, `method`, `control` etc. are plain identifiers already).
    fn expect_field_name(&mut self) -> ParseResult<String> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Identifier(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.error("field name")),
        }
    }

    /// Skips tokens to the next `}`, `Eof`, or the start of a new top-level
    /// declaration, without consuming that boundary token.
    fn resync(&mut self) {
        while !self.is_at_end() {
            match self.peek_kind() {
                TokenKind::RBrace
                | TokenKind::Scenario
                | TokenKind::Assumption
                | TokenKind::Parameter
                | TokenKind::Variable
                | TokenKind::Impact
                | TokenKind::Branch
                | TokenKind::Calibrate
                | TokenKind::Watch
                | TokenKind::Simulate => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn is_decl_start(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Assumption
                | TokenKind::Parameter
                | TokenKind::Variable
                | TokenKind::Impact
                | TokenKind::Branch
                | TokenKind::Calibrate
                | TokenKind::Watch
                | TokenKind::Simulate
        )
    }

    // --- scenario ------------------------------------------------------------

    fn parse_scenario(&mut self) -> ParseResult<Scenario> {
        let start_tok = self.expect(&TokenKind::Scenario, "'scenario'")?;
        let (name, _) = self.expect_string()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut timeframe = TimeWindow { start_year: 0, end_year: 0 };
        let mut resolution = 1u32;
        let mut confidence = None;
        let mut metadata = Metadata::default();
        let mut declarations = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let result = self.parse_scenario_member(
                &mut timeframe,
                &mut resolution,
                &mut confidence,
                &mut metadata,
                &mut declarations,
            );
            if let Err(e) = result {
                self.diagnostics.push(parse_error_to_diagnostic(e));
                self.resync();
            }
        }

        let end_tok = self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(Scenario {
            name,
            timeframe,
            resolution,
            confidence,
            metadata,
            declarations,
            span: start_tok.span.merge(&end_tok.span),
        })
    }

    fn parse_scenario_member(
        &mut self,
        timeframe: &mut TimeWindow,
        resolution: &mut u32,
        confidence: &mut Option<f64>,
        metadata: &mut Metadata,
        declarations: &mut Vec<Declaration>,
    ) -> ParseResult<()> {
        if self.check(&TokenKind::Timeframe) {
            self.advance();
            self.expect_colon()?;
            let (start, _) = self.expect_integer()?;
            self.expect(&TokenKind::Arrow, "'->'")?;
            let (end, _) = self.expect_integer()?;
            *timeframe = TimeWindow { start_year: start as i32, end_year: end as i32 };
            return Ok(());
        }

        if self.is_decl_start() {
            declarations.push(self.parse_declaration()?);
            return Ok(());
        }

        // Plain scenario-level metadata key-value pair.
        let field = self.expect_field_name()?;
        self.expect_colon()?;
        match field.as_str() {
            "confidence" => *confidence = Some(self.parse_float_literal()?),
            "resolution" => *resolution = self.parse_int_literal()? as u32,
            "author" => metadata.author = Some(self.expect_string()?.0),
            "description" => metadata.description = Some(self.expect_string()?.0),
            "category" => metadata.category = Some(self.expect_string()?.0),
            "tags" => metadata.tags = self.parse_string_list()?,
            _ => {
                self.diagnostics.push(Diagnostic::warning(
                    "W001",
                    format!("unknown scenario field `{field}`, ignoring"),
                ));
                self.skip_one_value();
            }
        }
        Ok(())
    }

    fn parse_declaration(&mut self) -> ParseResult<Declaration> {
        match self.peek_kind() {
            TokenKind::Assumption => self.parse_assumption().map(Declaration::Assumption),
            TokenKind::Parameter => self.parse_parameter().map(Declaration::Parameter),
            TokenKind::Variable => self.parse_variable().map(Declaration::Variable),
            TokenKind::Impact => self.parse_impact().map(Declaration::Impact),
            TokenKind::Branch => self.parse_branch().map(Declaration::Branch),
            TokenKind::Calibrate => self.parse_calibrate().map(Declaration::Calibrate),
            TokenKind::Watch => self.parse_watch().map(Declaration::Watch),
            TokenKind::Simulate => self.parse_simulate().map(Declaration::Simulate),
            _ => Err(self.error("declaration")),
        }
    }

    // --- assumption ------------------------------------------------------------

    fn parse_assumption(&mut self) -> ParseResult<Assumption> {
        let start = self.expect(&TokenKind::Assumption, "'assumption'")?.span;
        let name = self.expect_field_name()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut value = None;
        let mut source = None;
        let mut confidence = None;
        let mut uncertainty = None;
        let mut bind = None;
        let mut watch = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.check(&TokenKind::Bind) {
                bind = Some(self.parse_bind()?);
                continue;
            }
            if self.check(&TokenKind::Watch) {
                watch = Some(self.parse_watch()?);
                continue;
            }
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "value" => value = Some(self.parse_expr()?),
                "source" => source = Some(self.expect_string()?.0),
                "confidence" => confidence = Some(self.parse_float_literal()?),
                "uncertainty" => uncertainty = Some(self.parse_distribution()?),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown assumption field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        let value = value.ok_or_else(|| self.error("assumption field `value`"))?;
        Ok(Assumption { name, value, source, confidence, uncertainty, bind, watch, span: start.merge(&end) })
    }

    fn parse_bind(&mut self) -> ParseResult<Bind> {
        let start = self.expect(&TokenKind::Bind, "'bind'")?.span;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut source_url = None;
        let mut field_name = None;
        let mut fallback_value = None;
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "source_url" => source_url = Some(self.expect_string()?.0),
                "field" => field_name = Some(self.expect_string()?.0),
                "fallback_value" => fallback_value = Some(self.parse_float_literal()?),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown bind field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        let source_url = source_url.ok_or_else(|| self.error("bind field `source_url`"))?;
        Ok(Bind { source_url, field: field_name, fallback_value, span: start.merge(&end) })
    }

    // --- parameter ------------------------------------------------------------

    fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let start = self.expect(&TokenKind::Parameter, "'parameter'")?.span;
        let name = self.expect_field_name()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut value = None;
        let mut min = None;
        let mut max = None;
        let mut step = None;
        let mut unit = None;
        let mut control = None;
        let mut label = None;
        let mut format = None;
        let mut description = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "value" => value = Some(self.parse_float_literal()?),
                "min" => min = Some(self.parse_float_literal()?),
                "max" => max = Some(self.parse_float_literal()?),
                "step" => step = Some(self.parse_float_literal()?),
                "unit" => unit = Some(self.expect_string()?.0),
                "control" => control = Some(self.parse_control_kind()?),
                "label" => label = Some(self.expect_string()?.0),
                "format" => format = Some(self.expect_string()?.0),
                "description" => description = Some(self.expect_string()?.0),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown parameter field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        let value = value.ok_or_else(|| self.error("parameter field `value`"))?;
        Ok(Parameter { name, value, min, max, step, unit, control, label, format, description, span: start.merge(&end) })
    }

    fn parse_control_kind(&mut self) -> ParseResult<String> {
        if self.matches_kind(&TokenKind::Slider) {
            return Ok("slider".to_string());
        }
        self.expect_string().map(|(s, _)| s)
    }

    // --- variable ------------------------------------------------------------

    fn parse_variable(&mut self) -> ParseResult<Variable> {
        let start = self.expect(&TokenKind::Variable, "'variable'")?.span;
        let name = self.expect_field_name()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut description = None;
        let mut unit = None;
        let mut uncertainty = None;
        let mut interpolation = Interpolation::Linear;
        let mut model = None;
        let mut timeseries = Vec::new();
        let mut depends_on = Vec::new();
        let mut non_negative = true;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if let TokenKind::Integer(year) = self.peek_kind().clone() {
                self.advance();
                self.expect_colon()?;
                let value = self.parse_expr()?;
                timeseries.push((year as i32, value));
                continue;
            }
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "description" => description = Some(self.expect_string()?.0),
                "unit" => unit = Some(self.expect_string()?.0),
                "uncertainty" => uncertainty = Some(self.parse_distribution()?),
                "interpolation" => interpolation = self.parse_interpolation()?,
                "model" => model = Some(self.parse_model()?),
                "depends_on" => depends_on = self.parse_dependency_list()?,
                "non_negative" => non_negative = self.parse_bool_literal()?,
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown variable field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(Variable {
            name,
            description,
            unit,
            uncertainty,
            interpolation,
            model,
            timeseries,
            depends_on,
            non_negative,
            span: start.merge(&end),
        })
    }

    fn parse_interpolation(&mut self) -> ParseResult<Interpolation> {
        if self.matches_kind(&TokenKind::Linear) {
            return Ok(Interpolation::Linear);
        }
        let field = self.expect_field_name()?;
        match field.as_str() {
            "spline" => Ok(Interpolation::Spline),
            "linear" => Ok(Interpolation::Linear),
            other => {
                self.diagnostics.push(Diagnostic::warning(
                    "W002",
                    format!("unknown interpolation kind `{other}`, defaulting to linear"),
                ));
                Ok(Interpolation::Linear)
            }
        }
    }

    fn parse_dependency_list(&mut self) -> ParseResult<Vec<Dependency>> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut deps = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            let name = self.expect_field_name()?;
            let sensitivity = if self.matches_kind(&TokenKind::LParen) {
                let s = self.parse_float_literal()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Some(s)
            } else {
                None
            };
            deps.push(Dependency { name, sensitivity });
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(deps)
    }

    // --- impact ------------------------------------------------------------

    fn parse_impact(&mut self) -> ParseResult<Impact> {
        let start = self.expect(&TokenKind::Impact, "'impact'")?.span;
        let name = self.expect_field_name()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut description = None;
        let mut unit = None;
        let mut derives_from = Vec::new();
        let mut formula = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "description" => description = Some(self.expect_string()?.0),
                "unit" => unit = Some(self.expect_string()?.0),
                "derives_from" => derives_from = self.parse_identifier_list()?,
                "formula" => formula = Some(self.parse_expr()?),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown impact field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        let formula = formula.ok_or_else(|| self.error("impact field `formula`"))?;
        Ok(Impact { name, description, unit, derives_from, formula, span: start.merge(&end) })
    }

    // --- branch ------------------------------------------------------------

    fn parse_branch(&mut self) -> ParseResult<Branch> {
        let start = self.expect(&TokenKind::Branch, "'branch'")?.span;
        let (name, _) = self.expect_string()?;
        self.expect(&TokenKind::When, "'when'")?;
        let when = self.parse_expr()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut probability = None;
        let mut declarations = Vec::new();

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            if self.is_decl_start() {
                let result = self.parse_declaration();
                match result {
                    Ok(d) => declarations.push(d),
                    Err(e) => {
                        self.diagnostics.push(parse_error_to_diagnostic(e));
                        self.resync();
                    }
                }
                continue;
            }
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "probability" => probability = Some(self.parse_float_literal()?),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown branch field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(Branch { name, when, probability, declarations, span: start.merge(&end) })
    }

    // --- calibrate ------------------------------------------------------------

    fn parse_calibrate(&mut self) -> ParseResult<Calibrate> {
        let start = self.expect(&TokenKind::Calibrate, "'calibrate'")?.span;
        let target = self.expect_field_name()?;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut url = None;
        let mut method = CalibrateMethod::BayesianUpdate;
        let mut window = None;
        let mut prior = None;
        let mut update_frequency = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "url" => url = Some(self.expect_string()?.0),
                "method" => method = self.parse_calibrate_method()?,
                "window" => window = Some(self.expect_string()?.0),
                "prior" => prior = Some(self.parse_distribution()?),
                "update_frequency" => update_frequency = Some(self.expect_string()?.0),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown calibrate field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        let url = url.ok_or_else(|| self.error("calibrate field `url`"))?;
        Ok(Calibrate { target, url, method, window, prior, update_frequency, span: start.merge(&end) })
    }

    fn parse_calibrate_method(&mut self) -> ParseResult<CalibrateMethod> {
        let (s, span) = self.expect_string().or_else(|_| {
            let field = self.expect_field_name()?;
            Ok::<_, ParseError>((field, self.peek().span))
        })?;
        match s.as_str() {
            "bayesian_update" => Ok(CalibrateMethod::BayesianUpdate),
            "maximum_likelihood" => Ok(CalibrateMethod::MaximumLikelihood),
            "ensemble" => Ok(CalibrateMethod::Ensemble),
            other => {
                self.diagnostics.push(
                    Diagnostic::warning("W003", format!("unknown calibration method `{other}`, defaulting to bayesian_update"))
                        .with_span(span),
                );
                Ok(CalibrateMethod::BayesianUpdate)
            }
        }
    }

    // --- watch ------------------------------------------------------------

    fn parse_watch(&mut self) -> ParseResult<Watch> {
        let start = self.expect(&TokenKind::Watch, "'watch'")?.span;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut rules = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            rules.push(self.parse_watch_rule()?);
        }
        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(Watch { rules, span: start.merge(&end) })
    }

    fn parse_watch_rule(&mut self) -> ParseResult<WatchRule> {
        let start_tok = self.peek().clone();
        let severity = match &start_tok.kind {
            TokenKind::Warn => WatchSeverity::Warn,
            TokenKind::Error => WatchSeverity::Error,
            _ => return Err(self.error("'warn' or 'error'")),
        };
        self.advance();
        self.expect(&TokenKind::When, "'when'")?;
        self.expect_colon()?;
        let condition = self.parse_expr()?;
        let span = start_tok.span.merge(&condition.span);
        Ok(WatchRule { severity, condition, span })
    }

    // --- simulate ------------------------------------------------------------

    fn parse_simulate(&mut self) -> ParseResult<Simulate> {
        let start = self.expect(&TokenKind::Simulate, "'simulate'")?.span;
        self.expect(&TokenKind::LBrace, "'{'")?;

        let mut runs = None;
        let mut seed = None;
        let mut percentiles = None;
        let mut convergence = None;

        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let field = self.expect_field_name()?;
            self.expect_colon()?;
            match field.as_str() {
                "runs" => runs = Some(self.parse_int_literal()? as u32),
                "seed" => seed = Some(self.parse_int_literal()? as u64),
                "percentiles" => percentiles = Some(self.parse_number_list()?),
                "convergence" => convergence = Some(self.parse_float_literal()?),
                _ => {
                    self.diagnostics.push(Diagnostic::warning(
                        "W001",
                        format!("unknown simulate field `{field}`, ignoring"),
                    ));
                    self.skip_one_value();
                }
            }
        }

        let end = self.expect(&TokenKind::RBrace, "'}'")?.span;
        Ok(Simulate { runs, seed, percentiles, convergence, span: start.merge(&end) })
    }

    // --- literal / list helpers ------------------------------------------------

    fn parse_float_literal(&mut self) -> ParseResult<f64> {
        let expr = self.parse_expr()?;
        Ok(literal_to_f64(&expr))
    }

    fn parse_int_literal(&mut self) -> ParseResult<i64> {
        let (n, _) = self.expect_integer()?;
        Ok(n)
    }

    fn parse_bool_literal(&mut self) -> ParseResult<bool> {
        match self.peek_kind() {
            TokenKind::True => {
                self.advance();
                Ok(true)
            }
            TokenKind::False => {
                self.advance();
                Ok(false)
            }
            _ => Err(self.error("boolean literal")),
        }
    }

    fn parse_string_list(&mut self) -> ParseResult<Vec<String>> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut out = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            out.push(self.expect_string()?.0);
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(out)
    }

    fn parse_identifier_list(&mut self) -> ParseResult<Vec<String>> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut out = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            out.push(self.expect_field_name()?);
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(out)
    }

    fn parse_number_list(&mut self) -> ParseResult<Vec<f64>> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut out = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.is_at_end() {
            out.push(self.parse_float_literal()?);
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(out)
    }

    /// Best-effort skip of one unrecognised field's value, so an unknown key
    /// does not desynchronise the rest of the enclosing block.
    fn skip_one_value(&mut self) {
        if self.check(&TokenKind::LBracket) || self.check(&TokenKind::LBrace) {
            let (open, close) = if self.check(&TokenKind::LBracket) {
                (TokenKind::LBracket, TokenKind::RBracket)
            } else {
                (TokenKind::LBrace, TokenKind::RBrace)
            };
            let mut depth = 0;
            loop {
                if self.check(&open) {
                    depth += 1;
                } else if self.check(&close) {
                    depth -= 1;
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                } else if self.is_at_end() {
                    return;
                }
                self.advance();
            }
        } else {
            self.advance();
        }
    }

    // --- distribution / model expressions --------------------------------

    fn parse_distribution(&mut self) -> ParseResult<Distribution> {
        let expr = self.parse_expr()?;
        match expr.kind {
            ExprKind::Distribution(d) => Ok(d),
            _ => Err(ParseError::UnexpectedToken {
                expected: "distribution expression".to_string(),
                found: "expression".to_string(),
                span: expr.span,
            }),
        }
    }

    fn parse_model(&mut self) -> ParseResult<Model> {
        let expr = self.parse_expr()?;
        match expr.kind {
            ExprKind::Model(m) => Ok(m),
            _ => Err(ParseError::UnexpectedToken {
                expected: "model expression".to_string(),
                found: "expression".to_string(),
                span: expr.span,
            }),
        }
    }

    // --- expression grammar (precedence climbing) --------------------------
    //
    // unary > '^' > '* /' > '+ -' > comparisons > '&&' > '||'

    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.matches_kind(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right) },
                span,
            );
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.matches_kind(&TokenKind::AndAnd) {
            let right = self.parse_comparison()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(
                ExprKind::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right) },
                span,
            );
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::Le => BinaryOp::Le,
                TokenKind::Ge => BinaryOp::Ge,
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::Ne => BinaryOp::Ne,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_power()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            let span = left.span.merge(&right.span);
            left = Expr::new(ExprKind::Binary { op, left: Box::new(left), right: Box::new(right) }, span);
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> ParseResult<Expr> {
        let left = self.parse_unary()?;
        if self.matches_kind(&TokenKind::Caret) {
            let right = self.parse_power()?; // right-associative
            let span = left.span.merge(&right.span);
            return Ok(Expr::new(
                ExprKind::Binary { op: BinaryOp::Pow, left: Box::new(left), right: Box::new(right) },
                span,
            ));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        let op = match tok.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::PlusMinus => Some(UnaryOp::PlusMinus),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = tok.span.merge(&operand.span);
            return Ok(Expr::new(ExprKind::Unary { op, operand: Box::new(operand) }, span));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(n as f64), tok.span))
            }
            TokenKind::Float(n) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(n), tok.span))
            }
            TokenKind::Percentage(p) => {
                self.advance();
                Ok(Expr::new(ExprKind::Percentage(p), tok.span))
            }
            TokenKind::Currency(CurrencyLiteral { value, magnitude, currency }) => {
                self.advance();
                Ok(Expr::new(ExprKind::Currency { value, magnitude, currency }, tok.span))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), tok.span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Boolean(true), tok.span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Boolean(false), tok.span))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Identifier(name), tok.span))
            }
            TokenKind::Normal | TokenKind::Lognormal | TokenKind::Beta | TokenKind::Uniform | TokenKind::Triangular => {
                self.parse_distribution_expr()
            }
            TokenKind::Linear
            | TokenKind::Exponential
            | TokenKind::Logistic
            | TokenKind::Sigmoid
            | TokenKind::Polynomial => self.parse_model_expr(),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            _ => Err(self.error("expression")),
        }
    }

    fn parse_distribution_expr(&mut self) -> ParseResult<Expr> {
        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::Normal => DistributionKind::Normal,
            TokenKind::Lognormal => DistributionKind::Lognormal,
            TokenKind::Beta => DistributionKind::Beta,
            TokenKind::Uniform => DistributionKind::Uniform,
            TokenKind::Triangular => DistributionKind::Triangular,
            _ => unreachable!("caller only dispatches distribution keyword tokens"),
        };
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            params.push(self.parse_expr()?);
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RParen, "')'")?.span;
        let span = tok.span.merge(&end);
        Ok(Expr::new(ExprKind::Distribution(Distribution { kind, params, span }), span))
    }

    fn parse_model_expr(&mut self) -> ParseResult<Expr> {
        let tok = self.advance();
        let kind = match tok.kind {
            TokenKind::Linear => ModelKind::Linear,
            TokenKind::Exponential => ModelKind::Exponential,
            TokenKind::Logistic => ModelKind::Logistic,
            TokenKind::Sigmoid => ModelKind::Sigmoid,
            TokenKind::Polynomial => ModelKind::Polynomial,
            _ => unreachable!("caller only dispatches model keyword tokens"),
        };
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.is_at_end() {
            let name = self.expect_field_name()?;
            self.expect_colon()?;
            if name == "coeffs" {
                let coeffs = self.parse_number_list()?;
                let span = self.peek().span;
                let array_expr = Expr::new(
                    ExprKind::Model(Model {
                        kind: ModelKind::Polynomial,
                        params: coeffs
                            .into_iter()
                            .enumerate()
                            .map(|(i, c)| (format!("c{i}"), Expr::new(ExprKind::Number(c), span)))
                            .collect(),
                        span,
                    }),
                    span,
                );
                params.push((name, array_expr));
            } else {
                let value = self.parse_expr()?;
                params.push((name, value));
            }
            if !self.matches_kind(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.expect(&TokenKind::RParen, "')'")?.span;
        let span = tok.span.merge(&end);
        Ok(Expr::new(ExprKind::Model(Model { kind, params, span }), span))
    }
}

fn literal_to_f64(expr: &Expr) -> f64 {
    match &expr.kind {
        ExprKind::Number(n) => *n,
        ExprKind::Percentage(p) => *p,
        ExprKind::Currency { value, .. } => *value,
        ExprKind::Unary { op: UnaryOp::Neg, operand } => -literal_to_f64(operand),
        _ => 0.0,
    }
}

fn parse_error_to_diagnostic(err: ParseError) -> Diagnostic {
    match err {
        ParseError::UnexpectedToken { expected, found, span } => {
            Diagnostic::error("E100", format!("expected {expected}, found {found}")).with_span(span)
        }
        ParseError::UnexpectedEof => Diagnostic::error("E101", "unexpected end of input"),
    }
}

fn lex_error_to_diagnostic(err: LexError) -> Diagnostic {
    match &err {
        LexError::UnterminatedString(pos) => {
            Diagnostic::error("E001", err.to_string()).with_span(Span::point(*pos))
        }
        LexError::InvalidNumericSuffix(pos) => {
            Diagnostic::error("E002", err.to_string()).with_span(Span::point(*pos))
        }
        LexError::UnexpectedChar(_, pos) => {
            Diagnostic::error("E003", err.to_string()).with_span(Span::point(*pos))
        }
    }
}
