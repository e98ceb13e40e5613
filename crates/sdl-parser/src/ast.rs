//! Typed AST for SDL. A sealed sum type per category (`Declaration`, `Expression`,
//! `Distribution`, `Model`) dispatched by exhaustive matching, rather than a class
//! hierarchy. Every node carries a source span through a common header field.

pub use sdl_core::{DistributionKind, ModelKind, Span};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub timeframe: TimeWindow,
    pub resolution: u32,
    pub confidence: Option<f64>,
    pub metadata: Metadata,
    pub declarations: Vec<Declaration>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_year: i32,
    pub end_year: i32,
}

impl TimeWindow {
    pub fn timestep_count(&self, step: u32) -> u32 {
        ((self.end_year - self.start_year) as u32) / step + 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub author: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub category: Option<String>,
}

/// One top-level declaration inside a scenario (or nested inside a branch override).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Declaration {
    Assumption(Assumption),
    Parameter(Parameter),
    Variable(Variable),
    Impact(Impact),
    Branch(Branch),
    Calibrate(Calibrate),
    Watch(Watch),
    Simulate(Simulate),
}

impl Declaration {
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Assumption(d) => Some(&d.name),
            Declaration::Parameter(d) => Some(&d.name),
            Declaration::Variable(d) => Some(&d.name),
            Declaration::Impact(d) => Some(&d.name),
            Declaration::Branch(d) => Some(&d.name),
            Declaration::Calibrate(d) => Some(&d.target),
            Declaration::Watch(_) | Declaration::Simulate(_) => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Declaration::Assumption(d) => d.span,
            Declaration::Parameter(d) => d.span,
            Declaration::Variable(d) => d.span,
            Declaration::Impact(d) => d.span,
            Declaration::Branch(d) => d.span,
            Declaration::Calibrate(d) => d.span,
            Declaration::Watch(d) => d.span,
            Declaration::Simulate(d) => d.span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assumption {
    pub name: String,
    pub value: Expr,
    pub source: Option<String>,
    pub confidence: Option<f64>,
    pub uncertainty: Option<Distribution>,
    pub bind: Option<Bind>,
    pub watch: Option<Watch>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bind {
    pub source_url: String,
    pub field: Option<String>,
    pub fallback_value: Option<f64>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub unit: Option<String>,
    pub control: Option<String>,
    pub label: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Interpolation {
    Linear,
    Spline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub uncertainty: Option<Distribution>,
    pub interpolation: Interpolation,
    pub model: Option<Model>,
    pub timeseries: Vec<(i32, Expr)>,
    pub depends_on: Vec<Dependency>,
    /// Opt-out from the default clamp-to-`>= 0` policy (see spec Open Question b).
    pub non_negative: bool,
    pub span: Span,
}

/// A `depends_on` entry optionally carrying a per-dependency sensitivity
/// coefficient override (default 0.30, applied by the engine's modulation pass).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    pub sensitivity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impact {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub derives_from: Vec<String>,
    pub formula: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    pub when: Expr,
    pub probability: Option<f64>,
    pub declarations: Vec<Declaration>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CalibrateMethod {
    BayesianUpdate,
    MaximumLikelihood,
    Ensemble,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibrate {
    pub target: String,
    pub url: String,
    pub method: CalibrateMethod,
    pub window: Option<String>,
    pub prior: Option<Distribution>,
    pub update_frequency: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WatchSeverity {
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRule {
    pub severity: WatchSeverity,
    pub condition: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watch {
    pub rules: Vec<WatchRule>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulate {
    pub runs: Option<u32>,
    pub seed: Option<u64>,
    pub percentiles: Option<Vec<f64>>,
    pub convergence: Option<f64>,
    pub span: Span,
}

// --- Expression AST -------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Not,
    /// `±` prefix: marks the operand as a *relative* uncertainty magnitude.
    PlusMinus,
}

/// A sampled-from-distribution expression, e.g. `normal(±10%)` or `beta(2, 5)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub kind: DistributionKind,
    pub params: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub kind: ModelKind,
    pub params: Vec<(String, Expr)>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Number(f64),
    Percentage(f64),
    Currency { value: f64, magnitude: Option<char>, currency: Option<String> },
    Str(String),
    Boolean(bool),
    Identifier(String),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Distribution(Distribution),
    Model(Model),
    Conditional { condition: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Free identifiers referenced anywhere within this expression, used by the
    /// validator to build causal-graph edges and by the evaluator for error
    /// reporting context.
    pub fn free_identifiers(&self, out: &mut Vec<String>) {
        match &self.kind {
            ExprKind::Identifier(name) => out.push(name.clone()),
            ExprKind::Binary { left, right, .. } => {
                left.free_identifiers(out);
                right.free_identifiers(out);
            }
            ExprKind::Unary { operand, .. } => operand.free_identifiers(out),
            ExprKind::Distribution(d) => {
                for p in &d.params {
                    p.free_identifiers(out);
                }
            }
            ExprKind::Model(m) => {
                for (_, p) in &m.params {
                    p.free_identifiers(out);
                }
            }
            ExprKind::Conditional { condition, then_branch, else_branch } => {
                condition.free_identifiers(out);
                then_branch.free_identifiers(out);
                else_branch.free_identifiers(out);
            }
            ExprKind::Number(_)
            | ExprKind::Percentage(_)
            | ExprKind::Currency { .. }
            | ExprKind::Str(_)
            | ExprKind::Boolean(_) => {}
        }
    }
}
