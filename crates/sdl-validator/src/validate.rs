use crate::graph::CausalGraph;
use crate::symbol::{SymbolKind, SymbolTable};
use sdl_core::{Diagnostic, Diagnostics};
use sdl_parser::{
    BinaryOp, CalibrateMethod, Declaration, Distribution, DistributionKind, Expr, ExprKind,
    Scenario, Variable,
};

#[derive(Debug)]
pub struct ValidationResult {
    pub valid: bool,
    pub diagnostics: Diagnostics,
    pub symbol_table: SymbolTable,
    pub causal_graph: CausalGraph,
}

/// Runs every check in spec §4.3 (a)-(f) against a parsed scenario and returns
/// the symbol table and causal graph the engine and pulse subsystem consume.
pub fn validate(scenario: &Scenario) -> ValidationResult {
    let mut diagnostics = Diagnostics::new();
    let mut symbols = SymbolTable::new();
    let mut graph = CausalGraph::new();

    if scenario.timeframe.start_year > scenario.timeframe.end_year {
        diagnostics.push(Diagnostic::error(
            "E200",
            format!(
                "scenario timeframe start ({}) must not be after end ({})",
                scenario.timeframe.start_year, scenario.timeframe.end_year
            ),
        ));
    }
    if scenario.timeframe.timestep_count(scenario.resolution) < 2 {
        diagnostics.push(Diagnostic::error(
            "E201",
            "scenario timeframe and resolution must produce at least two timesteps",
        ));
    }

    declare_symbols(&scenario.declarations, &mut symbols, &mut diagnostics);
    build_graph_edges(&scenario.declarations, &mut graph);
    resolve_references(&scenario.declarations, &symbols, &mut diagnostics);
    check_anchor_windows(&scenario.declarations, scenario.timeframe, &mut diagnostics);
    check_boolean_contexts(&scenario.declarations, &mut diagnostics);
    check_distribution_sanity(&scenario.declarations, &mut diagnostics);

    match graph.topological_sort() {
        Ok(_) => {}
        Err(cycle) => {
            let mut members = cycle;
            members.sort();
            diagnostics.push(Diagnostic::error(
                "E210",
                format!("cyclic dependency among: {}", members.join(", ")),
            ));
        }
    }

    let valid = !diagnostics.has_errors();
    ValidationResult { valid, diagnostics, symbol_table: symbols, causal_graph: graph }
}

fn declare_symbols(decls: &[Declaration], symbols: &mut SymbolTable, diagnostics: &mut Diagnostics) {
    for decl in decls {
        match decl {
            Declaration::Assumption(a) => {
                if !symbols.declare(&a.name, SymbolKind::Assumption) {
                    diagnostics.push(duplicate_name_error(&a.name));
                }
            }
            Declaration::Parameter(p) => {
                if !symbols.declare(&p.name, SymbolKind::Parameter) {
                    diagnostics.push(duplicate_name_error(&p.name));
                }
            }
            Declaration::Variable(v) => {
                if !symbols.declare(&v.name, SymbolKind::Variable) {
                    diagnostics.push(duplicate_name_error(&v.name));
                }
            }
            Declaration::Impact(i) => {
                if !symbols.declare(&i.name, SymbolKind::Impact) {
                    diagnostics.push(duplicate_name_error(&i.name));
                }
            }
            Declaration::Branch(b) => {
                if !symbols.declare_branch(&b.name) {
                    diagnostics.push(duplicate_name_error(&b.name));
                }
                declare_symbols(&b.declarations, symbols, diagnostics);
            }
            Declaration::Calibrate(_) | Declaration::Watch(_) | Declaration::Simulate(_) => {}
        }
    }
}

fn duplicate_name_error(name: &str) -> Diagnostic {
    Diagnostic::error("E202", format!("duplicate declaration name `{name}`"))
}

fn build_graph_edges(decls: &[Declaration], graph: &mut CausalGraph) {
    for decl in decls {
        match decl {
            Declaration::Assumption(a) => {
                graph.add_node(&a.name);
                if let Some(watch) = &a.watch {
                    for rule in &watch.rules {
                        add_expr_edges(graph, &a.name, &rule.condition);
                    }
                }
            }
            Declaration::Parameter(p) => graph.add_node(&p.name),
            Declaration::Variable(v) => {
                graph.add_node(&v.name);
                for dep in &v.depends_on {
                    graph.add_edge(&v.name, &dep.name);
                }
                for (_, expr) in &v.timeseries {
                    add_expr_edges(graph, &v.name, expr);
                }
                if let Some(model) = &v.model {
                    for (_, expr) in &model.params {
                        add_expr_edges(graph, &v.name, expr);
                    }
                }
            }
            Declaration::Impact(i) => {
                graph.add_node(&i.name);
                for dep in &i.derives_from {
                    graph.add_edge(&i.name, dep);
                }
                add_expr_edges(graph, &i.name, &i.formula);
            }
            Declaration::Branch(b) => {
                // The branch itself is a causal-graph node: its `when`
                // condition depends on whatever identifiers it references,
                // so the engine must resolve those before evaluating it.
                graph.add_node(&b.name);
                add_expr_edges(graph, &b.name, &b.when);
                build_graph_edges(&b.declarations, graph);
            }
            Declaration::Calibrate(_) | Declaration::Watch(_) | Declaration::Simulate(_) => {}
        }
    }
}

fn add_expr_edges(graph: &mut CausalGraph, owner: &str, expr: &Expr) {
    let mut free = Vec::new();
    expr.free_identifiers(&mut free);
    for name in free {
        graph.add_edge(owner, &name);
    }
}

fn resolve_references(decls: &[Declaration], symbols: &SymbolTable, diagnostics: &mut Diagnostics) {
    for decl in decls {
        match decl {
            Declaration::Variable(v) => {
                for dep in &v.depends_on {
                    if !symbols.contains(&dep.name) {
                        diagnostics.push(unknown_name_error(&dep.name, &v.name));
                    }
                }
                for (_, expr) in &v.timeseries {
                    check_expr_references(expr, symbols, &v.name, diagnostics);
                }
            }
            Declaration::Impact(i) => {
                for dep in &i.derives_from {
                    if !symbols.contains(dep) {
                        diagnostics.push(unknown_name_error(dep, &i.name));
                    }
                }
                check_expr_references(&i.formula, symbols, &i.name, diagnostics);
            }
            Declaration::Branch(b) => {
                check_expr_references(&b.when, symbols, &b.name, diagnostics);
                resolve_references(&b.declarations, symbols, diagnostics);
            }
            Declaration::Calibrate(c) => {
                if !symbols.contains(&c.target) {
                    diagnostics.push(unknown_name_error(&c.target, "calibrate"));
                }
            }
            Declaration::Assumption(a) => {
                if let Some(watch) = &a.watch {
                    for rule in &watch.rules {
                        check_expr_references(&rule.condition, symbols, &a.name, diagnostics);
                    }
                }
            }
            Declaration::Parameter(_) | Declaration::Watch(_) | Declaration::Simulate(_) => {}
        }
    }
}

fn check_expr_references(expr: &Expr, symbols: &SymbolTable, context: &str, diagnostics: &mut Diagnostics) {
    let mut free = Vec::new();
    expr.free_identifiers(&mut free);
    for name in free {
        // `actual` and `assumed` are bound by the watchdog evaluator, not by
        // scenario declarations; they resolve outside the symbol table.
        if name == "actual" || name == "assumed" {
            continue;
        }
        if !symbols.contains(&name) {
            diagnostics.push(unknown_name_error(&name, context));
        }
    }
}

fn unknown_name_error(name: &str, context: &str) -> Diagnostic {
    Diagnostic::error("E203", format!("unknown identifier `{name}` referenced from `{context}`"))
}

fn check_anchor_windows(
    decls: &[Declaration],
    window: sdl_parser::TimeWindow,
    diagnostics: &mut Diagnostics,
) {
    for decl in decls {
        match decl {
            Declaration::Variable(v) => check_variable_anchor_window(v, window, diagnostics),
            Declaration::Branch(b) => check_anchor_windows(&b.declarations, window, diagnostics),
            _ => {}
        }
    }
}

fn check_variable_anchor_window(v: &Variable, window: sdl_parser::TimeWindow, diagnostics: &mut Diagnostics) {
    for (year, _) in &v.timeseries {
        if *year < window.start_year || *year > window.end_year {
            diagnostics.push(
                Diagnostic::error(
                    "E204",
                    format!(
                        "anchor year {year} on variable `{}` lies outside the scenario window [{}, {}]",
                        v.name, window.start_year, window.end_year
                    ),
                )
                .with_span(v.span),
            );
        }
    }
}

fn check_boolean_contexts(decls: &[Declaration], diagnostics: &mut Diagnostics) {
    for decl in decls {
        match decl {
            Declaration::Branch(b) => {
                check_expr_is_boolean(&b.when, "branch condition", diagnostics);
                check_boolean_contexts(&b.declarations, diagnostics);
            }
            Declaration::Assumption(a) => {
                if let Some(watch) = &a.watch {
                    for rule in &watch.rules {
                        check_expr_is_boolean(&rule.condition, "watch rule condition", diagnostics);
                    }
                }
            }
            _ => {}
        }
    }
}

/// A best-effort structural check: the top-level operator of a boolean-context
/// expression should be a comparison or logical operator, not pure arithmetic.
fn check_expr_is_boolean(expr: &Expr, context: &str, diagnostics: &mut Diagnostics) {
    let is_boolean_shaped = matches!(
        &expr.kind,
        ExprKind::Boolean(_)
            | ExprKind::Binary {
                op: BinaryOp::Lt
                    | BinaryOp::Gt
                    | BinaryOp::Le
                    | BinaryOp::Ge
                    | BinaryOp::Eq
                    | BinaryOp::Ne
                    | BinaryOp::And
                    | BinaryOp::Or,
                ..
            }
    );
    if !is_boolean_shaped {
        diagnostics.push(
            Diagnostic::error("E205", format!("{context} must be a boolean-producing expression")).with_span(expr.span),
        );
    }
}

fn check_distribution_sanity(decls: &[Declaration], diagnostics: &mut Diagnostics) {
    for decl in decls {
        match decl {
            Declaration::Assumption(a) => {
                if let Some(d) = &a.uncertainty {
                    check_distribution(d, diagnostics);
                }
            }
            Declaration::Variable(v) => {
                if let Some(d) = &v.uncertainty {
                    check_distribution(d, diagnostics);
                }
            }
            Declaration::Calibrate(c) => {
                if let Some(d) = &c.prior {
                    check_distribution(d, diagnostics);
                }
                if c.method == CalibrateMethod::BayesianUpdate && c.prior.is_none() {
                    diagnostics.push(Diagnostic::warning(
                        "W010",
                        format!("calibrate `{}` uses bayesian_update with no declared prior distribution", c.target),
                    ));
                }
            }
            Declaration::Branch(b) => check_distribution_sanity(&b.declarations, diagnostics),
            _ => {}
        }
    }
}

fn check_distribution(d: &Distribution, diagnostics: &mut Diagnostics) {
    let count = d.params.len();
    let ok = match d.kind {
        DistributionKind::Normal => count == 1 || count == 2,
        DistributionKind::Lognormal => count == 2,
        DistributionKind::Beta => count == 2 && d.params.iter().all(is_positive_literal),
        DistributionKind::Uniform => count == 2,
        DistributionKind::Triangular => count == 3,
    };
    if !ok {
        diagnostics.push(
            Diagnostic::error(
                "E206",
                format!("distribution {:?} called with an invalid argument list ({count} argument(s))", d.kind),
            )
            .with_span(d.span),
        );
    }
}

fn is_positive_literal(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Number(n) => *n > 0.0,
        ExprKind::Percentage(p) => *p > 0.0,
        _ => true, // non-literal arguments (e.g. identifiers) are checked at eval time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdl_parser::parse;

    fn validate_src(src: &str) -> ValidationResult {
        let (scenario, diags) = parse(src);
        assert!(!diags.has_errors(), "parse errors: {diags:?}");
        validate(&scenario.unwrap())
    }

    #[test]
    fn minimal_scenario_is_valid() {
        let result = validate_src(
            r#"
            scenario "M" {
                timeframe: 2025 -> 2030
                variable x { 2025: 100 2030: 200 uncertainty: normal(±10%) }
                simulate { runs: 100 seed: 42 }
            }
            "#,
        );
        assert!(result.valid, "{:?}", result.diagnostics);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = validate_src(
            r#"
            scenario "D" {
                timeframe: 2025 -> 2030
                variable x { 2025: 1 2030: 2 }
                parameter x { value: 1 }
                simulate { runs: 1 seed: 1 }
            }
            "#,
        );
        assert!(!result.valid);
        assert!(result.diagnostics.errors().any(|d| d.code == "E202"));
    }

    #[test]
    fn unknown_identifier_in_formula_fails_validation() {
        let result = validate_src(
            r#"
            scenario "U" {
                timeframe: 2025 -> 2030
                variable x { 2025: 1 2030: 2 }
                impact total { formula: x + missing_thing }
                simulate { runs: 1 seed: 1 }
            }
            "#,
        );
        assert!(!result.valid);
        assert!(result.diagnostics.errors().any(|d| d.code == "E203"));
    }

    #[test]
    fn cyclic_dependency_is_detected() {
        let result = validate_src(
            r#"
            scenario "Cyc" {
                timeframe: 2025 -> 2030
                variable a { 2025: 1 2030: 2 depends_on: [b] }
                variable b { 2025: 1 2030: 2 depends_on: [a] }
                simulate { runs: 1 seed: 1 }
            }
            "#,
        );
        assert!(!result.valid);
        assert!(result.diagnostics.errors().any(|d| d.code == "E210"));
    }

    #[test]
    fn anchor_outside_window_is_rejected() {
        let result = validate_src(
            r#"
            scenario "W" {
                timeframe: 2025 -> 2030
                variable x { 2020: 1 2030: 2 }
                simulate { runs: 1 seed: 1 }
            }
            "#,
        );
        assert!(!result.valid);
        assert!(result.diagnostics.errors().any(|d| d.code == "E204"));
    }

    #[test]
    fn topological_order_is_available_after_successful_validation() {
        let result = validate_src(
            r#"
            scenario "Order" {
                timeframe: 2025 -> 2030
                parameter p { value: 50 control: slider }
                variable x { 2025: 100 2030: 200 depends_on: [p] }
                impact total { formula: x * 2 derives_from: [x] }
                simulate { runs: 1 seed: 1 }
            }
            "#,
        );
        assert!(result.valid, "{:?}", result.diagnostics);
        let order = result.causal_graph.topological_sort().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("p") < pos("x"));
        assert!(pos("x") < pos("total"));
    }
}
