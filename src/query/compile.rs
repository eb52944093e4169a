//! Rendering query trees into vendor search strings.
use super::{Field, Operator, Query, QueryNode, SingleQuery};

/// Token and clause rules of one vendor's advanced-search syntax.
///
/// Only `name` and `field_token` are required; the provided methods render a
/// field as `TOKEN("a" OR "b")` and a clause as the per-field parts joined by
/// the clause operator, wrapped in parentheses when there is more than one.
pub trait VendorGrammar: Send + Sync {
    fn name(&self) -> &'static str;

    fn operator_token(&self, operator: Operator) -> &'static str {
        match operator {
            Operator::And => "AND",
            Operator::Or => "OR",
        }
    }

    fn field_token(&self, field: Field) -> &'static str;

    fn render_field(&self, field: Field, clause: &SingleQuery) -> String {
        format!("{}({})", self.field_token(field), quoted_terms(self, clause))
    }

    fn render_clause(&self, clause: &SingleQuery) -> String {
        let parts = clause
            .fields()
            .iter()
            .map(|&field| self.render_field(field, clause))
            .collect();
        join_clause_parts(self, clause, parts)
    }
}

/// Render `query` for `grammar`. Nested queries are always parenthesized.
pub fn compile(query: &Query, grammar: &dyn VendorGrammar) -> String {
    let separator = format!(" {} ", grammar.operator_token(query.operator()));
    query
        .children()
        .iter()
        .map(|child| match child {
            QueryNode::Query(inner) => format!("({})", compile(inner, grammar)),
            QueryNode::Single(clause) => grammar.render_clause(clause),
        })
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Terms in double quotes joined by the clause operator. Embedded quotes are
/// passed through unescaped.
pub fn quoted_terms<G: VendorGrammar + ?Sized>(grammar: &G, clause: &SingleQuery) -> String {
    let separator = format!(" {} ", grammar.operator_token(clause.operator()));
    clause
        .terms()
        .iter()
        .map(|term| format!("\"{}\"", term))
        .collect::<Vec<_>>()
        .join(&separator)
}

/// Applies negation to each rendered field and combines them.
pub fn join_clause_parts<G: VendorGrammar + ?Sized>(
    grammar: &G,
    clause: &SingleQuery,
    parts: Vec<String>,
) -> String {
    let parts: Vec<String> = if clause.negated() {
        parts.into_iter().map(|p| format!("NOT {}", p)).collect()
    } else {
        parts
    };
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }
    let separator = format!(" {} ", grammar.operator_token(clause.operator()));
    format!("({})", parts.join(&separator))
}
