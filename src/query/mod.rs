//! Source-neutral boolean search queries.
//!
//! A [`Query`] is a tree: inner nodes combine children with one [`Operator`],
//! leaves are [`SingleQuery`] clauses that search a set of [`Field`]s for a
//! list of terms. The tree is built once (usually by [`parse`]) and then
//! rendered for each vendor by [`compile`].

pub mod compile;
pub mod parse;
pub mod vendors;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use compile::{compile, VendorGrammar};
pub use parse::load;
pub use vendors::{Acm, Ieee, Scopus, Vendor};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown operator '{value}' in {fragment}")]
    UnknownOperator { value: String, fragment: String },
    #[error("unknown field '{value}' in {fragment}")]
    UnknownField { value: String, fragment: String },
    #[error("missing '{key}' key in {fragment}")]
    MissingKey { key: &'static str, fragment: String },
    #[error("invalid value for '{key}' in {fragment}")]
    InvalidValue { key: &'static str, fragment: String },
    #[error("'{key}' must not be empty in {fragment}")]
    Empty { key: &'static str, fragment: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    And,
    Or,
}

impl Operator {
    /// Case-insensitive `and` / `or`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "and" => Some(Operator::And),
            "or" => Some(Operator::Or),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Abstract,
    Keywords,
    All,
}

impl Field {
    /// Case-insensitive `title` / `abstract` / `keywords` / `all`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "title" => Some(Field::Title),
            "abstract" => Some(Field::Abstract),
            "keywords" => Some(Field::Keywords),
            "all" => Some(Field::All),
            _ => None,
        }
    }
}

/// Leaf clause: `terms` combined with `operator`, searched in every field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleQuery {
    operator: Operator,
    negated: bool,
    fields: Vec<Field>,
    terms: Vec<String>,
}

impl SingleQuery {
    /// Builds a clause. `fields` keeps first-seen order and drops repeats.
    /// Returns `None` when `fields` or `terms` is empty.
    pub fn new<T: Into<String>>(
        operator: Operator,
        negated: bool,
        fields: impl IntoIterator<Item = Field>,
        terms: impl IntoIterator<Item = T>,
    ) -> Option<Self> {
        let mut unique = Vec::new();
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        let terms: Vec<String> = terms.into_iter().map(Into::into).collect();
        if unique.is_empty() || terms.is_empty() {
            return None;
        }
        Some(Self {
            operator,
            negated,
            fields: unique,
            terms,
        })
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn negated(&self) -> bool {
        self.negated
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// True when the clause searches exactly `wanted`, in any order.
    pub fn has_exactly_fields(&self, wanted: &[Field]) -> bool {
        self.fields.len() == wanted.len() && wanted.iter().all(|f| self.fields.contains(f))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryNode {
    Query(Query),
    Single(SingleQuery),
}

impl From<Query> for QueryNode {
    fn from(query: Query) -> Self {
        QueryNode::Query(query)
    }
}

impl From<SingleQuery> for QueryNode {
    fn from(clause: SingleQuery) -> Self {
        QueryNode::Single(clause)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    operator: Operator,
    children: Vec<QueryNode>,
}

impl Query {
    pub fn new(operator: Operator, children: Vec<QueryNode>) -> Self {
        Self { operator, children }
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn children(&self) -> &[QueryNode] {
        &self.children
    }
}
