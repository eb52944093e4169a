//! Query descriptions (YAML or JSON) into [`Query`] trees.
//!
//! Composite nodes look like `{queries: [...], operator?: and|or}` and
//! default to `and`. Clauses look like
//! `{fields: [...], terms: [...], operator?: and|or, negated?: bool}` and
//! default to `or`. A document may wrap the tree in a top-level `query:` key.
use serde_yaml::Value;
use std::fs;
use std::path::Path;

use super::{Field, Operator, Query, QueryError, QueryNode, SingleQuery};

const QUERIES: &str = "queries";
const OPERATOR: &str = "operator";
const FIELDS: &str = "fields";
const TERMS: &str = "terms";
const NEGATED: &str = "negated";

/// Load and validate a query description file.
pub fn load(path: &Path) -> Result<Query, QueryError> {
    let content = fs::read_to_string(path)?;
    Query::from_yaml_str(&content)
}

impl Query {
    pub fn from_yaml_str(content: &str) -> Result<Self, QueryError> {
        let value: Value = serde_yaml::from_str(content)?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        match value.get("query") {
            Some(inner) if value.get(QUERIES).is_none() => parse_query(inner),
            _ => parse_query(value),
        }
    }
}

fn parse_query(value: &Value) -> Result<Query, QueryError> {
    if !value.is_mapping() {
        return Err(QueryError::InvalidValue {
            key: QUERIES,
            fragment: fragment(value),
        });
    }
    let operator = parse_operator(value, Operator::And)?;
    let children = value
        .get(QUERIES)
        .ok_or_else(|| QueryError::MissingKey {
            key: QUERIES,
            fragment: fragment(value),
        })?
        .as_sequence()
        .ok_or_else(|| QueryError::InvalidValue {
            key: QUERIES,
            fragment: fragment(value),
        })?;
    if children.is_empty() {
        return Err(QueryError::Empty {
            key: QUERIES,
            fragment: fragment(value),
        });
    }

    let mut nodes = Vec::with_capacity(children.len());
    for child in children {
        let node = if child.get(QUERIES).is_some() {
            QueryNode::Query(parse_query(child)?)
        } else {
            QueryNode::Single(parse_single(child)?)
        };
        nodes.push(node);
    }
    Ok(Query::new(operator, nodes))
}

fn parse_single(value: &Value) -> Result<SingleQuery, QueryError> {
    if !value.is_mapping() {
        return Err(QueryError::InvalidValue {
            key: FIELDS,
            fragment: fragment(value),
        });
    }

    let negated = match value.get(NEGATED) {
        None => false,
        Some(v) => v.as_bool().ok_or_else(|| QueryError::InvalidValue {
            key: NEGATED,
            fragment: fragment(value),
        })?,
    };
    let operator = parse_operator(value, Operator::Or)?;

    let mut fields = Vec::new();
    for item in sequence(value, FIELDS)? {
        let token = item.as_str().ok_or_else(|| QueryError::InvalidValue {
            key: FIELDS,
            fragment: fragment(value),
        })?;
        let field = Field::parse(token).ok_or_else(|| QueryError::UnknownField {
            value: token.to_string(),
            fragment: fragment(value),
        })?;
        fields.push(field);
    }

    let mut terms = Vec::new();
    for item in sequence(value, TERMS)? {
        terms.push(scalar_to_string(item).ok_or_else(|| QueryError::InvalidValue {
            key: TERMS,
            fragment: fragment(value),
        })?);
    }

    SingleQuery::new(operator, negated, fields, terms).ok_or_else(|| QueryError::Empty {
        key: FIELDS,
        fragment: fragment(value),
    })
}

fn parse_operator(value: &Value, default: Operator) -> Result<Operator, QueryError> {
    let Some(raw) = value.get(OPERATOR) else {
        return Ok(default);
    };
    let token = raw.as_str().ok_or_else(|| QueryError::InvalidValue {
        key: OPERATOR,
        fragment: fragment(value),
    })?;
    Operator::parse(token).ok_or_else(|| QueryError::UnknownOperator {
        value: token.to_string(),
        fragment: fragment(value),
    })
}

fn sequence<'a>(value: &'a Value, key: &'static str) -> Result<&'a Vec<Value>, QueryError> {
    let items = value
        .get(key)
        .ok_or_else(|| QueryError::MissingKey {
            key,
            fragment: fragment(value),
        })?
        .as_sequence()
        .ok_or_else(|| QueryError::InvalidValue {
            key,
            fragment: fragment(value),
        })?;
    if items.is_empty() {
        return Err(QueryError::Empty {
            key,
            fragment: fragment(value),
        });
    }
    Ok(items)
}

// YAML reads `terms: [5G]` fine but `terms: [2020]` as a number.
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn fragment(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_per_level() {
        let query = Query::from_yaml_str(
            r#"
queries:
  - fields: [title]
    terms: [PLC]
"#,
        )
        .unwrap();
        assert_eq!(query.operator(), Operator::And);
        let QueryNode::Single(clause) = &query.children()[0] else {
            panic!("expected clause");
        };
        assert_eq!(clause.operator(), Operator::Or);
        assert!(!clause.negated());
        assert_eq!(clause.fields(), &[Field::Title]);
        assert_eq!(clause.terms(), &["PLC".to_string()]);
    }

    #[test]
    fn nested_queries_and_wrapper_key() {
        let query = Query::from_yaml_str(
            r#"
query:
  operator: OR
  queries:
    - fields: [Title, abstract]
      terms: [a, b]
      operator: and
      negated: true
    - queries:
        - fields: [all]
          terms: [c]
"#,
        )
        .unwrap();
        assert_eq!(query.operator(), Operator::Or);
        assert_eq!(query.children().len(), 2);
        assert!(matches!(query.children()[1], QueryNode::Query(_)));
        let QueryNode::Single(clause) = &query.children()[0] else {
            panic!("expected clause");
        };
        assert!(clause.negated());
        assert_eq!(clause.operator(), Operator::And);
    }

    #[test]
    fn unknown_field_reports_fragment() {
        let err = Query::from_yaml_str("queries: [{fields: [authors], terms: [x]}]").unwrap_err();
        match err {
            QueryError::UnknownField { value, fragment } => {
                assert_eq!(value, "authors");
                assert!(fragment.contains("authors"));
            }
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let err = Query::from_yaml_str("operator: xor\nqueries: [{fields: [title], terms: [x]}]")
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator { ref value, .. } if value == "xor"));
    }

    #[test]
    fn missing_keys_are_rejected() {
        let err = Query::from_yaml_str("queries: [{fields: [title]}]").unwrap_err();
        assert!(matches!(err, QueryError::MissingKey { key: "terms", .. }));

        let err = Query::from_yaml_str("queries: [{terms: [x]}]").unwrap_err();
        assert!(matches!(err, QueryError::MissingKey { key: "fields", .. }));

        let err = Query::from_yaml_str("operator: and").unwrap_err();
        assert!(matches!(err, QueryError::MissingKey { key: "queries", .. }));
    }

    #[test]
    fn negated_must_be_bool() {
        let err = Query::from_yaml_str("queries: [{fields: [title], terms: [x], negated: yes please}]")
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidValue { key: "negated", .. }));
    }

    #[test]
    fn empty_terms_are_rejected() {
        let err = Query::from_yaml_str("queries: [{fields: [title], terms: []}]").unwrap_err();
        assert!(matches!(err, QueryError::Empty { key: "terms", .. }));
    }

    #[test]
    fn numeric_terms_become_strings() {
        let query = Query::from_yaml_str("queries: [{fields: [all], terms: [2020]}]").unwrap();
        let QueryNode::Single(clause) = &query.children()[0] else {
            panic!("expected clause");
        };
        assert_eq!(clause.terms(), &["2020".to_string()]);
    }

    #[test]
    fn load_reads_file() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("query.yml");
        fs::write(&p, "queries: [{fields: [title], terms: [x]}]").unwrap();
        let query = load(&p).unwrap();
        assert_eq!(query.children().len(), 1);
    }
}
