use slr_harvest::query::{compile, Field, Operator, Query, QueryError, QueryNode, SingleQuery, Vendor};

const PLC: &str = r#"
query:
  queries:
    - fields: [title, abstract, keywords]
      terms: [PLC]
      operator: or
"#;

const NESTED: &str = r#"
operator: and
queries:
  - fields: [title]
    terms: [PLC, "programmable logic controller"]
  - operator: or
    queries:
      - fields: [abstract]
        terms: [testing]
      - fields: [keywords]
        terms: [verification]
        negated: true
"#;

fn balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    depth == 0
}

#[test]
fn compiling_twice_gives_the_same_string() {
    let query = Query::from_yaml_str(NESTED).unwrap();
    for vendor in Vendor::ALL {
        assert_eq!(
            compile(&query, vendor.grammar()),
            compile(&query, vendor.grammar()),
            "{vendor}"
        );
    }
}

#[test]
fn scopus_collapses_plc_scenario() {
    let query = Query::from_yaml_str(PLC).unwrap();
    let compiled = compile(&query, Vendor::Scopus.grammar());
    assert_eq!(compiled, r#"TITLE-ABS-KEY("PLC")"#);
    for token in ["TITLE(", "ABS(", "AUTHKEY("] {
        assert!(!compiled.contains(token), "{compiled}");
    }
}

#[test]
fn nested_query_is_one_parenthesized_group() {
    let query = Query::from_yaml_str(NESTED).unwrap();

    let scopus = compile(&query, Vendor::Scopus.grammar());
    assert_eq!(
        scopus,
        r#"TITLE("PLC" OR "programmable logic controller") AND (ABS("testing") OR NOT AUTHKEY("verification"))"#
    );

    let ieee = compile(&query, Vendor::Ieee.grammar());
    assert_eq!(
        ieee,
        r#"("Document Title":"PLC" OR "Document Title":"programmable logic controller") AND (("Abstract":"testing") OR NOT ("Author Keywords":"verification"))"#
    );

    let acm = compile(&query, Vendor::Acm.grammar());
    assert_eq!(
        acm,
        r#"ContentGroupTitle:("PLC" OR "programmable logic controller") AND (Abstract:("testing") OR NOT Keyword:("verification"))"#
    );

    for compiled in [scopus, ieee, acm] {
        assert!(balanced(&compiled), "{compiled}");
    }
}

#[test]
fn programmatic_and_parsed_trees_agree() {
    let clause = SingleQuery::new(
        Operator::Or,
        false,
        [Field::Title, Field::Abstract, Field::Keywords],
        ["PLC"],
    )
    .unwrap();
    let built = Query::new(Operator::And, vec![QueryNode::from(clause)]);
    assert_eq!(built, Query::from_yaml_str(PLC).unwrap());
}

#[test]
fn malformed_descriptions_name_the_fragment() {
    let err = Query::from_yaml_str("queries:\n  - fields: [titel]\n    terms: [x]\n").unwrap_err();
    assert!(matches!(err, QueryError::UnknownField { ref value, .. } if value == "titel"));
    assert!(err.to_string().contains("titel"));

    let err = Query::from_yaml_str("queries:\n  - fields: [title]\n").unwrap_err();
    assert!(matches!(err, QueryError::MissingKey { key: "terms", .. }));

    let err =
        Query::from_yaml_str("operator: xor\nqueries:\n  - fields: [title]\n    terms: [x]\n")
            .unwrap_err();
    assert!(err.to_string().contains("xor"));
}
