//! Grammars of the supported search engines.
use std::fmt;
use std::str::FromStr;

use super::compile::{join_clause_parts, quoted_terms, VendorGrammar};
use super::{Field, Operator, SingleQuery};

/// IEEE Xplore command search. Every term carries its field:
/// `("Document Title":"a" OR "Document Title":"b")`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ieee;

impl VendorGrammar for Ieee {
    fn name(&self) -> &'static str {
        "ieee"
    }

    fn field_token(&self, field: Field) -> &'static str {
        match field {
            Field::Title => "\"Document Title\"",
            Field::Abstract => "\"Abstract\"",
            Field::Keywords => "\"Author Keywords\"",
            Field::All => "\"Full Text Only\"",
        }
    }

    fn render_field(&self, field: Field, clause: &SingleQuery) -> String {
        let token = self.field_token(field);
        let separator = format!(" {} ", self.operator_token(clause.operator()));
        let terms = clause
            .terms()
            .iter()
            .map(|term| format!("{}:\"{}\"", token, term))
            .collect::<Vec<_>>()
            .join(&separator);
        format!("({})", terms)
    }
}

/// ACM Digital Library advanced search: `ContentGroupTitle:("a" OR "b")`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Acm;

impl VendorGrammar for Acm {
    fn name(&self) -> &'static str {
        "acm"
    }

    fn field_token(&self, field: Field) -> &'static str {
        match field {
            Field::Title => "ContentGroupTitle",
            Field::Abstract => "Abstract",
            Field::Keywords => "Keyword",
            Field::All => "AllField",
        }
    }

    fn render_field(&self, field: Field, clause: &SingleQuery) -> String {
        format!("{}:({})", self.field_token(field), quoted_terms(self, clause))
    }
}

/// Scopus advanced search: `TITLE("a" OR "b")`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scopus;

impl Scopus {
    pub const TITLE_ABS_KEY: &'static str = "TITLE-ABS-KEY";
    const COMPOSITE: [Field; 3] = [Field::Title, Field::Abstract, Field::Keywords];
}

impl VendorGrammar for Scopus {
    fn name(&self) -> &'static str {
        "scopus"
    }

    fn field_token(&self, field: Field) -> &'static str {
        match field {
            Field::Title => "TITLE",
            Field::Abstract => "ABS",
            Field::Keywords => "AUTHKEY",
            Field::All => "ALL",
        }
    }

    fn render_clause(&self, clause: &SingleQuery) -> String {
        let parts = if clause.operator() == Operator::Or
            && clause.has_exactly_fields(&Self::COMPOSITE)
        {
            vec![format!(
                "{}({})",
                Self::TITLE_ABS_KEY,
                quoted_terms(self, clause)
            )]
        } else {
            clause
                .fields()
                .iter()
                .map(|&field| self.render_field(field, clause))
                .collect()
        };
        join_clause_parts(self, clause, parts)
    }
}

/// Vendors a query can be compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    Ieee,
    Acm,
    Scopus,
}

impl Vendor {
    pub const ALL: [Vendor; 3] = [Vendor::Scopus, Vendor::Ieee, Vendor::Acm];

    pub fn grammar(&self) -> &'static dyn VendorGrammar {
        match self {
            Vendor::Ieee => &Ieee,
            Vendor::Acm => &Acm,
            Vendor::Scopus => &Scopus,
        }
    }

    pub fn name(&self) -> &'static str {
        self.grammar().name()
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Vendor::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown vendor '{}'", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{compile, Query};

    fn clause(op: Operator, negated: bool, fields: &[Field], terms: &[&str]) -> SingleQuery {
        SingleQuery::new(op, negated, fields.iter().copied(), terms.iter().copied()).unwrap()
    }

    #[test]
    fn ieee_prefixes_each_term() {
        let c = clause(Operator::Or, false, &[Field::Title], &["PLC", "IEC 61131"]);
        assert_eq!(
            Ieee.render_clause(&c),
            r#"("Document Title":"PLC" OR "Document Title":"IEC 61131")"#
        );
    }

    #[test]
    fn ieee_negated_multi_field() {
        let c = clause(Operator::And, true, &[Field::Abstract, Field::Keywords], &["x"]);
        assert_eq!(
            Ieee.render_clause(&c),
            r#"(NOT ("Abstract":"x") AND NOT ("Author Keywords":"x"))"#
        );
    }

    #[test]
    fn acm_uses_colon_syntax() {
        let c = clause(Operator::Or, false, &[Field::Title, Field::All], &["a", "b"]);
        assert_eq!(
            Acm.render_clause(&c),
            r#"(ContentGroupTitle:("a" OR "b") OR AllField:("a" OR "b"))"#
        );
    }

    #[test]
    fn scopus_collapses_title_abstract_keywords_under_or() {
        let c = clause(
            Operator::Or,
            false,
            &[Field::Keywords, Field::Title, Field::Abstract],
            &["PLC"],
        );
        assert_eq!(Scopus.render_clause(&c), r#"TITLE-ABS-KEY("PLC")"#);

        let negated = clause(
            Operator::Or,
            true,
            &[Field::Title, Field::Abstract, Field::Keywords],
            &["a", "b"],
        );
        assert_eq!(
            Scopus.render_clause(&negated),
            r#"NOT TITLE-ABS-KEY("a" OR "b")"#
        );
    }

    #[test]
    fn scopus_keeps_fields_under_and_or_partial_sets() {
        let and = clause(
            Operator::And,
            false,
            &[Field::Title, Field::Abstract, Field::Keywords],
            &["a"],
        );
        assert_eq!(
            Scopus.render_clause(&and),
            r#"(TITLE("a") AND ABS("a") AND AUTHKEY("a"))"#
        );

        let partial = clause(Operator::Or, false, &[Field::Title, Field::Abstract], &["a"]);
        assert_eq!(Scopus.render_clause(&partial), r#"(TITLE("a") OR ABS("a"))"#);

        let with_all = clause(
            Operator::Or,
            false,
            &[Field::Title, Field::Abstract, Field::Keywords, Field::All],
            &["a"],
        );
        assert!(Scopus.render_clause(&with_all).contains("ALL(\"a\")"));
    }

    #[test]
    fn vendor_names_round_trip() {
        for vendor in Vendor::ALL {
            assert_eq!(vendor.name().parse::<Vendor>().unwrap(), vendor);
        }
        assert_eq!("IEEE".parse::<Vendor>().unwrap(), Vendor::Ieee);
        assert!("springer".parse::<Vendor>().is_err());
    }

    #[test]
    fn full_tree_for_every_vendor() {
        let query = Query::new(
            Operator::And,
            vec![
                clause(Operator::Or, false, &[Field::Title], &["PLC"]).into(),
                Query::new(
                    Operator::Or,
                    vec![
                        clause(Operator::Or, false, &[Field::Abstract], &["safety"]).into(),
                        clause(Operator::Or, true, &[Field::Keywords], &["survey"]).into(),
                    ],
                )
                .into(),
            ],
        );
        assert_eq!(
            compile(&query, Vendor::Scopus.grammar()),
            r#"TITLE("PLC") AND (ABS("safety") OR NOT AUTHKEY("survey"))"#
        );
        assert_eq!(
            compile(&query, Vendor::Acm.grammar()),
            r#"ContentGroupTitle:("PLC") AND (Abstract:("safety") OR NOT Keyword:("survey"))"#
        );
        assert_eq!(
            compile(&query, Vendor::Ieee.grammar()),
            r#"("Document Title":"PLC") AND (("Abstract":"safety") OR NOT ("Author Keywords":"survey"))"#
        );
    }
}
