use serde::{Deserialize, Serialize};

use crate::{AttributeValue, Attributes};

/// A boolean condition tree gating experiment eligibility.
///
/// Leaves compare a single user attribute against a match value; inner nodes
/// combine their children with three-valued logic (see [`Ternary`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    /// All children must hold.
    And(Vec<Condition>),
    /// At least one child must hold.
    Or(Vec<Condition>),
    /// The child must not hold.
    Not(Box<Condition>),
    /// Exact equality between the named attribute and the match value.
    Match {
        /// Attribute name to look up in user attributes.
        name: String,
        /// Expected attribute value.
        value: AttributeValue,
    },
}

/// Result of evaluating a condition tree.
///
/// `Unknown` arises when a referenced attribute is absent or a comparison is
/// malformed (e.g., mismatched types). It is deliberately a third state rather
/// than a nullable boolean: combinators must propagate it, and only an exact
/// `True` admits a user into an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ternary {
    True,
    False,
    Unknown,
}

impl From<bool> for Ternary {
    fn from(value: bool) -> Self {
        if value {
            Ternary::True
        } else {
            Ternary::False
        }
    }
}

impl Ternary {
    fn not(self) -> Ternary {
        match self {
            Ternary::True => Ternary::False,
            Ternary::False => Ternary::True,
            Ternary::Unknown => Ternary::Unknown,
        }
    }
}

impl Condition {
    /// Evaluate the condition tree against user attributes.
    ///
    /// Pure function of its inputs; no side effects.
    pub fn eval(&self, attributes: &Attributes) -> Ternary {
        match self {
            Condition::And(children) => {
                let mut result = Ternary::True;
                for child in children {
                    match child.eval(attributes) {
                        Ternary::False => return Ternary::False,
                        Ternary::Unknown => result = Ternary::Unknown,
                        Ternary::True => {}
                    }
                }
                result
            }

            Condition::Or(children) => {
                let mut result = Ternary::False;
                for child in children {
                    match child.eval(attributes) {
                        Ternary::True => return Ternary::True,
                        Ternary::Unknown => result = Ternary::Unknown,
                        Ternary::False => {}
                    }
                }
                result
            }

            Condition::Not(child) => child.eval(attributes).not(),

            Condition::Match { name, value } => match_eval(attributes.get(name), value),
        }
    }
}

/// Compare an attribute against the condition's match value.
///
/// Equality is only defined between values of the same declared type; a
/// missing attribute, a type mismatch, or a null on either side yields
/// `Unknown` rather than `False`.
fn match_eval(attribute: Option<&AttributeValue>, expected: &AttributeValue) -> Ternary {
    let Some(attribute) = attribute else {
        return Ternary::Unknown;
    };
    match (attribute, expected) {
        (AttributeValue::String(a), AttributeValue::String(e)) => (a == e).into(),
        (AttributeValue::Number(a), AttributeValue::Number(e)) => (a == e).into(),
        (AttributeValue::Boolean(a), AttributeValue::Boolean(e)) => (a == e).into(),
        _ => Ternary::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{Condition, Ternary};
    use crate::Attributes;

    fn leaf(name: &str, value: impl Into<crate::AttributeValue>) -> Condition {
        Condition::Match {
            name: name.to_owned(),
            value: value.into(),
        }
    }

    #[test]
    fn match_string() {
        let attributes: Attributes = HashMap::from([("browser_type".to_owned(), "safari".into())]);
        assert_eq!(leaf("browser_type", "safari").eval(&attributes), Ternary::True);
        assert_eq!(leaf("browser_type", "firefox").eval(&attributes), Ternary::False);
    }

    #[test]
    fn match_number_and_boolean() {
        let attributes: Attributes = HashMap::from([
            ("age".to_owned(), 30.0.into()),
            ("is_premium_member".to_owned(), true.into()),
        ]);
        assert_eq!(leaf("age", 30.0).eval(&attributes), Ternary::True);
        assert_eq!(leaf("age", 31.0).eval(&attributes), Ternary::False);
        assert_eq!(leaf("is_premium_member", true).eval(&attributes), Ternary::True);
        assert_eq!(leaf("is_premium_member", false).eval(&attributes), Ternary::False);
    }

    #[test]
    fn missing_attribute_is_unknown() {
        assert_eq!(leaf("age", 30.0).eval(&HashMap::new()), Ternary::Unknown);
    }

    #[test]
    fn type_mismatch_is_unknown() {
        let attributes: Attributes = HashMap::from([("age".to_owned(), "thirty".into())]);
        assert_eq!(leaf("age", 30.0).eval(&attributes), Ternary::Unknown);
    }

    #[test]
    fn null_attribute_is_unknown() {
        let attributes: Attributes =
            HashMap::from([("age".to_owned(), crate::AttributeValue::Null)]);
        assert_eq!(leaf("age", 30.0).eval(&attributes), Ternary::Unknown);
    }

    #[test]
    fn and_truth_table() {
        let attributes: Attributes = HashMap::from([
            ("t".to_owned(), true.into()),
            ("f".to_owned(), false.into()),
        ]);
        let t = || leaf("t", true);
        let f = || leaf("f", true);
        let u = || leaf("missing", true);

        assert_eq!(Condition::And(vec![t(), t()]).eval(&attributes), Ternary::True);
        assert_eq!(Condition::And(vec![t(), f()]).eval(&attributes), Ternary::False);
        assert_eq!(Condition::And(vec![t(), u()]).eval(&attributes), Ternary::Unknown);
        // false wins over unknown
        assert_eq!(Condition::And(vec![u(), f()]).eval(&attributes), Ternary::False);
        // vacuous
        assert_eq!(Condition::And(vec![]).eval(&attributes), Ternary::True);
    }

    #[test]
    fn or_truth_table() {
        let attributes: Attributes = HashMap::from([
            ("t".to_owned(), true.into()),
            ("f".to_owned(), false.into()),
        ]);
        let t = || leaf("t", true);
        let f = || leaf("f", true);
        let u = || leaf("missing", true);

        assert_eq!(Condition::Or(vec![f(), t()]).eval(&attributes), Ternary::True);
        assert_eq!(Condition::Or(vec![f(), f()]).eval(&attributes), Ternary::False);
        assert_eq!(Condition::Or(vec![f(), u()]).eval(&attributes), Ternary::Unknown);
        // true wins over unknown
        assert_eq!(Condition::Or(vec![u(), t()]).eval(&attributes), Ternary::True);
        assert_eq!(Condition::Or(vec![]).eval(&attributes), Ternary::False);
    }

    #[test]
    fn not_truth_table() {
        let attributes: Attributes = HashMap::from([("t".to_owned(), true.into())]);

        assert_eq!(
            Condition::Not(Box::new(leaf("t", true))).eval(&attributes),
            Ternary::False
        );
        assert_eq!(
            Condition::Not(Box::new(leaf("t", false))).eval(&attributes),
            Ternary::True
        );
        // not(unknown) stays unknown
        assert_eq!(
            Condition::Not(Box::new(leaf("missing", true))).eval(&attributes),
            Ternary::Unknown
        );
    }

    #[test]
    fn nested_tree() {
        let attributes: Attributes = HashMap::from([
            ("browser_type".to_owned(), "safari".into()),
            ("age".to_owned(), 30.0.into()),
        ]);
        let tree = Condition::And(vec![
            Condition::Or(vec![
                leaf("browser_type", "safari"),
                leaf("browser_type", "firefox"),
            ]),
            Condition::Not(Box::new(leaf("age", 17.0))),
        ]);
        assert_eq!(tree.eval(&attributes), Ternary::True);
    }

    #[test]
    fn deserializes_from_datafile_shape() {
        let tree: Condition = serde_json::from_str(
            r#"{"and": [
                {"match": {"name": "browser_type", "value": "safari"}},
                {"not": {"match": {"name": "age", "value": 17.0}}}
            ]}"#,
        )
        .unwrap();
        let attributes: Attributes = HashMap::from([
            ("browser_type".to_owned(), "safari".into()),
            ("age".to_owned(), 30.0.into()),
        ]);
        assert_eq!(tree.eval(&attributes), Ternary::True);
    }
}
