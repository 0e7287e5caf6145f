//! Predicate evaluation for `condition` steps and `filter` operations.

use serde_json::Value;

use crate::models::Predicate;
use crate::workflow::template::Scope;

/// Returns the truthiness of a value: null, false, zero and empty
/// strings or collections are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Compares values, treating numbers by magnitude so `1` equals `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

impl Predicate {
    /// Evaluates the predicate against `scope`.
    ///
    /// Missing paths make comparisons false; `not_equals` on a missing path
    /// is true.
    pub fn evaluate<S: Scope + ?Sized>(&self, scope: &S) -> bool {
        match self {
            Self::Exists { path } => scope.resolve(path).is_some_and(|v| !v.is_null()),
            Self::Truthy { path } => scope.resolve(path).is_some_and(is_truthy),
            Self::Equals { path, value } => scope.resolve(path).is_some_and(|v| values_equal(v, value)),
            Self::NotEquals { path, value } => {
                !scope.resolve(path).is_some_and(|v| values_equal(v, value))
            }
            Self::GreaterThan { path, value } => {
                scope.resolve(path).and_then(Value::as_f64).is_some_and(|n| n > *value)
            }
            Self::LessThan { path, value } => {
                scope.resolve(path).and_then(Value::as_f64).is_some_and(|n| n < *value)
            }
            Self::Contains { path, value } => scope.resolve(path).is_some_and(|v| contains(v, value)),
            Self::All { predicates } => predicates.iter().all(|p| p.evaluate(scope)),
            Self::Any { predicates } => predicates.iter().any(|p| p.evaluate(scope)),
            Self::Not { predicate } => !predicate.evaluate(scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Variables;
    use serde_json::json;

    fn results() -> Variables {
        let Value::Object(map) = json!({
            "score": 7,
            "label": "urgent ticket",
            "tags": ["a", "b"],
            "meta": {"ok": true, "count": 0},
            "nothing": null
        }) else {
            unreachable!()
        };
        map
    }

    fn path(p: &str) -> String {
        p.to_string()
    }

    #[test]
    fn test_exists_and_truthy() {
        let r = results();
        assert!(Predicate::Exists { path: path("score") }.evaluate(&r));
        assert!(!Predicate::Exists { path: path("nothing") }.evaluate(&r));
        assert!(!Predicate::Exists { path: path("missing") }.evaluate(&r));
        assert!(Predicate::Truthy { path: path("meta.ok") }.evaluate(&r));
        assert!(!Predicate::Truthy { path: path("meta.count") }.evaluate(&r));
    }

    #[test]
    fn test_comparisons() {
        let r = results();
        assert!(Predicate::Equals { path: path("score"), value: json!(7.0) }.evaluate(&r));
        assert!(Predicate::NotEquals { path: path("score"), value: json!(8) }.evaluate(&r));
        assert!(Predicate::NotEquals { path: path("missing"), value: json!(8) }.evaluate(&r));
        assert!(Predicate::GreaterThan { path: path("score"), value: 5.0 }.evaluate(&r));
        assert!(!Predicate::LessThan { path: path("score"), value: 5.0 }.evaluate(&r));
        assert!(!Predicate::GreaterThan { path: path("label"), value: 0.0 }.evaluate(&r));
    }

    #[test]
    fn test_contains() {
        let r = results();
        assert!(Predicate::Contains { path: path("label"), value: json!("urgent") }.evaluate(&r));
        assert!(Predicate::Contains { path: path("tags"), value: json!("b") }.evaluate(&r));
        assert!(Predicate::Contains { path: path("meta"), value: json!("ok") }.evaluate(&r));
        assert!(!Predicate::Contains { path: path("tags"), value: json!("z") }.evaluate(&r));
    }

    #[test]
    fn test_combinators() {
        let r = results();
        let high = Predicate::GreaterThan { path: path("score"), value: 5.0 };
        let tagged = Predicate::Contains { path: path("tags"), value: json!("z") };

        assert!(!Predicate::All { predicates: vec![high.clone(), tagged.clone()] }.evaluate(&r));
        assert!(Predicate::Any { predicates: vec![high, tagged.clone()] }.evaluate(&r));
        assert!(Predicate::Not { predicate: Box::new(tagged) }.evaluate(&r));
        assert!(Predicate::All { predicates: vec![] }.evaluate(&r));
    }

    #[test]
    fn test_evaluate_against_element() {
        let element = json!({"price": 12});
        assert!(Predicate::GreaterThan { path: path("price"), value: 10.0 }.evaluate(&element));

        let scalar = json!(3);
        assert!(Predicate::LessThan { path: path(""), value: 4.0 }.evaluate(&scalar));
    }
}
