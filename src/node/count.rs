//! Resolution of a resource's instance count.

use crate::core::address::InstanceKey;
use crate::core::config::ResourceConfig;
use crate::core::error::{EvalError, EvalResult};
use crate::core::expr::{EvalScope, KnownValues, Reference};
use crate::core::types::Value;
use log::debug;

/// How many instances a resource expands to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandCount {
    /// No count declared: one instance without a key
    Single,
    /// `count` declared: instances keyed `0..n`
    Counted(usize),
}

impl ExpandCount {
    /// Number of instances.
    pub fn len(&self) -> usize {
        match self {
            ExpandCount::Single => 1,
            ExpandCount::Counted(n) => *n,
        }
    }

    /// Whether the resource expands to nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Instance keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = InstanceKey> {
        let (single, counted) = match *self {
            ExpandCount::Single => (Some(InstanceKey::NoKey), 0),
            ExpandCount::Counted(n) => (None, n),
        };
        single.into_iter().chain((0..counted).map(InstanceKey::Int))
    }
}

/// Largest count a resource may declare.
pub const MAX_COUNT: usize = 100_000;

/// Determine how many instances a resource expands to.
///
/// In validation mode a count that cannot be known before apply resolves
/// to a single placeholder instance. Every other failure is an
/// invalid-count error.
pub fn resolve_count(
    config: &ResourceConfig,
    values: &KnownValues,
    validate: bool,
) -> EvalResult<ExpandCount> {
    let Some(expr) = &config.count else {
        return Ok(ExpandCount::Single);
    };
    let addr = config.address();

    if expr.references().iter().any(|r| matches!(r, Reference::CountIndex)) {
        return Err(EvalError::invalid_count(
            &addr,
            "count.index cannot be used in the count expression",
        ));
    }

    let value = expr
        .evaluate(values, EvalScope::default())
        .map_err(|e| EvalError::invalid_count(&addr, e))?;

    let n = match value {
        Value::Unknown if validate => {
            debug!("{}: count is unknown, validating a single instance", addr);
            return Ok(ExpandCount::Counted(1));
        }
        Value::Unknown => {
            return Err(EvalError::invalid_count(
                &addr,
                "count cannot be determined until apply",
            ))
        }
        Value::Integer(n) => n,
        Value::Number(f) if f.is_finite() && f.fract() == 0.0 => {
            if f < i64::MIN as f64 || f >= i64::MAX as f64 {
                return Err(EvalError::invalid_count(&addr, format!("{} is out of range", f)));
            }
            f as i64
        }
        Value::Number(f) => {
            return Err(EvalError::invalid_count(
                &addr,
                format!("{} is not a whole number", f),
            ))
        }
        Value::String(ref s) => s.trim().parse::<i64>().map_err(|_| {
            EvalError::invalid_count(&addr, format!("\"{}\" is not a whole number", s))
        })?,
        other => {
            return Err(EvalError::invalid_count(
                &addr,
                format!("a number is required, got {}", other.type_name()),
            ))
        }
    };

    let n = usize::try_from(n).map_err(|_| {
        EvalError::invalid_count(&addr, format!("must not be negative, got {}", n))
    })?;
    if n > MAX_COUNT {
        return Err(EvalError::invalid_count(
            &addr,
            format!("{} exceeds the maximum of {}", n, MAX_COUNT),
        ));
    }
    Ok(ExpandCount::Counted(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::expr::Expr;
    use proptest::prelude::*;

    fn counted(count: Expr) -> ResourceConfig {
        ResourceConfig::managed("aws_instance", "web").with_count(count)
    }

    fn var(name: &str) -> Expr {
        Expr::Reference(Reference::Variable(name.to_string()))
    }

    #[test]
    fn test_no_count_is_single() {
        let config = ResourceConfig::managed("aws_instance", "web");
        let count = resolve_count(&config, &KnownValues::new(), false).unwrap();
        assert_eq!(count, ExpandCount::Single);
        assert_eq!(count.keys().collect::<Vec<_>>(), vec![InstanceKey::NoKey]);
    }

    #[test]
    fn test_literal_and_variable_counts() {
        let values = KnownValues::new()
            .with_variable("n", Value::Integer(3))
            .with_variable("f", Value::Number(2.0))
            .with_variable("s", Value::from("4"));

        let resolve = |e: Expr| resolve_count(&counted(e), &values, false).unwrap();
        assert_eq!(resolve(Expr::literal(0i64)), ExpandCount::Counted(0));
        assert_eq!(resolve(var("n")), ExpandCount::Counted(3));
        assert_eq!(resolve(var("f")), ExpandCount::Counted(2));
        assert_eq!(resolve(var("s")), ExpandCount::Counted(4));
    }

    #[test]
    fn test_unknown_count_in_validation_mode() {
        let config = counted(Expr::Reference(Reference::parse("aws_subnet.all.count").unwrap()));
        let count = resolve_count(&config, &KnownValues::new(), true).unwrap();
        assert_eq!(count, ExpandCount::Counted(1));

        let err = resolve_count(&config, &KnownValues::new(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCount);
        assert!(err.to_string().contains("until apply"));
    }

    #[test]
    fn test_invalid_counts() {
        let values = KnownValues::new()
            .with_variable("neg", Value::Integer(-1))
            .with_variable("frac", Value::Number(1.5))
            .with_variable("word", Value::from("three"))
            .with_variable("flag", Value::Bool(true));

        let cases = vec![
            var("neg"),
            var("frac"),
            var("word"),
            var("flag"),
            var("undeclared"),
            Expr::Literal(Value::Null),
            Expr::Reference(Reference::CountIndex),
        ];
        for expr in cases {
            // Validation mode does not rescue anything but an unknown value
            let err = resolve_count(&counted(expr.clone()), &values, true).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCount, "{:?}", expr);
        }
    }

    #[test]
    fn test_oversized_counts_rejected() {
        let values = KnownValues::new()
            .with_variable("huge", Value::Number(1e19))
            .with_variable("big", Value::Integer(MAX_COUNT as i64 + 1))
            .with_variable("max", Value::Integer(MAX_COUNT as i64));

        for name in ["huge", "big"] {
            let err = resolve_count(&counted(var(name)), &values, true).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidCount, "{}", name);
        }
        let count = resolve_count(&counted(var("max")), &values, false).unwrap();
        assert_eq!(count, ExpandCount::Counted(MAX_COUNT));
    }

    #[test]
    fn test_keys_are_lazy() {
        let mut keys = ExpandCount::Counted(usize::MAX).keys();
        assert_eq!(keys.next(), Some(InstanceKey::Int(0)));
        assert_eq!(keys.next(), Some(InstanceKey::Int(1)));
    }

    proptest! {
        #[test]
        fn test_keys_are_dense(n in 0usize..200) {
            let count = ExpandCount::Counted(n);
            let keys: Vec<InstanceKey> = count.keys().collect();
            prop_assert_eq!(keys.len(), n);
            for (i, key) in keys.iter().enumerate() {
                prop_assert_eq!(*key, InstanceKey::Int(i));
            }
        }
    }
}
