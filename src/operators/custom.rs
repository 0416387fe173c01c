//! Function operators.

use super::OperatorResult;
use std::fmt;
use std::sync::Arc;

/// A compiled function operator: returns the matched value on match.
pub type CustomFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Operator backed by a function with its argument already bound.
#[derive(Clone)]
pub struct CustomOperator {
    name: String,
    func: CustomFn,
}

impl CustomOperator {
    /// Wrap a closure.
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::from_fn(name, Arc::new(func))
    }

    /// Wrap an already shared function.
    pub fn from_fn(name: &str, func: CustomFn) -> Self {
        Self {
            name: name.to_string(),
            func,
        }
    }

    /// Operator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the function.
    pub fn execute(&self, input: &str) -> OperatorResult {
        match (self.func)(input) {
            Some(value) => OperatorResult::matched(value),
            None => OperatorResult::no_match(),
        }
    }
}

impl fmt::Debug for CustomOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomOperator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_operator() {
        let op = CustomOperator::new("isDigits", |s: &str| {
            (!s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())).then(|| s.to_string())
        });
        assert_eq!(op.name(), "isDigits");
        assert_eq!(op.execute("123"), OperatorResult::matched("123"));
        assert!(!op.execute("12a").matched);
    }
}
