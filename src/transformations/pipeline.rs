//! Transformation pipeline.

use super::Transformation;
use crate::error::Result;
use crate::registry::Registry;
use std::borrow::Cow;

/// Transformations applied in order before an operator runs.
#[derive(Clone, Default)]
pub struct TransformationPipeline {
    transformations: Vec<Transformation>,
}

impl TransformationPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `t:` names through the registry.
    ///
    /// `none` discards everything listed before it.
    pub fn from_names<S: AsRef<str>>(names: &[S], registry: &Registry) -> Result<Self> {
        let mut transformations = Vec::with_capacity(names.len());

        for name in names {
            let name = name.as_ref();
            if name.eq_ignore_ascii_case("none") {
                transformations.clear();
                continue;
            }
            transformations.push(registry.transformation(name)?);
        }

        Ok(Self { transformations })
    }

    /// Apply all transformations in sequence.
    pub fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut current = Cow::Borrowed(input);

        for t in &self.transformations {
            current = match current {
                Cow::Borrowed(s) => t.apply(s),
                Cow::Owned(s) => Cow::Owned(t.apply(&s).into_owned()),
            };
        }

        current
    }

    /// Names in application order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transformations.iter().map(|t| t.name())
    }

    /// Check if the pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// Get the number of transformations.
    pub fn len(&self) -> usize {
        self.transformations.len()
    }
}

impl std::fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(&self.transformations).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    fn pipeline(names: &[&str]) -> TransformationPipeline {
        TransformationPipeline::from_names(names, &Registry::default()).unwrap()
    }

    #[test]
    fn test_empty_pipeline() {
        let p = TransformationPipeline::new();
        assert!(matches!(p.apply("hello"), Cow::Borrowed("hello")));
    }

    #[test]
    fn test_order_matters() {
        assert_eq!(pipeline(&["urlDecode", "lowercase"]).apply("HELLO%20WORLD"), "hello world");
        assert_eq!(pipeline(&["lowercase", "base64Encode"]).apply("A"), "YQ==");
        assert_eq!(pipeline(&["base64Encode", "lowercase"]).apply("A"), "qq==");
    }

    #[test]
    fn test_none_clears_pipeline() {
        let p = pipeline(&["lowercase", "none", "uppercase"]);
        assert_eq!(p.len(), 1);
        assert_eq!(p.apply("hello"), "HELLO");
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let p = pipeline(&["URLDECODE", "LowerCase"]);
        assert_eq!(p.names().collect::<Vec<_>>(), vec!["urlDecode", "lowercase"]);
    }

    #[test]
    fn test_unknown_transformation() {
        let err = TransformationPipeline::from_names(&["rot13"], &Registry::default()).unwrap_err();
        assert!(matches!(err, Error::UnknownTransformation { .. }));
    }
}
