//! Transformation/Operator Registry.
//!
//! Rules name transformations (`t:name`) and operators (`@name`) by string.
//! The registry maps those names to functions once, when a ruleset is
//! compiled; nothing is looked up by name while traffic is inspected.

use crate::error::{Error, Result};
use crate::operators::CustomFn;
use crate::transformations::{TransformFn, Transformation, BUILTIN};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a custom operator function from the rule's argument.
pub type CustomOperatorFactory = Arc<dyn Fn(&str) -> Result<CustomFn> + Send + Sync>;

/// Name to function tables used while compiling rules.
#[derive(Clone)]
pub struct Registry {
    transformations: HashMap<String, Transformation>,
    operators: HashMap<String, CustomOperatorFactory>,
}

impl Registry {
    /// A registry with only the built-in transformations.
    pub fn new() -> Self {
        let transformations = BUILTIN
            .iter()
            .map(|t| (t.name().to_ascii_lowercase(), *t))
            .collect();
        Self {
            transformations,
            operators: HashMap::new(),
        }
    }

    /// Register (or replace) a transformation.
    pub fn register_transformation(&mut self, name: &'static str, func: TransformFn) -> &mut Self {
        self.transformations
            .insert(name.to_ascii_lowercase(), Transformation::new(name, func));
        self
    }

    /// Register an operator whose factory compiles the rule argument.
    ///
    /// The factory runs once per rule; its error aborts ruleset compilation.
    pub fn register_operator<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&str) -> Result<CustomFn> + Send + Sync + 'static,
    {
        self.operators
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
        self
    }

    /// Register a `(input, argument) -> bool` operator.
    ///
    /// On match the input is reported as the matched value.
    pub fn register_predicate<F>(&mut self, name: &str, predicate: F) -> &mut Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        self.register_operator(name, move |arg: &str| {
            let predicate = Arc::clone(&predicate);
            let arg = arg.to_string();
            let func: CustomFn =
                Arc::new(move |input: &str| predicate(input, &arg).then(|| input.to_string()));
            Ok(func)
        })
    }

    /// Look up a transformation (case-insensitive).
    pub fn transformation(&self, name: &str) -> Result<Transformation> {
        self.transformations
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownTransformation {
                name: name.to_string(),
            })
    }

    /// Look up a custom operator factory (case-insensitive).
    pub fn operator(&self, name: &str) -> Option<&CustomOperatorFactory> {
        self.operators.get(&name.to_ascii_lowercase())
    }

    /// Names of all registered transformations.
    pub fn transformation_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.transformations.values().map(|t| t.name())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut operators: Vec<_> = self.operators.keys().collect();
        operators.sort();
        f.debug_struct("Registry")
            .field("transformations", &self.transformations.len())
            .field("operators", &operators)
            .finish()
    }
}
