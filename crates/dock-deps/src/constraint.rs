//! Dependency constraints parsed from plugin manifests

use std::fmt;

/// Operators recognized in dependency strings, in split order.
///
/// Two-character operators come before their one-character prefixes so
/// `>=` is never misread as `>`.
pub const OPERATORS: &[&str] = &[">=", "==", ">", "<=", "<"];

/// One `(package, version specifier)` requirement contributed by a plugin.
///
/// Immutable value; many constraints may target the same package, one per
/// contributing plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyConstraint {
    pub package: String,
    /// Raw specifier, e.g. `>=1.2.3`; empty for an unconstrained name
    pub specifier: String,
    /// Name of the plugin that declared this constraint
    pub source_plugin: String,
}

impl DependencyConstraint {
    /// Parse a dependency string like `psutil>=7.1.0` or a bare `requests`.
    pub fn parse(dep: &str, source_plugin: &str) -> Self {
        for op in OPERATORS {
            if let Some(idx) = dep.find(op) {
                let (name, rest) = dep.split_at(idx);
                let version = rest[op.len()..].trim();
                return Self {
                    package: name.trim().to_string(),
                    specifier: format!("{op}{version}"),
                    source_plugin: source_plugin.to_string(),
                };
            }
        }
        Self {
            package: dep.trim().to_string(),
            specifier: String::new(),
            source_plugin: source_plugin.to_string(),
        }
    }
}

impl fmt::Display for DependencyConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.package, self.specifier)
    }
}
