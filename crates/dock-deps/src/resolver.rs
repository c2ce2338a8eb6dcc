//! Version specifier parsing and conflict resolution
//!
//! Pure, deterministic, no I/O. The resolution policy is
//! highest-lower-bound-wins: among parseable specifiers, the one whose
//! boundary version is greatest is selected verbatim. This selects, it
//! never synthesizes, and it does not verify that the winner satisfies
//! every contributing constraint; callers must not assume mutual
//! satisfiability.

use std::cmp::Ordering;

use tracing::debug;

use crate::constraint::DependencyConstraint;
use crate::{Error, Result};

/// `(major, minor, patch)` with lexicographic ordering.
///
/// Parsing is deliberately lenient: up to three dot-separated components,
/// each read as its leading digits, missing components defaulting to
/// zero. Python package versions are not semver (`1.2` and `1.2.3rc1`
/// are routine), so strict semver parsing would reject real inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let mut components = input.trim().splitn(3, '.');

        let major = leading_number(components.next()?)?;
        let minor = components.next().and_then(leading_number).unwrap_or(0);
        let patch = components.next().and_then(leading_number).unwrap_or(0);

        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

fn leading_number(component: &str) -> Option<u64> {
    let digits: String = component
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Comparison operators, in the priority order used for boundary
/// extraction: `>=, >, ==, <=, <`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Ge,
    Gt,
    Eq,
    Le,
    Lt,
}

impl CompareOp {
    const PRIORITY_ORDER: &'static [(&'static str, CompareOp)] = &[
        (">=", CompareOp::Ge),
        (">", CompareOp::Gt),
        ("==", CompareOp::Eq),
        ("<=", CompareOp::Le),
        ("<", CompareOp::Lt),
    ];

    /// Parse-order table: two-character operators before their prefixes.
    const PARSE_ORDER: &'static [(&'static str, CompareOp)] = &[
        (">=", CompareOp::Ge),
        ("<=", CompareOp::Le),
        ("==", CompareOp::Eq),
        (">", CompareOp::Gt),
        ("<", CompareOp::Lt),
    ];
}

/// One `op version` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Comparator {
    pub op: CompareOp,
    pub version: VersionTriple,
}

/// A parsed specifier set: the comma-separated conjunction of clauses.
///
/// An empty specifier parses to an empty set, which admits every version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecifierSet {
    comparators: Vec<Comparator>,
}

impl SpecifierSet {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut comparators = Vec::new();
        for clause in raw.split(',') {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            comparators.push(parse_clause(clause)?);
        }
        Some(Self { comparators })
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }

    /// True iff some version satisfies both sets.
    ///
    /// Bounds are evaluated over the continuous version domain: between
    /// any two distinct triples further releases can exist, so strict
    /// adjacent bounds like `>1.0` and `<1.1` still intersect.
    pub fn intersects(&self, other: &SpecifierSet) -> bool {
        let combined: Vec<Comparator> = self
            .comparators
            .iter()
            .chain(other.comparators.iter())
            .copied()
            .collect();
        feasible(&combined)
    }
}

fn parse_clause(clause: &str) -> Option<Comparator> {
    for (token, op) in CompareOp::PARSE_ORDER {
        if let Some(rest) = clause.strip_prefix(token) {
            let version = VersionTriple::parse(rest)?;
            return Some(Comparator { op: *op, version });
        }
    }
    None
}

#[derive(Debug, Clone, Copy)]
struct Bound {
    version: VersionTriple,
    inclusive: bool,
}

/// Feasibility of a conjunction of comparators.
fn feasible(comparators: &[Comparator]) -> bool {
    let mut lower: Option<Bound> = None;
    let mut upper: Option<Bound> = None;
    let mut pinned: Option<VersionTriple> = None;

    for cmp in comparators {
        match cmp.op {
            CompareOp::Ge | CompareOp::Gt => {
                let bound = Bound {
                    version: cmp.version,
                    inclusive: cmp.op == CompareOp::Ge,
                };
                lower = Some(match lower {
                    None => bound,
                    Some(current) => tighter(current, bound, Ordering::Greater),
                });
            }
            CompareOp::Le | CompareOp::Lt => {
                let bound = Bound {
                    version: cmp.version,
                    inclusive: cmp.op == CompareOp::Le,
                };
                upper = Some(match upper {
                    None => bound,
                    Some(current) => tighter(current, bound, Ordering::Less),
                });
            }
            CompareOp::Eq => match pinned {
                None => pinned = Some(cmp.version),
                Some(existing) if existing != cmp.version => return false,
                Some(_) => {}
            },
        }
    }

    if let Some(version) = pinned {
        return within(version, lower, upper);
    }

    match (lower, upper) {
        (Some(lo), Some(hi)) => match lo.version.cmp(&hi.version) {
            Ordering::Less => true,
            Ordering::Equal => lo.inclusive && hi.inclusive,
            Ordering::Greater => false,
        },
        _ => true,
    }
}

fn tighter(current: Bound, candidate: Bound, keep: Ordering) -> Bound {
    match candidate.version.cmp(&current.version) {
        ordering if ordering == keep => candidate,
        Ordering::Equal if !candidate.inclusive => candidate,
        _ => current,
    }
}

fn within(version: VersionTriple, lower: Option<Bound>, upper: Option<Bound>) -> bool {
    if let Some(lo) = lower {
        match version.cmp(&lo.version) {
            Ordering::Less => return false,
            Ordering::Equal if !lo.inclusive => return false,
            _ => {}
        }
    }
    if let Some(hi) = upper {
        match version.cmp(&hi.version) {
            Ordering::Greater => return false,
            Ordering::Equal if !hi.inclusive => return false,
            _ => {}
        }
    }
    true
}

/// Boundary version used to rank a specifier: the operand of its first
/// comparison operator in priority order `>=, >, ==, <=, <`. Falls back
/// to the zero triple when no operand parses.
pub fn boundary_version(specifier: &str) -> VersionTriple {
    for (token, _) in CompareOp::PRIORITY_ORDER {
        if let Some(idx) = specifier.find(token) {
            let rest = &specifier[idx + token.len()..];
            let operand = rest.split(',').next().unwrap_or("").trim();
            return VersionTriple::parse(operand).unwrap_or_default();
        }
    }
    VersionTriple::default()
}

/// Resolve competing constraints for one package.
///
/// Zero constraints resolve to `None`; a single constraint is returned
/// unchanged. With several, unparsable specifiers are discarded; if none
/// parse the package is unresolvable. Among the parseable ones the
/// highest boundary version wins, ties going to the earliest input.
pub fn resolve(constraints: &[DependencyConstraint]) -> Result<Option<String>> {
    match constraints {
        [] => Ok(None),
        [only] => Ok(Some(only.specifier.clone())),
        _ => {
            let mut best: Option<(VersionTriple, &DependencyConstraint)> = None;
            for constraint in constraints {
                if SpecifierSet::parse(&constraint.specifier).is_none() {
                    debug!(
                        specifier = %constraint.specifier,
                        plugin = %constraint.source_plugin,
                        "discarding unparsable specifier"
                    );
                    continue;
                }
                let boundary = boundary_version(&constraint.specifier);
                let replace = match &best {
                    None => true,
                    Some((current, _)) => boundary > *current,
                };
                if replace {
                    best = Some((boundary, constraint));
                }
            }

            match best {
                Some((_, winner)) => Ok(Some(winner.specifier.clone())),
                None => Err(Error::UnresolvableVersion {
                    package: constraints[0].package.clone(),
                }),
            }
        }
    }
}

/// True iff the two specifiers can be satisfied by a common version.
///
/// Unparsable input is never compatible.
pub fn is_compatible(a: &str, b: &str) -> bool {
    match (SpecifierSet::parse(a), SpecifierSet::parse(b)) {
        (Some(left), Some(right)) => left.intersects(&right),
        _ => false,
    }
}
