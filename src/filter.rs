use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::classfile::{ACC_BRIDGE, ACC_STATIC, ACC_SYNTHETIC};

/// What a method filter gets to see of a method.
#[derive(Debug, Clone, Copy)]
pub struct MethodInfo<'a> {
    pub owner: &'a str,
    pub class_access: u16,
    pub access: u16,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub synthetic_attribute: bool,
    pub generated_enum_method: bool,
    pub in_excluded_origin: bool,
}

impl MethodInfo<'_> {
    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }

    pub fn is_static_initializer(&self) -> bool {
        self.name == "<clinit>"
    }
}

type Predicate = dyn Fn(&MethodInfo<'_>) -> bool + Send + Sync;

/// A composable predicate over methods.
#[derive(Clone)]
pub struct MethodFilter(Arc<Predicate>);

impl MethodFilter {
    pub fn new(f: impl Fn(&MethodInfo<'_>) -> bool + Send + Sync + 'static) -> Self {
        MethodFilter(Arc::new(f))
    }

    pub fn all() -> Self {
        MethodFilter::new(|_| true)
    }

    /// Matches methods whose name is one of `names`.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        MethodFilter::new(move |m| names.contains(m.name))
    }

    pub fn and(self, other: MethodFilter) -> Self {
        MethodFilter::new(move |m| self.matches(m) && other.matches(m))
    }

    pub fn or(self, other: MethodFilter) -> Self {
        MethodFilter::new(move |m| self.matches(m) || other.matches(m))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        MethodFilter::new(move |m| !self.matches(m))
    }

    pub fn matches(&self, method: &MethodInfo<'_>) -> bool {
        (self.0)(method)
    }
}

impl Default for MethodFilter {
    fn default() -> Self {
        MethodFilter::all()
    }
}

impl fmt::Debug for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MethodFilter(..)")
    }
}

pub fn is_synthetic(method: &MethodInfo<'_>) -> bool {
    method.synthetic_attribute || method.access & (ACC_SYNTHETIC | ACC_BRIDGE) != 0
}

pub fn is_generated_enum_method(method: &MethodInfo<'_>) -> bool {
    method.generated_enum_method
}

pub fn is_excluded_origin(method: &MethodInfo<'_>) -> bool {
    method.in_excluded_origin
}

/// Why a method is not offered to any operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Filtered,
    Synthetic,
    GeneratedEnumMethod,
    ExcludedOrigin,
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Exclusion::Filtered => "rejected by method filter",
            Exclusion::Synthetic => "synthetic",
            Exclusion::GeneratedEnumMethod => "generated enum method",
            Exclusion::ExcludedOrigin => "class of excluded origin",
        };
        f.write_str(reason)
    }
}

/// `user AND NOT synthetic AND NOT generated-enum AND NOT excluded-origin`,
/// reporting the first clause that fails.
pub fn check(user: &MethodFilter, method: &MethodInfo<'_>) -> Result<(), Exclusion> {
    if !user.matches(method) {
        return Err(Exclusion::Filtered);
    }
    if is_synthetic(method) {
        return Err(Exclusion::Synthetic);
    }
    if is_generated_enum_method(method) {
        return Err(Exclusion::GeneratedEnumMethod);
    }
    if is_excluded_origin(method) {
        return Err(Exclusion::ExcludedOrigin);
    }
    Ok(())
}

pub fn eligible(user: &MethodFilter, method: &MethodInfo<'_>) -> bool {
    check(user, method).is_ok()
}
