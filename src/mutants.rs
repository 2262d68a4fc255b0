use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A JVM class name, held in internal form (`com/example/Foo`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    /// Accepts either internal (`a/b/C`) or dotted (`a.b.C`) form.
    pub fn new(name: impl AsRef<str>) -> Self {
        ClassName(name.as_ref().replace('.', "/"))
    }

    pub fn as_internal_name(&self) -> &str {
        &self.0
    }

    pub fn as_java_name(&self) -> String {
        self.0.replace('/', ".")
    }

    /// Unqualified name, e.g. `Foo$Inner` for `com/example/Foo$Inner`.
    pub fn simple_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_java_name())
    }
}

impl From<&str> for ClassName {
    fn from(s: &str) -> Self {
        ClassName::new(s)
    }
}

/// Identifies one mutation opportunity.
///
/// `index` counts the candidates the same operator found earlier in the same
/// method, in program order, so two copies of an identical construct (the two
/// physical copies of a `finally` body, say) stay distinguishable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MutationIdentifier {
    pub class: ClassName,
    pub method: String,
    pub descriptor: String,
    pub mutator: String,
    pub index: usize,
}

impl MutationIdentifier {
    pub fn new(
        class: ClassName,
        method: impl Into<String>,
        descriptor: impl Into<String>,
        mutator: impl Into<String>,
        index: usize,
    ) -> Self {
        MutationIdentifier {
            class,
            method: method.into(),
            descriptor: descriptor.into(),
            mutator: mutator.into(),
            index,
        }
    }

    pub fn is_for_method(&self, name: &str, descriptor: &str) -> bool {
        self.method == name && self.descriptor == descriptor
    }
}

/// Canonical form: `com/example/Foo.bar(I)V@MATH#0`.
impl fmt::Display for MutationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}{}@{}#{}",
            self.class.as_internal_name(),
            self.method,
            self.descriptor,
            self.mutator,
            self.index
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid mutation id '{input}': {reason}")]
pub struct ParseIdentifierError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for MutationIdentifier {
    type Err = ParseIdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| ParseIdentifierError { input: s.to_string(), reason };

        let (rest, index) = s.rsplit_once('#').ok_or_else(|| fail("missing '#<index>'"))?;
        let index = index.parse::<usize>().map_err(|_| fail("index is not a number"))?;
        let (location, mutator) = rest.rsplit_once('@').ok_or_else(|| fail("missing '@<mutator>'"))?;
        if mutator.is_empty() {
            return Err(fail("empty mutator id"));
        }
        // Internal class names never contain '.', so the first one ends the class.
        let (class, method) = location.split_once('.').ok_or_else(|| fail("missing '.<method>'"))?;
        let paren = method.find('(').ok_or_else(|| fail("missing method descriptor"))?;
        let (name, descriptor) = method.split_at(paren);
        if class.is_empty() || name.is_empty() {
            return Err(fail("empty class or method name"));
        }
        if name.contains('.') {
            return Err(fail("class must be in internal form, e.g. com/example/Foo"));
        }
        match descriptor.rfind(')') {
            Some(close) if close + 1 < descriptor.len() => {}
            _ => return Err(fail("malformed method descriptor")),
        }

        Ok(MutationIdentifier::new(ClassName::new(class), name, descriptor, mutator, index))
    }
}

/// One discovered mutation opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationDetails {
    pub id: MutationIdentifier,
    pub description: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// Bytecode offset of the mutated instruction within the method's code.
    pub instruction: usize,
}

impl MutationDetails {
    pub fn class_name(&self) -> &ClassName {
        &self.id.class
    }

    pub fn method(&self) -> &str {
        &self.id.method
    }

    pub fn mutator(&self) -> &str {
        &self.id.mutator
    }

    /// `Foo.java:12` style location, falling back to the class name.
    pub fn location(&self) -> String {
        let file = self
            .file
            .clone()
            .unwrap_or_else(|| self.id.class.simple_name().to_string());
        match self.line {
            Some(line) => format!("{}:{}", file, line),
            None => file,
        }
    }
}

/// A class with exactly one mutation applied.
#[derive(Debug, Clone)]
pub struct Mutant {
    pub details: MutationDetails,
    pub bytes: Vec<u8>,
}
