use std::collections::BTreeSet;

use crate::classfile::ClassFile;
use crate::error::DecodeError;
use crate::insn;

pub const DEFAULT_EXCLUDED_ORIGINS: &[&str] = &[
    "groovy/lang/GroovyObject",
    "org/codehaus/groovy/runtime/GeneratedClosure",
];

pub const DEFAULT_AVOIDED_CALLS: &[&str] = &[
    "java/util/logging",
    "org/apache/log4j",
    "org/slf4j",
    "org/apache/commons/logging",
];

/// Class-wide facts gathered once before any operator runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PremutationClassInfo {
    generated_enum_methods: BTreeSet<(String, String)>,
    excluded_origin: bool,
    avoided_lines: BTreeSet<u32>,
}

impl PremutationClassInfo {
    pub fn is_generated_enum_method(&self, name: &str, descriptor: &str) -> bool {
        self.generated_enum_methods
            .contains(&(name.to_string(), descriptor.to_string()))
    }

    pub fn generated_enum_methods(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.generated_enum_methods
            .iter()
            .map(|(n, d)| (n.as_str(), d.as_str()))
    }

    pub fn is_excluded_origin(&self) -> bool {
        self.excluded_origin
    }

    pub fn is_avoided_line(&self, line: u32) -> bool {
        self.avoided_lines.contains(&line)
    }

    pub fn avoided_lines(&self) -> impl Iterator<Item = u32> + '_ {
        self.avoided_lines.iter().copied()
    }
}

/// Read-only pass computing [`PremutationClassInfo`].
#[derive(Debug, Clone, Copy)]
pub struct PreMutationAnalyser<'a> {
    excluded_origins: &'a [String],
    avoided_calls: &'a [String],
}

impl<'a> PreMutationAnalyser<'a> {
    /// Both lists hold internal names; avoided calls match as prefixes of the
    /// callee's owner.
    pub fn new(excluded_origins: &'a [String], avoided_calls: &'a [String]) -> Self {
        PreMutationAnalyser { excluded_origins, avoided_calls }
    }

    pub fn analyse(&self, class: &ClassFile<'_>) -> Result<PremutationClassInfo, DecodeError> {
        Ok(PremutationClassInfo {
            generated_enum_methods: generated_enum_methods(class),
            excluded_origin: self.is_excluded_origin(class),
            avoided_lines: self.avoided_lines(class)?,
        })
    }

    fn is_excluded_origin(&self, class: &ClassFile<'_>) -> bool {
        let is_marker = |name: &str| self.excluded_origins.iter().any(|m| m == name);

        class.super_class.as_deref().is_some_and(is_marker)
            || class.interfaces.iter().any(|i| is_marker(i))
            || class
                .annotations
                .iter()
                .filter_map(|desc| desc.strip_prefix('L').and_then(|d| d.strip_suffix(';')))
                .any(is_marker)
    }

    fn avoided_lines(&self, class: &ClassFile<'_>) -> Result<BTreeSet<u32>, DecodeError> {
        let mut lines = BTreeSet::new();
        if self.avoided_calls.is_empty() {
            return Ok(lines);
        }

        for method in &class.methods {
            let Some(code) = &method.code else { continue };
            if code.line_numbers.is_empty() {
                continue;
            }
            for insn in insn::decode(code.bytes)? {
                if !insn.is_invoke() {
                    continue;
                }
                let Some(index) = insn.constant_index() else { continue };
                let callee = class.constant_pool.member_ref(index)?;
                if self.avoided_calls.iter().any(|p| callee.owner.starts_with(p.as_str())) {
                    if let Some(line) = code.line_at(insn.offset) {
                        lines.insert(line);
                    }
                }
            }
        }
        Ok(lines)
    }
}

fn generated_enum_methods(class: &ClassFile<'_>) -> BTreeSet<(String, String)> {
    let mut generated = BTreeSet::new();
    if !class.is_enum() {
        return generated;
    }

    let values = format!("()[L{};", class.this_class);
    let value_of = format!("(Ljava/lang/String;)L{};", class.this_class);
    for method in &class.methods {
        let is_generated = match method.name.as_str() {
            "values" => method.is_static() && method.descriptor == values,
            "valueOf" => method.is_static() && method.descriptor == value_of,
            "<clinit>" => true,
            _ => false,
        };
        if is_generated {
            generated.insert((method.name.clone(), method.descriptor.clone()));
        }
    }
    generated
}
