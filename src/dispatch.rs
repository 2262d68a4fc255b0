//! The class → method → instruction traversal shared by discovery and
//! materialization.

use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::classfile::{ClassFile, Code, ConstantPool};
use crate::context::MutationContext;
use crate::error::{DecodeError, EngineError};
use crate::filter::{self, MethodFilter, MethodInfo};
use crate::insn::opcodes::{GETSTATIC, IFNE, INVOKEVIRTUAL, PUTSTATIC};
use crate::insn::{self, Instruction, Operand};
use crate::mutants::{ClassName, MutationDetails};
use crate::operators::{InsnCursor, MethodMutator};
use crate::prescan::PremutationClassInfo;

const ASSERTIONS_FLAG: &str = "$assertionsDisabled";

/// Bytes to write over the original class file at `offset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl Patch {
    /// Copies `original` with the patch applied.
    pub fn apply(&self, original: &[u8]) -> Vec<u8> {
        let mut out = original.to_vec();
        out[self.offset..self.offset + self.bytes.len()].copy_from_slice(&self.bytes);
        out
    }
}

pub struct Dispatcher<'a> {
    class_name: &'a ClassName,
    class: &'a ClassFile<'a>,
    info: &'a PremutationClassInfo,
    operators: &'a [Arc<dyn MethodMutator>],
    filter: &'a MethodFilter,
}

impl<'a> Dispatcher<'a> {
    pub fn new(
        class_name: &'a ClassName,
        class: &'a ClassFile<'a>,
        info: &'a PremutationClassInfo,
        operators: &'a [Arc<dyn MethodMutator>],
        filter: &'a MethodFilter,
    ) -> Self {
        Dispatcher { class_name, class, info, operators, filter }
    }

    /// Visits every eligible instruction, recording candidates in `ctx`.
    ///
    /// When `ctx` holds a target, the first candidate equal to it is rewritten
    /// and returned as a patch; later candidates are still recorded so their
    /// sequence indices match a plain discovery run.
    pub fn run(&self, ctx: &mut MutationContext) -> Result<Option<Patch>, EngineError> {
        let mut patch = None;

        for method in &self.class.methods {
            let info = MethodInfo {
                owner: &self.class.this_class,
                class_access: self.class.access_flags,
                access: method.access_flags,
                name: &method.name,
                descriptor: &method.descriptor,
                synthetic_attribute: method.synthetic_attribute,
                generated_enum_method: self
                    .info
                    .is_generated_enum_method(&method.name, &method.descriptor),
                in_excluded_origin: self.info.is_excluded_origin(),
            };
            if let Err(reason) = filter::check(self.filter, &info) {
                debug!(class = %self.class_name, method = %method.name, %reason, "skipping method");
                continue;
            }
            let Some(code) = &method.code else { continue };

            if let Some(found) = self.visit_code(ctx, &info, code)? {
                patch = Some(found);
            }
        }

        Ok(patch)
    }

    fn visit_code(
        &self,
        ctx: &mut MutationContext,
        method: &MethodInfo<'_>,
        code: &Code<'_>,
    ) -> Result<Option<Patch>, EngineError> {
        let decode_error = |source| EngineError::Decode { class: self.class_name.clone(), source };
        let insns = insn::decode(code.bytes).map_err(decode_error)?;
        let targets = jump_targets(&insns, code);
        let immune = assertion_guards(&insns, &self.class.constant_pool).map_err(decode_error)?;

        let mut patch = None;
        for (index, insn) in insns.iter().enumerate() {
            if immune.iter().any(|range| range.contains(&insn.offset)) {
                continue;
            }
            let line = code.line_at(insn.offset);
            if line.is_some_and(|l| self.info.is_avoided_line(l)) {
                continue;
            }

            let cursor = InsnCursor::new(self.class, method, code.bytes, &insns, index, &targets);
            for op in self.operators {
                let plugin_error = |source| EngineError::Plugin { operator: op.id().to_string(), source };
                let Some(candidate) = op.recognize(&cursor).map_err(plugin_error)? else {
                    continue;
                };

                let id = ctx.next_identifier(self.class_name, method.name, method.descriptor, op.id());
                trace!(%id, offset = insn.offset, description = %candidate.description, "candidate");
                let details = MutationDetails {
                    id,
                    description: candidate.description,
                    file: self.class.source_file.clone(),
                    line,
                    instruction: insn.offset,
                };

                if ctx.record(details) {
                    let bytes = op.rewrite(&cursor).map_err(plugin_error)?;
                    if bytes.len() != insn.len {
                        return Err(EngineError::InvalidRewrite {
                            operator: op.id().to_string(),
                            offset: insn.offset,
                            expected: insn.len,
                            actual: bytes.len(),
                        });
                    }
                    patch = Some(Patch { offset: code.offset + insn.offset, bytes });
                    break;
                }
            }
        }

        Ok(patch)
    }
}

/// Offsets some branch, switch or exception handler can jump to.
pub fn jump_targets(insns: &[Instruction], code: &Code<'_>) -> BTreeSet<usize> {
    let mut targets: BTreeSet<usize> = code
        .exception_table
        .iter()
        .map(|h| h.handler_pc as usize)
        .collect();
    for insn in insns {
        match &insn.operand {
            Operand::Branch(target) => {
                targets.insert(*target);
            }
            Operand::Switch { default, targets: cases } => {
                targets.insert(*default);
                targets.extend(cases.iter().copied());
            }
            _ => {}
        }
    }
    targets
}

fn is_assertions_flag(pool: &ConstantPool, insn: &Instruction) -> Result<bool, DecodeError> {
    match insn.constant_index() {
        Some(index) => {
            let field = pool.member_ref(index)?;
            Ok(field.name == ASSERTIONS_FLAG && field.descriptor == "Z")
        }
        None => Ok(false),
    }
}

fn is_desired_assertion_status(pool: &ConstantPool, insn: &Instruction) -> Result<bool, DecodeError> {
    match insn.constant_index() {
        Some(index) => {
            let call = pool.member_ref(index)?;
            Ok(call.owner == "java/lang/Class"
                && call.name == "desiredAssertionStatus"
                && call.descriptor == "()Z")
        }
        None => Ok(false),
    }
}

/// Code ranges that only exist to implement `assert`.
///
/// An assertion compiles to `getstatic $assertionsDisabled; ifne END` followed
/// by the condition and the throw, so everything from the `getstatic` up to
/// `END` is guard code. The static initializer that sets the flag, from the
/// `desiredAssertionStatus()` call to the `putstatic`, is guard code too.
pub fn assertion_guards(
    insns: &[Instruction],
    pool: &ConstantPool,
) -> Result<Vec<Range<usize>>, DecodeError> {
    let mut guards = Vec::new();

    for (i, insn) in insns.iter().enumerate() {
        if insn.opcode == GETSTATIC && is_assertions_flag(pool, insn)? {
            let Some(next) = insns.get(i + 1) else { continue };
            if next.opcode != IFNE {
                continue;
            }
            if let Some(end) = next.branch_target().filter(|end| *end > insn.offset) {
                guards.push(insn.offset..end);
            }
        } else if insn.opcode == INVOKEVIRTUAL && is_desired_assertion_status(pool, insn)? {
            for later in &insns[i + 1..] {
                if later.opcode == PUTSTATIC && is_assertions_flag(pool, later)? {
                    guards.push(insn.offset..later.end());
                    break;
                }
            }
        }
    }

    Ok(guards)
}
