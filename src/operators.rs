//! Mutation operators and the registry the engine runs them from.
//!
//! Every built-in operator rewrites exactly one instruction into a byte
//! sequence of the same length, so branch offsets, exception ranges, line
//! tables and stack map frames of the method stay valid untouched.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::classfile::{ClassFile, ConstantPool, MemberRef};
use crate::error::{ConfigError, DecodeError, PluginError};
use crate::filter::MethodInfo;
use crate::insn::opcodes::*;
use crate::insn::{Instruction, Operand};

/// A candidate an operator found at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub description: String,
}

impl Candidate {
    pub fn new(description: impl Into<String>) -> Self {
        Candidate { description: description.into() }
    }
}

/// An instruction inside a method, with enough surroundings for an operator
/// to decide whether and how to mutate it.
#[derive(Clone, Copy)]
pub struct InsnCursor<'c> {
    class: &'c ClassFile<'c>,
    method: &'c MethodInfo<'c>,
    code: &'c [u8],
    insns: &'c [Instruction],
    index: usize,
    jump_targets: &'c BTreeSet<usize>,
}

impl<'c> InsnCursor<'c> {
    pub fn new(
        class: &'c ClassFile<'c>,
        method: &'c MethodInfo<'c>,
        code: &'c [u8],
        insns: &'c [Instruction],
        index: usize,
        jump_targets: &'c BTreeSet<usize>,
    ) -> Self {
        InsnCursor { class, method, code, insns, index, jump_targets }
    }

    pub fn insn(&self) -> &'c Instruction {
        &self.insns[self.index]
    }

    pub fn next(&self) -> Option<&'c Instruction> {
        self.insns.get(self.index + 1)
    }

    pub fn previous(&self) -> Option<&'c Instruction> {
        self.index.checked_sub(1).and_then(|i| self.insns.get(i))
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn instructions(&self) -> &'c [Instruction] {
        self.insns
    }

    pub fn method(&self) -> &'c MethodInfo<'c> {
        self.method
    }

    pub fn class(&self) -> &'c ClassFile<'c> {
        self.class
    }

    pub fn pool(&self) -> &'c ConstantPool {
        &self.class.constant_pool
    }

    pub fn code(&self) -> &'c [u8] {
        self.code
    }

    /// Raw bytes of the current instruction.
    pub fn bytes(&self) -> &'c [u8] {
        let insn = self.insn();
        &self.code[insn.offset..insn.end()]
    }

    /// True when some branch, switch or exception handler lands on `offset`.
    pub fn is_jump_target(&self, offset: usize) -> bool {
        self.jump_targets.contains(&offset)
    }

    pub fn member_ref(&self) -> Result<Option<MemberRef<'c>>, DecodeError> {
        match self.insn().constant_index() {
            Some(index) => self.pool().member_ref(index).map(Some),
            None => Ok(None),
        }
    }
}

/// Operator plugin contract.
///
/// Implementations must be stateless: the engine relies on two traversals of
/// the same bytes producing the same candidates in the same order.
pub trait MethodMutator: Send + Sync {
    /// Globally unique, stable id; it is embedded in every identifier.
    fn id(&self) -> &str;

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError>;

    /// Replacement for the bytes of the cursor's instruction. Only called on
    /// instructions `recognize` accepted; must return exactly as many bytes.
    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError>;
}

/// Replaces one opcode with another, keeping operands.
struct OpcodeSwap {
    id: &'static str,
    table: &'static [(u8, u8, &'static str)],
}

impl OpcodeSwap {
    fn lookup(&self, insn: &Instruction) -> Option<&(u8, u8, &'static str)> {
        if insn.wide {
            return None;
        }
        self.table.iter().find(|(from, _, _)| *from == insn.opcode)
    }
}

impl MethodMutator for OpcodeSwap {
    fn id(&self) -> &str {
        self.id
    }

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError> {
        Ok(self.lookup(cursor.insn()).map(|(_, _, desc)| Candidate::new(*desc)))
    }

    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError> {
        let (_, to, _) = self
            .lookup(cursor.insn())
            .ok_or_else(|| format!("{} cannot rewrite {}", self.id, cursor.insn().mnemonic()))?;
        let mut bytes = cursor.bytes().to_vec();
        bytes[0] = *to;
        Ok(bytes)
    }
}

const MATH_TABLE: &[(u8, u8, &str)] = &[
    (IADD, ISUB, "Replaced integer addition with subtraction"),
    (ISUB, IADD, "Replaced integer subtraction with addition"),
    (IMUL, IDIV, "Replaced integer multiplication with division"),
    (IDIV, IMUL, "Replaced integer division with multiplication"),
    (IREM, IMUL, "Replaced integer modulus with multiplication"),
    (IAND, IOR, "Replaced bitwise AND with OR"),
    (IOR, IAND, "Replaced bitwise OR with AND"),
    (IXOR, IAND, "Replaced XOR with AND"),
    (ISHL, ISHR, "Replaced Shift Left with Shift Right"),
    (ISHR, ISHL, "Replaced Shift Right with Shift Left"),
    (IUSHR, ISHL, "Replaced Unsigned Shift Right with Shift Left"),
    (LADD, LSUB, "Replaced long addition with subtraction"),
    (LSUB, LADD, "Replaced long subtraction with addition"),
    (LMUL, LDIV, "Replaced long multiplication with division"),
    (LDIV, LMUL, "Replaced long division with multiplication"),
    (LREM, LMUL, "Replaced long modulus with multiplication"),
    (LAND, LOR, "Replaced bitwise AND with OR"),
    (LOR, LAND, "Replaced bitwise OR with AND"),
    (LXOR, LAND, "Replaced XOR with AND"),
    (LSHL, LSHR, "Replaced Shift Left with Shift Right"),
    (LSHR, LSHL, "Replaced Shift Right with Shift Left"),
    (LUSHR, LSHL, "Replaced Unsigned Shift Right with Shift Left"),
    (FADD, FSUB, "Replaced float addition with subtraction"),
    (FSUB, FADD, "Replaced float subtraction with addition"),
    (FMUL, FDIV, "Replaced float multiplication with division"),
    (FDIV, FMUL, "Replaced float division with multiplication"),
    (FREM, FMUL, "Replaced float modulus with multiplication"),
    (DADD, DSUB, "Replaced double addition with subtraction"),
    (DSUB, DADD, "Replaced double subtraction with addition"),
    (DMUL, DDIV, "Replaced double multiplication with division"),
    (DDIV, DMUL, "Replaced double division with multiplication"),
    (DREM, DMUL, "Replaced double modulus with multiplication"),
];

const NEGATE_CONDITIONALS_TABLE: &[(u8, u8, &str)] = &[
    (IFEQ, IFNE, "negated conditional"),
    (IFNE, IFEQ, "negated conditional"),
    (IFLT, IFGE, "negated conditional"),
    (IFGE, IFLT, "negated conditional"),
    (IFGT, IFLE, "negated conditional"),
    (IFLE, IFGT, "negated conditional"),
    (IF_ICMPEQ, IF_ICMPNE, "negated conditional"),
    (IF_ICMPNE, IF_ICMPEQ, "negated conditional"),
    (IF_ICMPLT, IF_ICMPGE, "negated conditional"),
    (IF_ICMPGE, IF_ICMPLT, "negated conditional"),
    (IF_ICMPGT, IF_ICMPLE, "negated conditional"),
    (IF_ICMPLE, IF_ICMPGT, "negated conditional"),
    (IF_ACMPEQ, IF_ACMPNE, "negated conditional"),
    (IF_ACMPNE, IF_ACMPEQ, "negated conditional"),
    (IFNULL, IFNONNULL, "negated conditional"),
    (IFNONNULL, IFNULL, "negated conditional"),
];

const CONDITIONALS_BOUNDARY_TABLE: &[(u8, u8, &str)] = &[
    (IFLT, IFLE, "changed conditional boundary"),
    (IFLE, IFLT, "changed conditional boundary"),
    (IFGT, IFGE, "changed conditional boundary"),
    (IFGE, IFGT, "changed conditional boundary"),
    (IF_ICMPLT, IF_ICMPLE, "changed conditional boundary"),
    (IF_ICMPLE, IF_ICMPLT, "changed conditional boundary"),
    (IF_ICMPGT, IF_ICMPGE, "changed conditional boundary"),
    (IF_ICMPGE, IF_ICMPGT, "changed conditional boundary"),
];

const INVERT_NEGS_TABLE: &[(u8, u8, &str)] = &[
    (INEG, NOP, "removed negation"),
    (LNEG, NOP, "removed negation"),
    (FNEG, NOP, "removed negation"),
    (DNEG, NOP, "removed negation"),
];

/// Negates the constant of an `iinc`.
struct Increments;

impl Increments {
    fn negated(insn: &Instruction) -> Option<(i16, i16)> {
        match insn.operand {
            Operand::Iinc { delta, .. } if insn.wide => delta.checked_neg().map(|n| (delta, n)),
            Operand::Iinc { delta, .. } => (delta as i8).checked_neg().map(|n| (delta, n as i16)),
            _ => None,
        }
    }
}

impl MethodMutator for Increments {
    fn id(&self) -> &str {
        Mutator::Increments.name()
    }

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError> {
        Ok(Increments::negated(cursor.insn()).map(|(from, to)| {
            Candidate::new(format!("Changed increment from {} to {}", from, to))
        }))
    }

    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError> {
        let insn = cursor.insn();
        let (_, to) = Increments::negated(insn).ok_or("not a negatable iinc")?;
        let mut bytes = cursor.bytes().to_vec();
        if insn.wide {
            bytes[4..6].copy_from_slice(&to.to_be_bytes());
        } else {
            bytes[2] = to as i8 as u8;
        }
        Ok(bytes)
    }
}

/// Alters a constant that is returned straight away.
struct ReturnVals;

impl ReturnVals {
    fn replacement(cursor: &InsnCursor<'_>) -> Option<(Vec<u8>, String)> {
        let insn = cursor.insn();
        let next = cursor.next()?;
        // A return that is also reached by a jump may return another value.
        if cursor.is_jump_target(next.offset) {
            return None;
        }
        let int_value = |v: i32| {
            let to = if v == 0 { 1 } else { 0 };
            format!("replaced return of integer sized value {} with {}", v, to)
        };

        match (insn.opcode, next.opcode) {
            (ICONST_0, IRETURN) => Some((vec![ICONST_1], int_value(0))),
            (ICONST_M1..=ICONST_5, IRETURN) => {
                Some((vec![ICONST_0], int_value(insn.opcode as i32 - ICONST_0 as i32)))
            }
            (BIPUSH, IRETURN) => {
                let Operand::Immediate(v) = insn.operand else { return None };
                Some((vec![BIPUSH, if v == 0 { 1 } else { 0 }], int_value(v)))
            }
            (SIPUSH, IRETURN) => {
                let Operand::Immediate(v) = insn.operand else { return None };
                let to: i16 = if v == 0 { 1 } else { 0 };
                let [hi, lo] = to.to_be_bytes();
                Some((vec![SIPUSH, hi, lo], int_value(v)))
            }
            (LCONST_0, LRETURN) => Some((vec![LCONST_1], "replaced return of long value 0 with 1".to_string())),
            (LCONST_1, LRETURN) => Some((vec![LCONST_0], "replaced return of long value 1 with 0".to_string())),
            (FCONST_0, FRETURN) => Some((vec![FCONST_1], "replaced return of float value 0 with 1".to_string())),
            (FCONST_1 | FCONST_2, FRETURN) => {
                Some((vec![FCONST_0], "replaced return of float value with 0".to_string()))
            }
            (DCONST_0, DRETURN) => Some((vec![DCONST_1], "replaced return of double value 0 with 1".to_string())),
            (DCONST_1, DRETURN) => Some((vec![DCONST_0], "replaced return of double value 1 with 0".to_string())),
            _ => None,
        }
    }
}

impl MethodMutator for ReturnVals {
    fn id(&self) -> &str {
        Mutator::ReturnVals.name()
    }

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError> {
        Ok(ReturnVals::replacement(cursor).map(|(_, desc)| Candidate::new(desc)))
    }

    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError> {
        let (bytes, _) = ReturnVals::replacement(cursor).ok_or("not a constant return")?;
        Ok(bytes)
    }
}

/// Removes calls to void methods, popping their arguments instead.
struct VoidMethodCalls;

impl VoidMethodCalls {
    fn removal(cursor: &InsnCursor<'_>) -> Result<Option<(Vec<u8>, String)>, PluginError> {
        let insn = cursor.insn();
        if !insn.is_invoke() {
            return Ok(None);
        }
        let Some(callee) = cursor.member_ref()? else { return Ok(None) };
        if callee.name == "<init>" || !callee.descriptor.ends_with(")V") {
            return Ok(None);
        }

        // Operand stack slots the call consumes, topmost first.
        let mut categories = argument_categories(callee.descriptor)?;
        categories.reverse();
        if insn.opcode != INVOKESTATIC {
            categories.push(1);
        }

        let mut bytes = Vec::with_capacity(insn.len);
        let mut i = 0;
        while i < categories.len() {
            if categories[i] == 2 {
                bytes.push(POP2);
                i += 1;
            } else if categories.get(i + 1) == Some(&1) {
                // Two single-slot values go with one pop2.
                bytes.push(POP2);
                i += 2;
            } else {
                bytes.push(POP);
                i += 1;
            }
        }
        if bytes.len() > insn.len {
            return Ok(None);
        }
        bytes.resize(insn.len, NOP);

        let owner = callee.owner.replace('/', ".");
        Ok(Some((bytes, format!("removed call to {}::{}", owner, callee.name))))
    }
}

impl MethodMutator for VoidMethodCalls {
    fn id(&self) -> &str {
        Mutator::VoidMethodCalls.name()
    }

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError> {
        Ok(VoidMethodCalls::removal(cursor)?.map(|(_, desc)| Candidate::new(desc)))
    }

    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError> {
        let (bytes, _) = VoidMethodCalls::removal(cursor)?.ok_or("not a removable void call")?;
        Ok(bytes)
    }
}

/// Replaces a conditional jump with pops, so the branch is never taken.
struct RemoveConditionals;

impl MethodMutator for RemoveConditionals {
    fn id(&self) -> &str {
        Mutator::RemoveConditionals.name()
    }

    fn recognize(&self, cursor: &InsnCursor<'_>) -> Result<Option<Candidate>, PluginError> {
        if !cursor.insn().is_conditional_jump() {
            return Ok(None);
        }
        Ok(Some(Candidate::new("removed conditional - replaced comparison check with fall through")))
    }

    fn rewrite(&self, cursor: &InsnCursor<'_>) -> Result<Vec<u8>, PluginError> {
        let pop = match cursor.insn().opcode {
            IF_ICMPEQ..=IF_ACMPNE => POP2,
            IFEQ..=IFLE | IFNULL | IFNONNULL => POP,
            _ => return Err("not a conditional jump".into()),
        };
        Ok(vec![pop, NOP, NOP])
    }
}

/// Stack categories (1 or 2 slots) of each argument in a method descriptor.
pub fn argument_categories(descriptor: &str) -> Result<Vec<u8>, DecodeError> {
    let malformed = || DecodeError::Malformed {
        what: "method descriptor",
        detail: descriptor.to_string(),
    };
    let args = descriptor
        .strip_prefix('(')
        .and_then(|d| d.split_once(')'))
        .map(|(args, _)| args)
        .ok_or_else(malformed)?;

    let mut categories = Vec::new();
    let mut chars = args.chars();
    while let Some(c) = chars.next() {
        let mut c = c;
        let mut array = false;
        while c == '[' {
            array = true;
            c = chars.next().ok_or_else(malformed)?;
        }
        match c {
            'L' => {
                chars.by_ref().find(|&c| c == ';').ok_or_else(malformed)?;
                categories.push(1);
            }
            'J' | 'D' if !array => categories.push(2),
            'B' | 'C' | 'F' | 'I' | 'S' | 'Z' | 'J' | 'D' => categories.push(1),
            _ => return Err(malformed()),
        }
    }
    Ok(categories)
}

/// Built-in operators and operator groups, by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mutator {
    All,
    Defaults,
    Math,
    NegateConditionals,
    ConditionalsBoundary,
    Increments,
    InvertNegs,
    ReturnVals,
    VoidMethodCalls,
    RemoveConditionals,
}

const DEFAULT_OPERATORS: &[Mutator] = &[
    Mutator::ConditionalsBoundary,
    Mutator::NegateConditionals,
    Mutator::Math,
    Mutator::Increments,
    Mutator::InvertNegs,
    Mutator::ReturnVals,
    Mutator::VoidMethodCalls,
];

impl Mutator {
    pub const ALL_NAMES: &'static [Mutator] = &[
        Mutator::All,
        Mutator::Defaults,
        Mutator::Math,
        Mutator::NegateConditionals,
        Mutator::ConditionalsBoundary,
        Mutator::Increments,
        Mutator::InvertNegs,
        Mutator::ReturnVals,
        Mutator::VoidMethodCalls,
        Mutator::RemoveConditionals,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mutator::All => "ALL",
            Mutator::Defaults => "DEFAULTS",
            Mutator::Math => "MATH",
            Mutator::NegateConditionals => "NEGATE_CONDITIONALS",
            Mutator::ConditionalsBoundary => "CONDITIONALS_BOUNDARY",
            Mutator::Increments => "INCREMENTS",
            Mutator::InvertNegs => "INVERT_NEGS",
            Mutator::ReturnVals => "RETURN_VALS",
            Mutator::VoidMethodCalls => "VOID_METHOD_CALLS",
            Mutator::RemoveConditionals => "REMOVE_CONDITIONALS",
        }
    }

    /// The operators this name stands for, in registration order.
    pub fn operators(self) -> Vec<Arc<dyn MethodMutator>> {
        match self {
            Mutator::All => {
                let mut ops: Vec<_> = DEFAULT_OPERATORS.iter().flat_map(|m| m.operators()).collect();
                ops.extend(Mutator::RemoveConditionals.operators());
                ops
            }
            Mutator::Defaults => DEFAULT_OPERATORS.iter().flat_map(|m| m.operators()).collect(),
            Mutator::Math => single(OpcodeSwap { id: "MATH", table: MATH_TABLE }),
            Mutator::NegateConditionals => single(OpcodeSwap {
                id: "NEGATE_CONDITIONALS",
                table: NEGATE_CONDITIONALS_TABLE,
            }),
            Mutator::ConditionalsBoundary => single(OpcodeSwap {
                id: "CONDITIONALS_BOUNDARY",
                table: CONDITIONALS_BOUNDARY_TABLE,
            }),
            Mutator::InvertNegs => single(OpcodeSwap { id: "INVERT_NEGS", table: INVERT_NEGS_TABLE }),
            Mutator::Increments => single(Increments),
            Mutator::ReturnVals => single(ReturnVals),
            Mutator::VoidMethodCalls => single(VoidMethodCalls),
            Mutator::RemoveConditionals => single(RemoveConditionals),
        }
    }
}

fn single(operator: impl MethodMutator + 'static) -> Vec<Arc<dyn MethodMutator>> {
    let operator: Arc<dyn MethodMutator> = Arc::new(operator);
    vec![operator]
}

impl fmt::Display for Mutator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mutator {
    type Err = ConfigError;

    /// Case-insensitive; `-` and `_` are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Mutator::ALL_NAMES
            .iter()
            .copied()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownMutator(s.to_string()))
    }
}

/// Ordered set of operators with unique ids.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    operators: Vec<Arc<dyn MethodMutator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        OperatorRegistry::default()
    }

    /// Expands names and groups in order; operators named twice (through
    /// overlapping groups) are registered once, at their first position.
    pub fn from_mutators(mutators: &[Mutator]) -> Self {
        let mut registry = OperatorRegistry::new();
        for op in mutators.iter().flat_map(|m| m.operators()) {
            if registry.get(op.id()).is_none() {
                registry.operators.push(op);
            }
        }
        registry
    }

    pub fn register(&mut self, operator: Arc<dyn MethodMutator>) -> Result<(), ConfigError> {
        if self.get(operator.id()).is_some() {
            return Err(ConfigError::DuplicateOperator(operator.id().to_string()));
        }
        self.operators.push(operator);
        Ok(())
    }

    pub fn with(mut self, operator: Arc<dyn MethodMutator>) -> Result<Self, ConfigError> {
        self.register(operator)?;
        Ok(self)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn MethodMutator>> {
        self.operators.iter().find(|op| op.id() == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.operators.iter().map(|op| op.id()).collect()
    }

    pub fn operators(&self) -> &[Arc<dyn MethodMutator>] {
        &self.operators
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
