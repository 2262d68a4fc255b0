//! Plain-text method listings, used to show what a mutant changed.

use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

use crate::classfile::{ClassFile, Constant, ConstantPool, Method};
use crate::error::DecodeError;
use crate::insn::{self, Instruction, Operand};

/// One line per instruction: `offset: mnemonic operand`.
pub fn disassemble(class: &ClassFile<'_>, method: &Method<'_>) -> Result<String, DecodeError> {
    let mut out = String::new();
    let Some(code) = &method.code else {
        return Ok(out);
    };
    for insn in insn::decode(code.bytes)? {
        let operand = format_operand(&class.constant_pool, &insn);
        if operand.is_empty() {
            let _ = writeln!(out, "{:>5}: {}", insn.offset, insn.mnemonic());
        } else {
            let _ = writeln!(out, "{:>5}: {} {}", insn.offset, insn.mnemonic(), operand);
        }
    }
    Ok(out)
}

/// Listing of `name descriptor` in the class held by `bytes`, or `None` when
/// the class has no such method.
pub fn method_listing(bytes: &[u8], name: &str, descriptor: &str) -> Result<Option<String>, DecodeError> {
    let class = ClassFile::parse(bytes)?;
    match class.method(name, descriptor) {
        Some(method) => disassemble(&class, method).map(Some),
        None => Ok(None),
    }
}

/// Removed and added lines between two listings, prefixed `- ` and `+ `.
pub fn diff_listings(original: &str, mutated: &str) -> String {
    let diff = TextDiff::from_lines(original, mutated);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Delete => output.push_str(&format!("- {}", change)),
            ChangeTag::Insert => output.push_str(&format!("+ {}", change)),
            ChangeTag::Equal => {}
        }
    }
    output
}

fn format_operand(pool: &ConstantPool, insn: &Instruction) -> String {
    match &insn.operand {
        Operand::None => String::new(),
        Operand::Immediate(v) => v.to_string(),
        Operand::Local(slot) => slot.to_string(),
        Operand::Constant(index) => format_constant(pool, *index),
        Operand::Branch(target) => target.to_string(),
        Operand::Iinc { local, delta } => format!("{} {}", local, delta),
        Operand::Switch { default, targets } => {
            let targets: Vec<String> = targets.iter().map(|t| t.to_string()).collect();
            format!("[{}] default {}", targets.join(", "), default)
        }
        Operand::MultiArray { index, dimensions } => {
            format!("{} {}", format_constant(pool, *index), dimensions)
        }
    }
}

fn format_constant(pool: &ConstantPool, index: u16) -> String {
    let resolved = match pool.get(index) {
        Some(Constant::FieldRef { .. } | Constant::MethodRef { .. } | Constant::InterfaceMethodRef { .. }) => pool
            .member_ref(index)
            .ok()
            .map(|m| format!("{}.{}:{}", m.owner, m.name, m.descriptor)),
        Some(Constant::Class(_)) => pool.class_name(index).ok().map(str::to_string),
        Some(Constant::String(utf8)) => pool.utf8(*utf8).ok().map(|s| format!("{:?}", s)),
        Some(Constant::Integer(v)) => Some(v.to_string()),
        Some(Constant::Float(v)) => Some(format!("{}f", v)),
        Some(Constant::Long(v)) => Some(format!("{}L", v)),
        Some(Constant::Double(v)) => Some(format!("{}d", v)),
        Some(Constant::InvokeDynamic { name_and_type, .. }) => pool
            .name_and_type(*name_and_type)
            .ok()
            .map(|(name, descriptor)| format!("{}:{}", name, descriptor)),
        _ => None,
    };
    resolved.unwrap_or_else(|| format!("#{}", index))
}
