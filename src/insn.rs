//! Decoding of bytecode arrays into instructions.

use crate::classfile::Reader;
use crate::error::DecodeError;

pub mod opcodes {
    pub const NOP: u8 = 0x00;
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const ICONST_2: u8 = 0x05;
    pub const ICONST_5: u8 = 0x08;
    pub const LCONST_0: u8 = 0x09;
    pub const LCONST_1: u8 = 0x0a;
    pub const FCONST_0: u8 = 0x0b;
    pub const FCONST_1: u8 = 0x0c;
    pub const FCONST_2: u8 = 0x0d;
    pub const DCONST_0: u8 = 0x0e;
    pub const DCONST_1: u8 = 0x0f;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const ILOAD: u8 = 0x15;
    pub const ALOAD: u8 = 0x19;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ISTORE: u8 = 0x36;
    pub const ASTORE: u8 = 0x3a;
    pub const POP: u8 = 0x57;
    pub const POP2: u8 = 0x58;
    pub const DUP: u8 = 0x59;
    pub const IADD: u8 = 0x60;
    pub const LADD: u8 = 0x61;
    pub const FADD: u8 = 0x62;
    pub const DADD: u8 = 0x63;
    pub const ISUB: u8 = 0x64;
    pub const LSUB: u8 = 0x65;
    pub const FSUB: u8 = 0x66;
    pub const DSUB: u8 = 0x67;
    pub const IMUL: u8 = 0x68;
    pub const LMUL: u8 = 0x69;
    pub const FMUL: u8 = 0x6a;
    pub const DMUL: u8 = 0x6b;
    pub const IDIV: u8 = 0x6c;
    pub const LDIV: u8 = 0x6d;
    pub const FDIV: u8 = 0x6e;
    pub const DDIV: u8 = 0x6f;
    pub const IREM: u8 = 0x70;
    pub const LREM: u8 = 0x71;
    pub const FREM: u8 = 0x72;
    pub const DREM: u8 = 0x73;
    pub const INEG: u8 = 0x74;
    pub const LNEG: u8 = 0x75;
    pub const FNEG: u8 = 0x76;
    pub const DNEG: u8 = 0x77;
    pub const ISHL: u8 = 0x78;
    pub const LSHL: u8 = 0x79;
    pub const ISHR: u8 = 0x7a;
    pub const LSHR: u8 = 0x7b;
    pub const IUSHR: u8 = 0x7c;
    pub const LUSHR: u8 = 0x7d;
    pub const IAND: u8 = 0x7e;
    pub const LAND: u8 = 0x7f;
    pub const IOR: u8 = 0x80;
    pub const LOR: u8 = 0x81;
    pub const IXOR: u8 = 0x82;
    pub const LXOR: u8 = 0x83;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IFNE: u8 = 0x9a;
    pub const IFLT: u8 = 0x9b;
    pub const IFGE: u8 = 0x9c;
    pub const IFGT: u8 = 0x9d;
    pub const IFLE: u8 = 0x9e;
    pub const IF_ICMPEQ: u8 = 0x9f;
    pub const IF_ICMPNE: u8 = 0xa0;
    pub const IF_ICMPLT: u8 = 0xa1;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const IF_ICMPGT: u8 = 0xa3;
    pub const IF_ICMPLE: u8 = 0xa4;
    pub const IF_ACMPEQ: u8 = 0xa5;
    pub const IF_ACMPNE: u8 = 0xa6;
    pub const GOTO: u8 = 0xa7;
    pub const JSR: u8 = 0xa8;
    pub const RET: u8 = 0xa9;
    pub const TABLESWITCH: u8 = 0xaa;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const FRETURN: u8 = 0xae;
    pub const DRETURN: u8 = 0xaf;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const INVOKEINTERFACE: u8 = 0xb9;
    pub const INVOKEDYNAMIC: u8 = 0xba;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ANEWARRAY: u8 = 0xbd;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const WIDE: u8 = 0xc4;
    pub const MULTIANEWARRAY: u8 = 0xc5;
    pub const IFNULL: u8 = 0xc6;
    pub const IFNONNULL: u8 = 0xc7;
    pub const GOTO_W: u8 = 0xc8;
    pub const JSR_W: u8 = 0xc9;
}

use opcodes::*;

const MNEMONICS: [&str; 202] = [
    "nop", "aconst_null", "iconst_m1", "iconst_0", "iconst_1", "iconst_2", "iconst_3",
    "iconst_4", "iconst_5", "lconst_0", "lconst_1", "fconst_0", "fconst_1", "fconst_2",
    "dconst_0", "dconst_1", "bipush", "sipush", "ldc", "ldc_w", "ldc2_w", "iload", "lload",
    "fload", "dload", "aload", "iload_0", "iload_1", "iload_2", "iload_3", "lload_0",
    "lload_1", "lload_2", "lload_3", "fload_0", "fload_1", "fload_2", "fload_3", "dload_0",
    "dload_1", "dload_2", "dload_3", "aload_0", "aload_1", "aload_2", "aload_3", "iaload",
    "laload", "faload", "daload", "aaload", "baload", "caload", "saload", "istore", "lstore",
    "fstore", "dstore", "astore", "istore_0", "istore_1", "istore_2", "istore_3", "lstore_0",
    "lstore_1", "lstore_2", "lstore_3", "fstore_0", "fstore_1", "fstore_2", "fstore_3",
    "dstore_0", "dstore_1", "dstore_2", "dstore_3", "astore_0", "astore_1", "astore_2",
    "astore_3", "iastore", "lastore", "fastore", "dastore", "aastore", "bastore", "castore",
    "sastore", "pop", "pop2", "dup", "dup_x1", "dup_x2", "dup2", "dup2_x1", "dup2_x2", "swap",
    "iadd", "ladd", "fadd", "dadd", "isub", "lsub", "fsub", "dsub", "imul", "lmul", "fmul",
    "dmul", "idiv", "ldiv", "fdiv", "ddiv", "irem", "lrem", "frem", "drem", "ineg", "lneg",
    "fneg", "dneg", "ishl", "lshl", "ishr", "lshr", "iushr", "lushr", "iand", "land", "ior",
    "lor", "ixor", "lxor", "iinc", "i2l", "i2f", "i2d", "l2i", "l2f", "l2d", "f2i", "f2l",
    "f2d", "d2i", "d2l", "d2f", "i2b", "i2c", "i2s", "lcmp", "fcmpl", "fcmpg", "dcmpl",
    "dcmpg", "ifeq", "ifne", "iflt", "ifge", "ifgt", "ifle", "if_icmpeq", "if_icmpne",
    "if_icmplt", "if_icmpge", "if_icmpgt", "if_icmple", "if_acmpeq", "if_acmpne", "goto",
    "jsr", "ret", "tableswitch", "lookupswitch", "ireturn", "lreturn", "freturn", "dreturn",
    "areturn", "return", "getstatic", "putstatic", "getfield", "putfield", "invokevirtual",
    "invokespecial", "invokestatic", "invokeinterface", "invokedynamic", "new", "newarray",
    "anewarray", "arraylength", "athrow", "checkcast", "instanceof", "monitorenter",
    "monitorexit", "wide", "multianewarray", "ifnull", "ifnonnull", "goto_w", "jsr_w",
];

pub fn mnemonic(opcode: u8) -> &'static str {
    MNEMONICS.get(opcode as usize).copied().unwrap_or("<invalid>")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    /// `bipush`, `sipush`, `newarray`.
    Immediate(i32),
    /// Local variable slot of a load, store or `ret`.
    Local(u16),
    /// Constant pool index of an `ldc`, field, invoke, type or `new` instruction.
    Constant(u16),
    /// Absolute target of a branch.
    Branch(usize),
    Iinc { local: u16, delta: i16 },
    Switch { default: usize, targets: Vec<usize> },
    MultiArray { index: u16, dimensions: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    /// The effective opcode; for `wide` forms this is the widened opcode.
    pub opcode: u8,
    pub wide: bool,
    pub len: usize,
    pub operand: Operand,
}

impl Instruction {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn mnemonic(&self) -> &'static str {
        mnemonic(self.opcode)
    }

    pub fn branch_target(&self) -> Option<usize> {
        match self.operand {
            Operand::Branch(target) => Some(target),
            _ => None,
        }
    }

    pub fn constant_index(&self) -> Option<u16> {
        match self.operand {
            Operand::Constant(index) => Some(index),
            Operand::MultiArray { index, .. } => Some(index),
            _ => None,
        }
    }

    pub fn is_invoke(&self) -> bool {
        matches!(
            self.opcode,
            INVOKEVIRTUAL | INVOKESPECIAL | INVOKESTATIC | INVOKEINTERFACE
        )
    }

    pub fn is_conditional_jump(&self) -> bool {
        matches!(self.opcode, IFEQ..=IF_ACMPNE | IFNULL | IFNONNULL)
    }
}

fn branch(offset: usize, delta: i32, code_len: usize) -> Result<usize, DecodeError> {
    let target = offset as i64 + delta as i64;
    if target < 0 || target as usize >= code_len {
        return Err(DecodeError::Malformed {
            what: "branch",
            detail: format!("target {} of instruction at {} is outside the code", target, offset),
        });
    }
    Ok(target as usize)
}

/// Decodes one instruction at `offset`.
pub fn decode_instruction(code: &[u8], offset: usize) -> Result<Instruction, DecodeError> {
    let mut r = Reader::at(code, offset);
    let opcode = r.u8()?;
    let code_len = code.len();

    let operand = match opcode {
        0x00..=0x0f | 0x1a..=0x35 | 0x3b..=0x83 | 0x85..=0x98 | 0xac..=0xb1 | 0xbe | 0xbf
        | 0xc2 | 0xc3 => Operand::None,
        BIPUSH => Operand::Immediate(r.u8()? as i8 as i32),
        SIPUSH => Operand::Immediate(r.u16()? as i16 as i32),
        NEWARRAY => Operand::Immediate(r.u8()? as i32),
        LDC => Operand::Constant(r.u8()? as u16),
        0x13 | 0x14 => Operand::Constant(r.u16()?),
        0x15..=0x19 | 0x36..=0x3a | RET => Operand::Local(r.u8()? as u16),
        IINC => Operand::Iinc { local: r.u8()? as u16, delta: r.u8()? as i8 as i16 },
        IFEQ..=JSR | IFNULL | IFNONNULL => {
            Operand::Branch(branch(offset, r.u16()? as i16 as i32, code_len)?)
        }
        GOTO_W | JSR_W => Operand::Branch(branch(offset, r.i32()?, code_len)?),
        GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | 0xc1 => {
            Operand::Constant(r.u16()?)
        }
        INVOKEINTERFACE | INVOKEDYNAMIC => {
            let index = r.u16()?;
            r.u16()?;
            Operand::Constant(index)
        }
        MULTIANEWARRAY => Operand::MultiArray { index: r.u16()?, dimensions: r.u8()? },
        TABLESWITCH | LOOKUPSWITCH => {
            // Operands are aligned to a multiple of four from the start of the code.
            let pad = (4 - (offset + 1) % 4) % 4;
            r.take(pad)?;
            let default = branch(offset, r.i32()?, code_len)?;
            let mut targets = Vec::new();
            if opcode == TABLESWITCH {
                let low = r.i32()?;
                let high = r.i32()?;
                if high < low {
                    return Err(DecodeError::Malformed {
                        what: "tableswitch",
                        detail: format!("high {} below low {} at {}", high, low, offset),
                    });
                }
                for _ in low..=high {
                    targets.push(branch(offset, r.i32()?, code_len)?);
                }
            } else {
                let pairs = r.i32()?;
                if pairs < 0 {
                    return Err(DecodeError::Malformed {
                        what: "lookupswitch",
                        detail: format!("negative pair count at {}", offset),
                    });
                }
                for _ in 0..pairs {
                    r.i32()?;
                    targets.push(branch(offset, r.i32()?, code_len)?);
                }
            }
            Operand::Switch { default, targets }
        }
        WIDE => {
            let widened = r.u8()?;
            let local = r.u16()?;
            let operand = match widened {
                IINC => Operand::Iinc { local, delta: r.u16()? as i16 },
                0x15..=0x19 | 0x36..=0x3a | RET => Operand::Local(local),
                _ => return Err(DecodeError::UnknownOpcode { opcode: widened, offset }),
            };
            return Ok(Instruction {
                offset,
                opcode: widened,
                wide: true,
                len: r.position() - offset,
                operand,
            });
        }
        _ => return Err(DecodeError::UnknownOpcode { opcode, offset }),
    };

    Ok(Instruction { offset, opcode, wide: false, len: r.position() - offset, operand })
}

/// Decodes a whole code array in program order.
pub fn decode(code: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
    let mut insns = Vec::new();
    let mut offset = 0;
    while offset < code.len() {
        let insn = decode_instruction(code, offset)?;
        offset = insn.end();
        insns.push(insn);
    }
    Ok(insns)
}
