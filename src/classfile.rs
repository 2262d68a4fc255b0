//! Read-only decoding of JVM class files.
//!
//! Only the structure the mutation engine needs is modelled: the constant
//! pool, fields, methods with their `Code` attributes (exception and line
//! tables included), and the class-level attributes that identify where a
//! class came from. Code arrays are borrowed from the input buffer together
//! with their absolute offset, so a rewrite can patch a copy of the buffer in
//! place without re-encoding anything else.

use crate::error::DecodeError;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

const MAGIC: u32 = 0xCAFE_BABE;

pub(crate) struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub(crate) fn at(bytes: &'a [u8], pos: usize) -> Self {
        Reader { bytes, pos }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof { offset: self.bytes.len() })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(self.u32()? as i32)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let hi = self.u32()? as u64;
        let lo = self.u32()? as u64;
        Ok((hi << 32) | lo)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Slot 0 and the second slot of every long/double entry.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let count = r.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index = 1u16;
        while index < count {
            let tag = r.u8()?;
            let constant = match tag {
                1 => {
                    let len = r.u16()? as usize;
                    Constant::Utf8(decode_modified_utf8(r.take(len)?))
                }
                3 => Constant::Integer(r.i32()?),
                4 => Constant::Float(f32::from_bits(r.u32()?)),
                5 => Constant::Long(r.u64()? as i64),
                6 => Constant::Double(f64::from_bits(r.u64()?)),
                7 => Constant::Class(r.u16()?),
                8 => Constant::String(r.u16()?),
                9 => Constant::FieldRef { class: r.u16()?, name_and_type: r.u16()? },
                10 => Constant::MethodRef { class: r.u16()?, name_and_type: r.u16()? },
                11 => Constant::InterfaceMethodRef { class: r.u16()?, name_and_type: r.u16()? },
                12 => Constant::NameAndType { name: r.u16()?, descriptor: r.u16()? },
                15 => Constant::MethodHandle { kind: r.u8()?, reference: r.u16()? },
                16 => Constant::MethodType(r.u16()?),
                17 => Constant::Dynamic { bootstrap: r.u16()?, name_and_type: r.u16()? },
                18 => Constant::InvokeDynamic { bootstrap: r.u16()?, name_and_type: r.u16()? },
                19 => Constant::Module(r.u16()?),
                20 => Constant::Package(r.u16()?),
                _ => return Err(DecodeError::BadConstantTag { tag, index }),
            };
            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            if wide {
                // Longs and doubles also claim the next slot, which must exist.
                let next = index.checked_add(1).filter(|n| *n < count).ok_or_else(|| {
                    DecodeError::Malformed {
                        what: "constant pool",
                        detail: format!("8-byte constant at index {} has no second slot in a pool of {}", index, count),
                    }
                })?;
                entries.push(Constant::Unusable);
                index = next + 1;
            } else {
                index += 1;
            }
        }

        Ok(ConstantPool { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    pub fn utf8(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index) {
            Some(Constant::Utf8(s)) => Ok(s.as_str()),
            _ => Err(DecodeError::BadConstantIndex { index, expected: "Utf8" }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, DecodeError> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(DecodeError::BadConstantIndex { index, expected: "Class" }),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), DecodeError> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(DecodeError::BadConstantIndex { index, expected: "NameAndType" }),
        }
    }

    /// Resolves a Fieldref, Methodref or InterfaceMethodref.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, DecodeError> {
        match self.get(index) {
            Some(
                Constant::FieldRef { class, name_and_type }
                | Constant::MethodRef { class, name_and_type }
                | Constant::InterfaceMethodRef { class, name_and_type },
            ) => {
                let owner = self.class_name(*class)?;
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MemberRef { owner, name, descriptor })
            }
            _ => Err(DecodeError::BadConstantIndex { index, expected: "member reference" }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line: u16,
}

#[derive(Debug, Clone)]
pub struct Code<'a> {
    pub max_stack: u16,
    pub max_locals: u16,
    /// Absolute offset of `bytes` within the class file.
    pub offset: usize,
    pub bytes: &'a [u8],
    pub exception_table: Vec<ExceptionHandler>,
    pub line_numbers: Vec<LineNumber>,
}

impl Code<'_> {
    /// Source line of the instruction at `pc`, if the method carries a line table.
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.line_numbers
            .iter()
            .filter(|ln| ln.start_pc as usize <= pc)
            .max_by_key(|ln| ln.start_pc)
            .map(|ln| ln.line as u32)
    }
}

#[derive(Debug, Clone)]
pub struct Field {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone)]
pub struct Method<'a> {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    /// Set by the pre-1.5 `Synthetic` attribute.
    pub synthetic_attribute: bool,
    pub code: Option<Code<'a>>,
}

impl Method<'_> {
    pub fn is_static(&self) -> bool {
        self.access_flags & ACC_STATIC != 0
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic_attribute || self.access_flags & (ACC_SYNTHETIC | ACC_BRIDGE) != 0
    }
}

#[derive(Debug, Clone)]
pub struct ClassFile<'a> {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method<'a>>,
    pub source_file: Option<String>,
    /// Type descriptors (`Lkotlin/Metadata;`) of class-level annotations.
    pub annotations: Vec<String>,
}

impl<'a> ClassFile<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(bytes);
        let magic = r.u32()?;
        if magic != MAGIC {
            return Err(DecodeError::BadMagic(magic));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r)?;
        let pool = &constant_pool;

        let access_flags = r.u16()?;
        let this_class = pool.class_name(r.u16()?)?.to_string();
        let super_index = r.u16()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?.to_string())
        };

        let interface_count = r.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u16()?)?.to_string());
        }

        let field_count = r.u16()?;
        let mut fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let access_flags = r.u16()?;
            let name = pool.utf8(r.u16()?)?.to_string();
            let descriptor = pool.utf8(r.u16()?)?.to_string();
            skip_attributes(&mut r)?;
            fields.push(Field { access_flags, name, descriptor });
        }

        let method_count = r.u16()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(parse_method(&mut r, bytes, pool)?);
        }

        let mut source_file = None;
        let mut annotations = Vec::new();
        let attribute_count = r.u16()?;
        for _ in 0..attribute_count {
            let name = pool.utf8(r.u16()?)?;
            let len = r.u32()? as usize;
            let body = r.take(len)?;
            match name {
                "SourceFile" => {
                    let mut br = Reader::new(body);
                    source_file = Some(pool.utf8(br.u16()?)?.to_string());
                }
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    let mut br = Reader::new(body);
                    let count = br.u16()?;
                    for _ in 0..count {
                        annotations.push(read_annotation(&mut br, pool)?);
                    }
                }
                _ => {}
            }
        }

        Ok(ClassFile {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            source_file,
            annotations,
        })
    }

    pub fn is_enum(&self) -> bool {
        self.access_flags & ACC_ENUM != 0 && self.super_class.as_deref() == Some("java/lang/Enum")
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags & ACC_INTERFACE != 0
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Method<'a>> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

fn parse_method<'a>(
    r: &mut Reader<'a>,
    bytes: &'a [u8],
    pool: &ConstantPool,
) -> Result<Method<'a>, DecodeError> {
    let access_flags = r.u16()?;
    let name = pool.utf8(r.u16()?)?.to_string();
    let descriptor = pool.utf8(r.u16()?)?.to_string();

    let mut code = None;
    let mut synthetic_attribute = false;
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let start = r.position();
        match attr_name {
            "Code" => {
                code = Some(parse_code(&mut Reader::at(bytes, start), pool)?);
            }
            "Synthetic" => synthetic_attribute = true,
            _ => {}
        }
        // Re-sync on the declared length whatever the body parser consumed.
        *r = Reader::at(bytes, start);
        r.take(len)?;
    }

    Ok(Method { access_flags, name, descriptor, synthetic_attribute, code })
}

fn parse_code<'a>(r: &mut Reader<'a>, pool: &ConstantPool) -> Result<Code<'a>, DecodeError> {
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let code_len = r.u32()? as usize;
    let offset = r.position();
    let bytes = r.take(code_len)?;

    let handler_count = r.u16()?;
    let mut exception_table = Vec::with_capacity(handler_count as usize);
    for _ in 0..handler_count {
        exception_table.push(ExceptionHandler {
            start_pc: r.u16()?,
            end_pc: r.u16()?,
            handler_pc: r.u16()?,
            catch_type: r.u16()?,
        });
    }

    let mut line_numbers = Vec::new();
    let attribute_count = r.u16()?;
    for _ in 0..attribute_count {
        let name = pool.utf8(r.u16()?)?;
        let len = r.u32()? as usize;
        let body = r.take(len)?;
        if name == "LineNumberTable" {
            let mut br = Reader::new(body);
            let count = br.u16()?;
            for _ in 0..count {
                line_numbers.push(LineNumber { start_pc: br.u16()?, line: br.u16()? });
            }
        }
    }

    Ok(Code { max_stack, max_locals, offset, bytes, exception_table, line_numbers })
}

fn skip_attributes(r: &mut Reader<'_>) -> Result<(), DecodeError> {
    let count = r.u16()?;
    for _ in 0..count {
        r.u16()?;
        let len = r.u32()? as usize;
        r.take(len)?;
    }
    Ok(())
}

fn read_annotation(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<String, DecodeError> {
    let type_name = pool.utf8(r.u16()?)?.to_string();
    let pairs = r.u16()?;
    for _ in 0..pairs {
        r.u16()?;
        skip_element_value(r, pool)?;
    }
    Ok(type_name)
}

fn skip_element_value(r: &mut Reader<'_>, pool: &ConstantPool) -> Result<(), DecodeError> {
    let tag = r.u8()?;
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => {
            r.u16()?;
        }
        b'e' => {
            r.u16()?;
            r.u16()?;
        }
        b'@' => {
            read_annotation(r, pool)?;
        }
        b'[' => {
            let count = r.u16()?;
            for _ in 0..count {
                skip_element_value(r, pool)?;
            }
        }
        other => {
            return Err(DecodeError::Malformed {
                what: "annotation",
                detail: format!("unknown element value tag {:?}", other as char),
            });
        }
    }
    Ok(())
}

/// Decodes the JVM's modified UTF-8: `C0 80` encodes NUL and supplementary
/// characters arrive as surrogate pairs.
fn decode_modified_utf8(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((((b & 0x1F) as u16) << 6) | (bytes[i + 1] & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (((b & 0x0F) as u16) << 12)
                    | (((bytes[i + 1] & 0x3F) as u16) << 6)
                    | (bytes[i + 2] & 0x3F) as u16,
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}
