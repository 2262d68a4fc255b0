#![allow(dead_code)]

//! Byte-level class file assembler and the fixture classes built with it.

use std::collections::HashMap;

use jvm_mutator::classfile::{ACC_ENUM, ACC_FINAL, ACC_PRIVATE, ACC_PUBLIC, ACC_STATIC, ACC_SUPER, ACC_SYNTHETIC};
use jvm_mutator::insn::opcodes::*;

pub const OBJECT: &str = "java/lang/Object";

pub const ILOAD_1: u8 = 0x1b;
pub const ILOAD_2: u8 = 0x1c;
pub const ALOAD_1: u8 = 0x2b;
pub const ALOAD_3: u8 = 0x2d;
pub const ISTORE_1: u8 = 0x3c;
pub const ISTORE_2: u8 = 0x3d;
pub const ASTORE_3: u8 = 0x4e;
pub const AASTORE: u8 = 0x53;

fn u16be(v: u16) -> [u8; 2] {
    v.to_be_bytes()
}

/// One method body under construction.
#[derive(Debug, Clone, Default)]
pub struct Asm {
    code: Vec<u8>,
    max_stack: u16,
    max_locals: u16,
    handlers: Vec<[u16; 4]>,
    lines: Vec<(u16, u16)>,
}

impl Asm {
    pub fn new(max_stack: u16, max_locals: u16) -> Self {
        Asm { max_stack, max_locals, ..Asm::default() }
    }

    pub fn offset(&self) -> usize {
        self.code.len()
    }

    pub fn op(mut self, opcode: u8) -> Self {
        self.code.push(opcode);
        self
    }

    pub fn op_u8(mut self, opcode: u8, operand: u8) -> Self {
        self.code.extend([opcode, operand]);
        self
    }

    pub fn op_u16(mut self, opcode: u8, operand: u16) -> Self {
        self.code.push(opcode);
        self.code.extend(u16be(operand));
        self
    }

    /// A 16-bit branch to the absolute code offset `target`.
    pub fn branch(mut self, opcode: u8, target: u16) -> Self {
        let delta = target as i32 - self.code.len() as i32;
        self.code.push(opcode);
        self.code.extend((delta as i16).to_be_bytes());
        self
    }

    pub fn iinc(mut self, local: u8, delta: i8) -> Self {
        self.code.extend([IINC, local, delta as u8]);
        self
    }

    pub fn invokeinterface(mut self, index: u16, count: u8) -> Self {
        self.code.push(INVOKEINTERFACE);
        self.code.extend(u16be(index));
        self.code.extend([count, 0]);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Starts source line `line` at the current offset.
    pub fn line(mut self, line: u16) -> Self {
        self.lines.push((self.code.len() as u16, line));
        self
    }

    pub fn handler(mut self, start: u16, end: u16, handler: u16, catch_type: u16) -> Self {
        self.handlers.push([start, end, handler, catch_type]);
        self
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }
}

#[derive(Debug, Clone)]
struct MethodDef {
    access: u16,
    name: u16,
    descriptor: u16,
    body: Option<Asm>,
    synthetic_attribute: bool,
}

/// Assembles a class file with a growing constant pool.
pub struct ClassBuilder {
    pool: Vec<u8>,
    next_index: u16,
    cache: HashMap<(u8, String), u16>,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<(u16, u16, u16)>,
    methods: Vec<MethodDef>,
    source_file: Option<u16>,
    annotations: Vec<u16>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_class: &str) -> Self {
        let mut b = ClassBuilder {
            pool: Vec::new(),
            next_index: 1,
            cache: HashMap::new(),
            access: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            source_file: None,
            annotations: Vec::new(),
        };
        b.this_class = b.class(name);
        b.super_class = b.class(super_class);
        b
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        let index = self.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn source_file(mut self, name: &str) -> Self {
        self.source_file = Some(self.utf8(name));
        self
    }

    /// A class-level annotation without elements, e.g. `Lkotlin/Metadata;`.
    pub fn annotation(mut self, descriptor: &str) -> Self {
        let index = self.utf8(descriptor);
        self.annotations.push(index);
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.fields.push((access, name, descriptor));
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str, body: Asm) -> Self {
        self.push_method(access, name, descriptor, Some(body), false);
        self
    }

    pub fn abstract_method(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.push_method(access, name, descriptor, None, false);
        self
    }

    /// A method flagged only through the old `Synthetic` attribute.
    pub fn synthetic_attribute_method(mut self, access: u16, name: &str, descriptor: &str, body: Asm) -> Self {
        self.push_method(access, name, descriptor, Some(body), true);
        self
    }

    fn push_method(&mut self, access: u16, name: &str, descriptor: &str, body: Option<Asm>, synthetic_attribute: bool) {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.methods.push(MethodDef { access, name, descriptor, body, synthetic_attribute });
    }

    fn entry(&mut self, tag: u8, key: String, body: &[u8], slots: u16) -> u16 {
        if let Some(index) = self.cache.get(&(tag, key.clone())) {
            return *index;
        }
        let index = self.next_index;
        self.pool.push(tag);
        self.pool.extend_from_slice(body);
        self.next_index += slots;
        self.cache.insert((tag, key), index);
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        let mut body = u16be(s.len() as u16).to_vec();
        body.extend_from_slice(s.as_bytes());
        self.entry(1, s.to_string(), &body, 1)
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        self.entry(3, v.to_string(), &v.to_be_bytes(), 1)
    }

    pub fn long(&mut self, v: i64) -> u16 {
        self.entry(5, v.to_string(), &v.to_be_bytes(), 2)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let utf8 = self.utf8(name);
        self.entry(7, name.to_string(), &u16be(utf8), 1)
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let utf8 = self.utf8(s);
        self.entry(8, s.to_string(), &u16be(utf8), 1)
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let n = self.utf8(name);
        let d = self.utf8(descriptor);
        let mut body = u16be(n).to_vec();
        body.extend(u16be(d));
        self.entry(12, format!("{}:{}", name, descriptor), &body, 1)
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let nat = self.name_and_type(name, descriptor);
        let mut body = u16be(class).to_vec();
        body.extend(u16be(nat));
        self.entry(tag, format!("{}.{}:{}", owner, name, descriptor), &body, 1)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, owner, name, descriptor)
    }

    pub fn interface_method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(11, owner, name, descriptor)
    }

    pub fn build(mut self) -> Vec<u8> {
        // Attribute names must be in the pool before it is written out.
        let code_name = self.utf8("Code");
        let lines_name = self.utf8("LineNumberTable");
        let synthetic_name = self.utf8("Synthetic");
        let source_name = self.utf8("SourceFile");
        let annotations_name = self.utf8("RuntimeVisibleAnnotations");

        let mut out = Vec::new();
        out.extend(0xCAFEBABEu32.to_be_bytes());
        out.extend(u16be(0));
        out.extend(u16be(52));
        out.extend(u16be(self.next_index));
        out.extend_from_slice(&self.pool);

        out.extend(u16be(self.access));
        out.extend(u16be(self.this_class));
        out.extend(u16be(self.super_class));
        out.extend(u16be(self.interfaces.len() as u16));
        for i in &self.interfaces {
            out.extend(u16be(*i));
        }

        out.extend(u16be(self.fields.len() as u16));
        for (access, name, descriptor) in &self.fields {
            out.extend(u16be(*access));
            out.extend(u16be(*name));
            out.extend(u16be(*descriptor));
            out.extend(u16be(0));
        }

        out.extend(u16be(self.methods.len() as u16));
        for m in &self.methods {
            out.extend(u16be(m.access));
            out.extend(u16be(m.name));
            out.extend(u16be(m.descriptor));
            let count = m.body.is_some() as u16 + m.synthetic_attribute as u16;
            out.extend(u16be(count));
            if let Some(body) = &m.body {
                let mut attr = Vec::new();
                attr.extend(u16be(body.max_stack));
                attr.extend(u16be(body.max_locals));
                attr.extend((body.code.len() as u32).to_be_bytes());
                attr.extend_from_slice(&body.code);
                attr.extend(u16be(body.handlers.len() as u16));
                for h in &body.handlers {
                    for v in h {
                        attr.extend(u16be(*v));
                    }
                }
                if body.lines.is_empty() {
                    attr.extend(u16be(0));
                } else {
                    attr.extend(u16be(1));
                    attr.extend(u16be(lines_name));
                    attr.extend(((2 + 4 * body.lines.len()) as u32).to_be_bytes());
                    attr.extend(u16be(body.lines.len() as u16));
                    for (pc, line) in &body.lines {
                        attr.extend(u16be(*pc));
                        attr.extend(u16be(*line));
                    }
                }
                out.extend(u16be(code_name));
                out.extend((attr.len() as u32).to_be_bytes());
                out.extend(attr);
            }
            if m.synthetic_attribute {
                out.extend(u16be(synthetic_name));
                out.extend(0u32.to_be_bytes());
            }
        }

        let count = self.source_file.is_some() as u16 + !self.annotations.is_empty() as u16;
        out.extend(u16be(count));
        if let Some(file) = self.source_file {
            out.extend(u16be(source_name));
            out.extend(2u32.to_be_bytes());
            out.extend(u16be(file));
        }
        if !self.annotations.is_empty() {
            out.extend(u16be(annotations_name));
            out.extend(((2 + 4 * self.annotations.len()) as u32).to_be_bytes());
            out.extend(u16be(self.annotations.len() as u16));
            for a in &self.annotations {
                out.extend(u16be(*a));
                out.extend(u16be(0));
            }
        }
        out
    }
}

/// Offset of `code` inside `class`, for checking where a patch landed.
pub fn find_code(class: &[u8], code: &[u8]) -> usize {
    class
        .windows(code.len())
        .position(|w| w == code)
        .expect("code present in class")
}

pub fn default_constructor(b: &mut ClassBuilder, super_class: &str) -> Asm {
    let init = b.method_ref(super_class, "<init>", "()V");
    Asm::new(1, 1).op(ALOAD_0).op_u16(INVOKESPECIAL, init).op(RETURN)
}

// --- fixtures ---

/// `add(II)I` returning `a + b`: exactly one MATH candidate.
pub fn adder(name: &str) -> ClassBuilder {
    let mut b = ClassBuilder::new(name, OBJECT);
    let init = default_constructor(&mut b, OBJECT);
    b.method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC, "add", "(II)I", adder_body())
}

pub fn adder_body() -> Asm {
    Asm::new(2, 3).op(ILOAD_1).op(ILOAD_2).op(IADD).op(IRETURN)
}

pub fn adder_class(name: &str) -> Vec<u8> {
    adder(name).build()
}

pub const MULTIPLE: &str = "com/example/HasMultipleMutations";

/// `int mutable() { int i = 10; for (int x = 0; x != 10; x++) i <<= 1; return -i; }`
///
/// Candidates under DEFAULTS, in order: NEGATE_CONDITIONALS at 8, MATH at 13,
/// INCREMENTS at 15, INVERT_NEGS at 22.
pub fn multiple_mutations_body() -> Asm {
    Asm::new(2, 3)
        .line(5)
        .op_u8(BIPUSH, 10) // 0
        .op(ISTORE_1) // 2
        .op(ICONST_0) // 3
        .op(ISTORE_2) // 4
        .line(6)
        .op(ILOAD_2) // 5
        .op_u8(BIPUSH, 10) // 6
        .branch(IF_ICMPEQ, 21) // 8
        .line(7)
        .op(ILOAD_1) // 11
        .op(ICONST_1) // 12
        .op(ISHL) // 13
        .op(ISTORE_1) // 14
        .line(6)
        .iinc(2, 1) // 15
        .branch(GOTO, 5) // 18
        .line(9)
        .op(ILOAD_1) // 21
        .op(INEG) // 22
        .op(IRETURN) // 23
}

pub fn multiple_mutations_class() -> Vec<u8> {
    let mut b = ClassBuilder::new(MULTIPLE, OBJECT).source_file("HasMultipleMutations.java");
    let init = default_constructor(&mut b, OBJECT);
    b.method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC, "mutable", "()I", multiple_mutations_body())
        .build()
}

pub const FINALLY: &str = "com/example/HasFinallyAroundReturn";

/// `int foo(int i) { try { return i; } finally { bar(); } }` as javac emits
/// it: the finally body is copied onto both the normal and the exceptional
/// exit, so `bar()` is called at offsets 3 and 10.
pub fn finally_class() -> Vec<u8> {
    let mut b = ClassBuilder::new(FINALLY, OBJECT).source_file("HasFinallyAroundReturn.java");
    let bar = b.method_ref(FINALLY, "bar", "()V");
    let init = default_constructor(&mut b, OBJECT);
    let foo = Asm::new(1, 4)
        .line(4)
        .op(ILOAD_1) // 0
        .op(ISTORE_2) // 1
        .line(6)
        .op(ALOAD_0) // 2
        .op_u16(INVOKEVIRTUAL, bar) // 3
        .line(4)
        .op(ILOAD_2) // 6
        .op(IRETURN) // 7
        .line(6)
        .op(ASTORE_3) // 8
        .op(ALOAD_0) // 9
        .op_u16(INVOKEVIRTUAL, bar) // 10
        .op(ALOAD_3) // 13
        .op(ATHROW) // 14
        .handler(0, 2, 8, 0);
    b.method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC, "foo", "(I)I", foo)
        .method(ACC_PUBLIC, "bar", "()V", Asm::new(0, 1).op(RETURN))
        .build()
}

pub const ASSERT: &str = "com/example/HasAssert";

/// `void foo(int i) { assert i + 20 > 10; }`, optionally followed by
/// `if (i > 1) state = 1;` outside the assertion.
pub fn assert_class(with_conditional: bool) -> Vec<u8> {
    let mut b = ClassBuilder::new(ASSERT, OBJECT).source_file("HasAssert.java");
    let flag = b.field_ref(ASSERT, "$assertionsDisabled", "Z");
    let state = b.field_ref(ASSERT, "state", "I");
    let error = b.class("java/lang/AssertionError");
    let error_init = b.method_ref("java/lang/AssertionError", "<init>", "()V");
    let this = b.class(ASSERT);
    let status = b.method_ref("java/lang/Class", "desiredAssertionStatus", "()Z");
    let init = default_constructor(&mut b, OBJECT);

    let mut foo = Asm::new(2, 2)
        .line(7)
        .op_u16(GETSTATIC, flag) // 0
        .branch(IFNE, 23) // 3
        .op(ILOAD_1) // 6
        .op_u8(BIPUSH, 20) // 7
        .op(IADD) // 9
        .op_u8(BIPUSH, 10) // 10
        .branch(IF_ICMPGT, 23) // 12
        .op_u16(NEW, error) // 15
        .op(DUP) // 18
        .op_u16(INVOKESPECIAL, error_init) // 19
        .op(ATHROW); // 22
    if with_conditional {
        foo = foo
            .line(8)
            .op(ILOAD_1) // 23
            .op(ICONST_1) // 24
            .branch(IF_ICMPLE, 33) // 25
            .op(ALOAD_0) // 28
            .op(ICONST_1) // 29
            .op_u16(PUTFIELD, state); // 30
    }
    foo = foo.line(10).op(RETURN);

    let clinit = Asm::new(1, 0)
        .op_u8(LDC, this as u8) // 0
        .op_u16(INVOKEVIRTUAL, status) // 2
        .branch(IFNE, 12) // 5
        .op(ICONST_1) // 8
        .branch(GOTO, 13) // 9
        .op(ICONST_0) // 12
        .op_u16(PUTSTATIC, flag) // 13
        .op(RETURN); // 16

    b.field(ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, "$assertionsDisabled", "Z")
        .field(0, "state", "I")
        .method(0, "<init>", "()V", init)
        .method(ACC_PUBLIC, "foo", "(I)V", foo)
        .method(ACC_STATIC, "<clinit>", "()V", clinit)
        .build()
}

pub const ENUM: &str = "com/example/Colour";

/// `enum Colour { RED }`, with a constructor that does arithmetic when
/// `custom_constructor` is set. The static initializer calls the void
/// `register()` so that it would offer a candidate if it were eligible.
pub fn enum_class(custom_constructor: bool) -> Vec<u8> {
    let array = format!("[L{};", ENUM);
    let values_desc = format!("(){}", array);
    let value_of_desc = format!("(Ljava/lang/String;)L{};", ENUM);
    let self_desc = format!("L{};", ENUM);

    let mut b = ClassBuilder::new(ENUM, "java/lang/Enum")
        .access(ACC_PUBLIC | ACC_FINAL | ACC_SUPER | ACC_ENUM)
        .source_file("Colour.java");
    let values_field = b.field_ref(ENUM, "$VALUES", &array);
    let red = b.field_ref(ENUM, "RED", &self_desc);
    let array_class = b.class(&array);
    let this = b.class(ENUM);
    let clone = b.method_ref(&array, "clone", "()Ljava/lang/Object;");
    let enum_value_of = b.method_ref(
        "java/lang/Enum",
        "valueOf",
        "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
    );
    let enum_init = b.method_ref("java/lang/Enum", "<init>", "(Ljava/lang/String;I)V");
    let self_init = b.method_ref(ENUM, "<init>", "(Ljava/lang/String;I)V");
    let register = b.method_ref(ENUM, "register", "()V");
    let counter = b.field_ref(ENUM, "counter", "I");
    let red_name = b.string("RED");

    let values = Asm::new(1, 0)
        .op_u16(GETSTATIC, values_field)
        .op_u16(INVOKEVIRTUAL, clone)
        .op_u16(CHECKCAST, array_class)
        .op(ARETURN);
    let value_of = Asm::new(2, 1)
        .op_u8(LDC, this as u8)
        .op(ALOAD_0)
        .op_u16(INVOKESTATIC, enum_value_of)
        .op_u16(CHECKCAST, this)
        .op(ARETURN);
    let mut init = Asm::new(3, 3)
        .op(ALOAD_0)
        .op(ALOAD_1)
        .op(ILOAD_2)
        .op_u16(INVOKESPECIAL, enum_init);
    if custom_constructor {
        init = init
            .op(ALOAD_0)
            .op(DUP)
            .op_u16(GETFIELD, counter)
            .op(ICONST_1)
            .op(IADD)
            .op_u16(PUTFIELD, counter);
    }
    init = init.op(RETURN);
    let clinit = Asm::new(4, 0)
        .op_u16(NEW, this)
        .op(DUP)
        .op_u8(LDC, red_name as u8)
        .op(ICONST_0)
        .op_u16(INVOKESPECIAL, self_init)
        .op_u16(PUTSTATIC, red)
        .op(ICONST_1)
        .op_u16(ANEWARRAY, this)
        .op(DUP)
        .op(ICONST_0)
        .op_u16(GETSTATIC, red)
        .op(AASTORE)
        .op_u16(PUTSTATIC, values_field)
        .op_u16(INVOKESTATIC, register)
        .op(RETURN);

    b.field(ACC_PUBLIC | ACC_STATIC | ACC_FINAL | ACC_ENUM, "RED", &self_desc)
        .field(ACC_PRIVATE | ACC_STATIC | ACC_FINAL | ACC_SYNTHETIC, "$VALUES", &array)
        .field(ACC_PRIVATE, "counter", "I")
        .method(ACC_PUBLIC | ACC_STATIC, "values", &values_desc, values)
        .method(ACC_PUBLIC | ACC_STATIC, "valueOf", &value_of_desc, value_of)
        .method(ACC_PRIVATE, "<init>", "(Ljava/lang/String;I)V", init)
        .method(ACC_PRIVATE | ACC_STATIC, "register", "()V", Asm::new(0, 0).op(RETURN))
        .method(ACC_STATIC, "<clinit>", "()V", clinit)
        .build()
}

/// An adder class that also implements or extends the given markers.
pub fn marked_adder(name: &str, super_class: &str, interfaces: &[&str], annotations: &[&str]) -> Vec<u8> {
    let mut b = ClassBuilder::new(name, super_class);
    for i in interfaces {
        b = b.interface(i);
    }
    for a in annotations {
        b = b.annotation(a);
    }
    let init = default_constructor(&mut b, super_class);
    b.method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC, "add", "(II)I", adder_body())
        .build()
}

pub const LOGGING: &str = "com/example/LogsThings";

/// Line 10 logs through slf4j and adds; line 11 multiplies and returns.
pub fn logging_class() -> Vec<u8> {
    let mut b = ClassBuilder::new(LOGGING, OBJECT).source_file("LogsThings.java");
    let log = b.field_ref(LOGGING, "LOG", "Lorg/slf4j/Logger;");
    let info = b.interface_method_ref("org/slf4j/Logger", "info", "(Ljava/lang/String;)V");
    let message = b.string("called");
    let init = default_constructor(&mut b, OBJECT);
    let body = Asm::new(2, 2)
        .line(10)
        .op_u16(GETSTATIC, log) // 0
        .op_u8(LDC, message as u8) // 3
        .invokeinterface(info, 2) // 5
        .op(ILOAD_1) // 10
        .op(ICONST_1) // 11
        .op(IADD) // 12
        .op(ISTORE_1) // 13
        .line(11)
        .op(ILOAD_1) // 14
        .op(ICONST_2) // 15
        .op(IMUL) // 16
        .op(IRETURN); // 17
    b.field(ACC_PRIVATE | ACC_STATIC | ACC_FINAL, "LOG", "Lorg/slf4j/Logger;")
        .method(ACC_PUBLIC, "<init>", "()V", init)
        .method(ACC_PUBLIC, "log", "(I)I", body)
        .build()
}
