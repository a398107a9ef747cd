//! Shared helpers for the integration tests: an in-memory class file writer, a small
//! bytecode assembler and stubs for the classes the runtime always needs.

#![allow(dead_code)]

use std::collections::HashMap;

use jvmaot::{dependencies::RUNTIME_CLASSES, ClassSource, Compiler, CompilerConfig};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

/// Opcodes used by the tests.
pub mod op {
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_M1: u8 = 0x02;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const BIPUSH: u8 = 0x10;
    pub const LDC: u8 = 0x12;
    pub const ILOAD: u8 = 0x15;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ILOAD_1: u8 = 0x1b;
    pub const ALOAD_0: u8 = 0x2a;
    pub const ALOAD_1: u8 = 0x2b;
    pub const ISTORE: u8 = 0x36;
    pub const ISTORE_0: u8 = 0x3b;
    pub const ISTORE_1: u8 = 0x3c;
    pub const ASTORE_1: u8 = 0x4c;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const DUP_X1: u8 = 0x5a;
    pub const SWAP: u8 = 0x5f;
    pub const IADD: u8 = 0x60;
    pub const IMUL: u8 = 0x68;
    pub const IDIV: u8 = 0x6c;
    pub const IINC: u8 = 0x84;
    pub const IFEQ: u8 = 0x99;
    pub const IF_ICMPGE: u8 = 0xa2;
    pub const GOTO: u8 = 0xa7;
    pub const IRETURN: u8 = 0xac;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const NEW: u8 = 0xbb;
    pub const ATHROW: u8 = 0xbf;
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum Entry {
    Utf8(String),
    Integer(i32),
    Class(u16),
    String(u16),
    Member(u8, u16, u16),
    NameAndType(u16, u16),
}

/// Deduplicating constant pool writer.
#[derive(Default)]
pub struct ConstantPool {
    entries: Vec<Entry>,
    index: HashMap<Entry, u16>,
}

impl ConstantPool {
    fn add(&mut self, entry: Entry) -> u16 {
        if let Some(index) = self.index.get(&entry) {
            return *index;
        }
        self.entries.push(entry.clone());
        let index = self.entries.len() as u16;
        self.index.insert(entry, index);
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        self.add(Entry::Utf8(text.to_string()))
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.add(Entry::Integer(value))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.add(Entry::Class(name))
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let text = self.utf8(text);
        self.add(Entry::String(text))
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let nat = self.add(Entry::NameAndType(name, descriptor));
        self.add(Entry::Member(tag, class, nat))
    }

    pub fn field(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(9, owner, name, descriptor)
    }

    pub fn method(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        self.member(10, owner, name, descriptor)
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u16(out, self.entries.len() as u16 + 1);
        for entry in &self.entries {
            match entry {
                Entry::Utf8(text) => {
                    out.push(1);
                    put_u16(out, text.len() as u16);
                    out.extend_from_slice(text.as_bytes());
                }
                Entry::Integer(value) => {
                    out.push(3);
                    out.extend_from_slice(&value.to_be_bytes());
                }
                Entry::Class(name) => {
                    out.push(7);
                    put_u16(out, *name);
                }
                Entry::String(text) => {
                    out.push(8);
                    put_u16(out, *text);
                }
                Entry::Member(tag, class, nat) => {
                    out.push(*tag);
                    put_u16(out, *class);
                    put_u16(out, *nat);
                }
                Entry::NameAndType(name, descriptor) => {
                    out.push(12);
                    put_u16(out, *name);
                    put_u16(out, *descriptor);
                }
            }
        }
    }
}

fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Bytecode assembler with named branch targets.
#[derive(Default)]
pub struct Asm {
    bytes: Vec<u8>,
    labels: HashMap<&'static str, usize>,
    fixups: Vec<(usize, &'static str)>,
}

impl Asm {
    pub fn op(&mut self, opcode: u8) -> &mut Self {
        self.bytes.push(opcode);
        self
    }

    pub fn op_u8(&mut self, opcode: u8, operand: u8) -> &mut Self {
        self.bytes.extend_from_slice(&[opcode, operand]);
        self
    }

    pub fn op_u16(&mut self, opcode: u8, operand: u16) -> &mut Self {
        self.bytes.push(opcode);
        put_u16(&mut self.bytes, operand);
        self
    }

    pub fn iinc(&mut self, local: u8, amount: i8) -> &mut Self {
        self.bytes.extend_from_slice(&[op::IINC, local, amount as u8]);
        self
    }

    /// Current bytecode offset.
    pub fn pos(&self) -> u16 {
        self.bytes.len() as u16
    }

    pub fn mark(&mut self, label: &'static str) -> &mut Self {
        self.labels.insert(label, self.bytes.len());
        self
    }

    pub fn branch(&mut self, opcode: u8, label: &'static str) -> &mut Self {
        self.fixups.push((self.bytes.len(), label));
        self.bytes.extend_from_slice(&[opcode, 0, 0]);
        self
    }

    pub fn offset_of(&self, label: &str) -> u16 {
        self.labels[label] as u16
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();
        for (at, label) in &self.fixups {
            let offset = (self.labels[label] as i32 - *at as i32) as i16;
            bytes[at + 1..at + 3].copy_from_slice(&offset.to_be_bytes());
        }
        bytes
    }
}

/// One exception table entry.
pub struct Handler {
    pub start: u16,
    pub end: u16,
    pub handler: u16,
    pub catch_type: Option<&'static str>,
}

/// A method body.
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    pub handlers: Vec<Handler>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, bytes: Vec<u8>) -> Self {
        Code {
            max_stack,
            max_locals,
            bytes,
            handlers: Vec::new(),
        }
    }
}

struct Method {
    access: u16,
    name: String,
    descriptor: String,
    code: Option<Code>,
}

/// Writes a class file.
pub struct ClassBuilder {
    pub pool: ConstantPool,
    name: String,
    super_name: Option<String>,
    access: u16,
    interfaces: Vec<String>,
    fields: Vec<(u16, String, String)>,
    methods: Vec<Method>,
}

impl ClassBuilder {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        ClassBuilder {
            pool: ConstantPool::default(),
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            access: ACC_PUBLIC | ACC_SUPER,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// A class directly below the root object.
    pub fn object(name: &str) -> Self {
        Self::new(name, Some("java/lang/Object"))
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn field(mut self, access: u16, name: &str, descriptor: &str) -> Self {
        self.fields.push((access, name.to_string(), descriptor.to_string()));
        self
    }

    pub fn method(mut self, access: u16, name: &str, descriptor: &str, code: Option<Code>) -> Self {
        self.methods.push(Method {
            access,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            code,
        });
        self
    }

    /// Adds a no-argument constructor calling the superclass constructor.
    pub fn default_constructor(mut self) -> Self {
        let super_name = self.super_name.clone().unwrap_or_else(|| "java/lang/Object".into());
        let init = self.pool.method(&super_name, "<init>", "()V");
        let mut asm = Asm::default();
        asm.op(op::ALOAD_0).op_u16(op::INVOKESPECIAL, init).op(op::RETURN);
        self.method(ACC_PUBLIC, "<init>", "()V", Some(Code::new(1, 1, asm.finish())))
    }

    pub fn build(mut self) -> Vec<u8> {
        let this = self.pool.class(&self.name);
        let super_index = match &self.super_name {
            Some(name) => self.pool.class(name),
            None => 0,
        };
        let interfaces: Vec<u16> = self.interfaces.iter().map(|name| self.pool.class(name)).collect();
        let fields: Vec<(u16, u16, u16)> = self
            .fields
            .iter()
            .map(|(access, name, descriptor)| (*access, self.pool.utf8(name), self.pool.utf8(descriptor)))
            .collect();
        let code_name = self.pool.utf8("Code");
        let methods: Vec<(u16, u16, u16)> = self
            .methods
            .iter()
            .map(|method| (method.access, self.pool.utf8(&method.name), self.pool.utf8(&method.descriptor)))
            .collect();
        let mut catch_types = Vec::new();
        for method in &self.methods {
            for handler in method.code.iter().flat_map(|code| &code.handlers) {
                catch_types.push(handler.catch_type.map_or(0, |name| self.pool.class(name)));
            }
        }

        let mut out = Vec::new();
        put_u32(&mut out, 0xCAFE_BABE);
        put_u16(&mut out, 0);
        put_u16(&mut out, 52);
        self.pool.write(&mut out);
        put_u16(&mut out, self.access);
        put_u16(&mut out, this);
        put_u16(&mut out, super_index);
        put_u16(&mut out, interfaces.len() as u16);
        for interface in interfaces {
            put_u16(&mut out, interface);
        }
        put_u16(&mut out, fields.len() as u16);
        for (access, name, descriptor) in fields {
            put_u16(&mut out, access);
            put_u16(&mut out, name);
            put_u16(&mut out, descriptor);
            put_u16(&mut out, 0);
        }

        let mut catch_types = catch_types.into_iter();
        put_u16(&mut out, methods.len() as u16);
        for (method, (access, name, descriptor)) in self.methods.iter().zip(methods) {
            put_u16(&mut out, access);
            put_u16(&mut out, name);
            put_u16(&mut out, descriptor);
            let Some(code) = &method.code else {
                put_u16(&mut out, 0);
                continue;
            };
            put_u16(&mut out, 1);
            put_u16(&mut out, code_name);
            let length = 2 + 2 + 4 + code.bytes.len() + 2 + 8 * code.handlers.len() + 2;
            put_u32(&mut out, length as u32);
            put_u16(&mut out, code.max_stack);
            put_u16(&mut out, code.max_locals);
            put_u32(&mut out, code.bytes.len() as u32);
            out.extend_from_slice(&code.bytes);
            put_u16(&mut out, code.handlers.len() as u16);
            for handler in &code.handlers {
                put_u16(&mut out, handler.start);
                put_u16(&mut out, handler.end);
                put_u16(&mut out, handler.handler);
                put_u16(&mut out, catch_types.next().unwrap_or(0));
            }
            put_u16(&mut out, 0);
        }
        put_u16(&mut out, 0);
        out
    }
}

fn runtime_super(name: &str) -> &'static str {
    match name {
        "java/lang/Throwable" => "java/lang/Object",
        "java/lang/Exception" | "java/lang/Error" => "java/lang/Throwable",
        "java/lang/RuntimeException"
        | "java/lang/ClassNotFoundException"
        | "java/lang/InterruptedException"
        | "java/lang/reflect/InvocationTargetException" => "java/lang/Exception",
        _ if name.ends_with("Exception") => "java/lang/RuntimeException",
        _ if name.ends_with("Error") => "java/lang/Error",
        _ => "java/lang/Object",
    }
}

/// Minimal versions of the root object, the throwable hierarchy and every runtime class.
pub fn runtime_classes() -> Vec<(String, Vec<u8>)> {
    let mut names: Vec<&str> = vec![
        "java/lang/Exception",
        "java/lang/RuntimeException",
        "java/lang/Error",
    ];
    names.extend(RUNTIME_CLASSES.iter().copied());

    let mut object = ClassBuilder::new("java/lang/Object", None);
    let mut asm = Asm::default();
    asm.op(op::RETURN);
    object = object.method(ACC_PUBLIC, "<init>", "()V", Some(Code::new(0, 1, asm.finish())));
    let mut classes = vec![("java/lang/Object".to_string(), object.build())];

    for name in names {
        let builder = if name == "java/lang/Thread$UncaughtExceptionHandler" {
            ClassBuilder::object(name).access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT)
        } else {
            ClassBuilder::new(name, Some(runtime_super(name))).default_constructor()
        };
        classes.push((name.to_string(), builder.build()));
    }
    classes
}

/// A compiler fed with `classes` followed by the runtime stubs.
pub fn compiler(classes: Vec<(&str, Vec<u8>)>, config: CompilerConfig) -> Compiler {
    let mut compiler = Compiler::new(config);
    for (name, data) in classes {
        compiler.add_source(ClassSource::Memory {
            name: format!("{name}.class"),
            data,
        });
    }
    for (name, data) in runtime_classes() {
        compiler.add_source(ClassSource::Memory {
            name: format!("{name}.class"),
            data,
        });
    }
    compiler
}

/// Names of the runtime stub classes.
pub fn runtime_names() -> Vec<String> {
    runtime_classes().into_iter().map(|(name, _)| name).collect()
}
