//! First-class functions, compiled function records, and the builder that
//! freezes bytecode into a program.

use basalt_asm::ops::CallableKind;
use basalt_asm::Bytecode;

use crate::call::Handler;
use crate::context::TypeContext;
use crate::hash;
use crate::program::{Program, ProgramInner};

/// Entry point of a native host function.
///
/// The callee pulls its arguments through [`Handler::take_arg`] and stores
/// any result through [`Handler::set_return`]. A non-zero return code is
/// surfaced to script code as a runtime error; arguments the callee never
/// took remain owned by the stack and are destroyed in the post-call
/// unwind.
pub type NativeFn = fn(&mut Handler) -> i32;

/// A callable value: a native entry point or a compiled script function.
///
/// The kind discriminant is inseparable from the pointer; two slots wide as
/// a stack value.
#[derive(Debug, Clone, Copy)]
#[repr(C, u64)]
pub enum Function {
    /// A native host function.
    Native(NativeFn),
    /// An immutable, program-owned function record.
    Script(*const FunctionRecord),
}

static_assertions::const_assert_eq!(core::mem::size_of::<Function>(), 16);
static_assertions::const_assert_eq!(core::mem::size_of::<usize>(), 8);

impl Function {
    /// Wrap a script record.
    pub fn script(record: &FunctionRecord) -> Self {
        Self::Script(record)
    }

    /// The kind discriminant and raw callable bits, as encoded into
    /// immediate call instructions.
    pub fn to_parts(self) -> (CallableKind, u64) {
        match self {
            Self::Native(f) => (CallableKind::Native, f as usize as u64),
            Self::Script(r) => (CallableKind::Script, r as u64),
        }
    }

    /// Rebuild from the encoded parts.
    ///
    /// # Safety
    ///
    /// `bits` must be a pointer previously produced by [`Self::to_parts`]
    /// for the matching kind, and for the script kind the record must still
    /// be alive.
    pub(crate) unsafe fn from_parts(kind: CallableKind, bits: u64) -> Self {
        match kind {
            CallableKind::Native => {
                Self::Native(unsafe { core::mem::transmute::<u64, NativeFn>(bits) })
            }
            CallableKind::Script => Self::Script(bits as usize as *const FunctionRecord),
        }
    }

    /// The script record, when this is a script function.
    pub fn record(&self) -> Option<&FunctionRecord> {
        match self {
            Self::Native(_) => None,
            // Records are arena-owned and immutable for the program's life.
            Self::Script(record) => Some(unsafe { &**record }),
        }
    }

    /// Identity hash over kind and callable address.
    pub fn hash(&self) -> u64 {
        let (kind, bits) = self.to_parts();
        hash::combine(hash::hash_word(kind as u64), bits)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        let (sk, sb) = self.to_parts();
        let (ok, ob) = other.to_parts();
        sk == ok && sb == ob
    }
}

impl Eq for Function {}

// Callables are immutable: native entry points are plain fns, records never
// change after build.
unsafe impl Send for Function {}
unsafe impl Sync for Function {}

/// An immutable, program-owned compiled function.
///
/// The record is pointer-stable for the program's lifetime; bytecode is
/// frozen at build time and never mutated.
#[derive(Debug)]
pub struct FunctionRecord {
    program: *const ProgramInner,
    fq_name: Box<str>,
    name: Box<str>,
    return_type: *const TypeContext,
    arg_types: Box<[*const TypeContext]>,
    stack_slots: usize,
    bytecode: Box<[Bytecode]>,
}

unsafe impl Send for FunctionRecord {}
unsafe impl Sync for FunctionRecord {}

impl FunctionRecord {
    /// Fully-qualified name, the registry key.
    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    /// Short name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared return type, if any.
    pub fn return_type(&self) -> Option<&TypeContext> {
        unsafe { self.return_type.as_ref() }
    }

    /// Number of formal parameters.
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    /// Declared argument type at `index`.
    pub fn arg_type(&self, index: usize) -> &TypeContext {
        unsafe { &*self.arg_types[index] }
    }

    /// Stack slots the function's frame requires.
    pub fn stack_slots(&self) -> usize {
        self.stack_slots
    }

    /// The frozen bytecode.
    pub fn bytecode(&self) -> &[Bytecode] {
        &self.bytecode
    }

    /// First instruction, where execution enters.
    pub fn bytecode_start(&self) -> *const Bytecode {
        self.bytecode.as_ptr()
    }

    /// The owning program.
    pub(crate) fn program(&self) -> &ProgramInner {
        unsafe { &*self.program }
    }
}

/// Accumulates a function under compilation and freezes it into a program.
#[derive(Debug)]
pub struct FunctionBuilder {
    fq_name: String,
    name: String,
    return_type: *const TypeContext,
    arg_types: Vec<*const TypeContext>,
    stack_slots: usize,
    bytecode: Vec<Bytecode>,
}

impl FunctionBuilder {
    /// Start a function with its fully-qualified and short names.
    pub fn new(fq_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fq_name: fq_name.into(),
            name: name.into(),
            return_type: core::ptr::null(),
            arg_types: Vec::new(),
            stack_slots: 0,
            bytecode: Vec::new(),
        }
    }

    /// Declare the return type.
    pub fn with_return_type(mut self, context: &TypeContext) -> Self {
        self.return_type = context;
        self
    }

    /// Declare the frame size in slots.
    pub fn with_stack_slots(mut self, slots: usize) -> Self {
        self.stack_slots = slots;
        self
    }

    /// Append one formal parameter.
    pub fn add_arg(&mut self, context: &TypeContext) {
        self.arg_types.push(context);
    }

    /// Append one bytecode word.
    pub fn push_bytecode(&mut self, word: Bytecode) {
        self.bytecode.push(word);
    }

    /// Append a run of bytecode words (a multi-word instruction).
    pub fn push_bytecode_many(&mut self, words: &[Bytecode]) {
        self.bytecode.extend_from_slice(words);
    }

    /// Number of words accumulated so far. Useful for jump-offset fixups.
    pub fn bytecode_len(&self) -> usize {
        self.bytecode.len()
    }

    /// Freeze into an arena-owned record and register it under the
    /// fully-qualified name. Panics on an empty body or a duplicate name.
    pub fn build(self, program: &mut Program) -> &FunctionRecord {
        assert!(
            !self.bytecode.is_empty(),
            "function {} has no bytecode",
            self.fq_name
        );
        let record = FunctionRecord {
            program: program.inner_ptr(),
            fq_name: self.fq_name.into_boxed_str(),
            name: self.name.into_boxed_str(),
            return_type: self.return_type,
            arg_types: self.arg_types.into_boxed_slice(),
            stack_slots: self.stack_slots,
            bytecode: self.bytecode.into_boxed_slice(),
        };
        program.register_function(record)
    }
}
