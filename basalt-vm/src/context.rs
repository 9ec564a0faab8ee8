//! Type contexts: the per-type record driving destruction, cloning,
//! equality, and hashing across the runtime.
//!
//! Every runtime type has one context; the built-ins are singletons and are
//! compared by address. The four fast operations ([`fast_deinit`],
//! [`fast_clone`], [`fast_eql`], [`fast_hash`]) pointer-match against the
//! singletons and inline the native implementation, only falling back to a
//! call through the context's stored [`Function`] for user-defined types.
//! Built-in contexts dominate real bytecode, so skipping the indirect call
//! there is worth the branch ladder.

use std::borrow::Cow;

use basalt_asm::ValueTag;

use crate::call::{CallArgs, Handler, Return};
use crate::function::Function;
use crate::hash;
use crate::value::{
    ScriptArray, ScriptError, ScriptMap, ScriptOption, ScriptRef, ScriptResult, ScriptSet,
    ScriptString, Shared, Unique, Weak,
};

/// One member of a struct type: where it sits and what it is.
#[derive(Debug)]
pub struct MemberContext {
    /// Member name.
    pub name: Cow<'static, str>,
    /// Byte offset within the struct value.
    pub offset: usize,
    /// Member type.
    pub context: *const TypeContext,
}

impl MemberContext {
    /// Describe a member.
    pub fn new(name: impl Into<Cow<'static, str>>, offset: usize, context: &TypeContext) -> Self {
        Self {
            name: name.into(),
            offset,
            context,
        }
    }

    /// The member's type context.
    pub fn context(&self) -> &TypeContext {
        unsafe { &*self.context }
    }
}

// Member contexts point at registered (arena or static) contexts that
// outlive them.
unsafe impl Send for MemberContext {}
unsafe impl Sync for MemberContext {}

/// The record describing one runtime type.
///
/// Immutable after registration; the address doubles as the type's
/// identity, which the dispatcher exploits for built-ins. Alignment is at
/// least 8, leaving the low pointer bit free for the stack's non-owning
/// tag.
#[derive(Debug)]
pub struct TypeContext {
    /// Value size in bytes; at least 1.
    pub size: usize,
    /// Destructor callable; absent for types destruction ignores.
    pub destructor: Option<Function>,
    /// Clone callable; absent for uncloneable types.
    pub clone_fn: Option<Function>,
    /// Equality callable.
    pub eql_fn: Option<Function>,
    /// Hash callable.
    pub hash_fn: Option<Function>,
    /// Display name.
    pub name: Cow<'static, str>,
    /// Member layout of struct types; empty otherwise.
    pub members: Vec<MemberContext>,
}

unsafe impl Send for TypeContext {}
unsafe impl Sync for TypeContext {}

impl TypeContext {
    /// Slots a value of this type occupies.
    pub fn slots(&self) -> usize {
        crate::consts::slots_for_size(self.size)
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A struct type over the given member layout, with memberwise
    /// destruction, cloning, equality, and hashing.
    pub fn new_struct(
        size: usize,
        name: impl Into<Cow<'static, str>>,
        members: Vec<MemberContext>,
    ) -> Self {
        assert!(size >= 1, "type size must be at least one byte");
        Self {
            size,
            destructor: Some(Function::Native(struct_deinit)),
            clone_fn: Some(Function::Native(struct_clone)),
            eql_fn: Some(Function::Native(struct_eql)),
            hash_fn: Some(Function::Native(struct_hash)),
            name: name.into(),
            members,
        }
    }
}

macro_rules! builtin_context {
    ($(#[$docs:meta])* $ident:ident, $ty:ty, $name:literal, destructor: $destructor:expr) => {
        $(#[$docs])*
        pub static $ident: TypeContext = TypeContext {
            size: core::mem::size_of::<$ty>(),
            destructor: $destructor,
            clone_fn: Some(Function::Native(builtin_clone)),
            eql_fn: Some(Function::Native(builtin_eql)),
            hash_fn: Some(Function::Native(builtin_hash)),
            name: Cow::Borrowed($name),
            members: Vec::new(),
        };
    };
}

builtin_context!(
    /// `bool` values.
    BOOL, bool, "bool", destructor: None
);
builtin_context!(
    /// 64-bit signed integers.
    INT, i64, "int", destructor: None
);
builtin_context!(
    /// 64-bit IEEE floats.
    FLOAT, f64, "float", destructor: None
);
builtin_context!(
    /// Unicode scalar values.
    CHAR, char, "char", destructor: None
);
builtin_context!(
    /// Refcounted immutable strings.
    STRING, ScriptString, "string", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Typed growable arrays.
    ARRAY, ScriptArray, "array", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Hashed sets.
    SET, ScriptSet, "set", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Hashed maps.
    MAP, ScriptMap, "map", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Optional values.
    OPTION, ScriptOption, "option", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Named errors.
    ERROR, ScriptError, "error", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Ok-or-error results.
    RESULT, ScriptResult, "result", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Exclusively-owned sync cells.
    UNIQUE, Unique, "unique", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Shared-ownership sync cells.
    SHARED, Shared, "shared", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// Weak observers of sync cells.
    WEAK, Weak, "weak", destructor: Some(Function::Native(builtin_deinit))
);
builtin_context!(
    /// First-class functions.
    FUNCTION, Function, "function", destructor: None
);
builtin_context!(
    /// Immutable references.
    CONST_REF, ScriptRef, "const_ref", destructor: None
);
builtin_context!(
    /// Mutable references.
    MUT_REF, ScriptRef, "mut_ref", destructor: None
);

/// The built-in context for an encoded value tag.
pub fn for_tag(tag: ValueTag) -> &'static TypeContext {
    match tag {
        ValueTag::None => panic!("the reserved value tag has no context"),
        ValueTag::Bool => &BOOL,
        ValueTag::Int => &INT,
        ValueTag::Float => &FLOAT,
        ValueTag::Char => &CHAR,
        ValueTag::String => &STRING,
        ValueTag::Array => &ARRAY,
        ValueTag::Set => &SET,
        ValueTag::Map => &MAP,
        ValueTag::Option => &OPTION,
        ValueTag::Error => &ERROR,
        ValueTag::Result => &RESULT,
        ValueTag::ConstRef => &CONST_REF,
        ValueTag::MutRef => &MUT_REF,
        ValueTag::Unique => &UNIQUE,
        ValueTag::Shared => &SHARED,
        ValueTag::Weak => &WEAK,
        ValueTag::Function => &FUNCTION,
    }
}

/// Whether values of this context are read through `Dereference`:
/// references and the sync cells.
pub fn is_reference_kind(context: &TypeContext) -> bool {
    core::ptr::eq(context, &CONST_REF)
        || core::ptr::eq(context, &MUT_REF)
        || core::ptr::eq(context, &UNIQUE)
        || core::ptr::eq(context, &SHARED)
        || core::ptr::eq(context, &WEAK)
}

/// Destroy the value at `value`. A context without a destructor is a no-op.
///
/// # Safety
///
/// `value` must point at a live, initialized value of `context`'s type.
pub unsafe fn fast_deinit(value: *mut u8, context: &TypeContext) {
    if context.destructor.is_none() {
        return;
    }
    unsafe {
        if core::ptr::eq(context, &STRING) {
            (*value.cast::<ScriptString>()).deinit();
        } else if core::ptr::eq(context, &ARRAY) {
            (*value.cast::<ScriptArray>()).deinit();
        } else if core::ptr::eq(context, &SET) {
            (*value.cast::<ScriptSet>()).deinit();
        } else if core::ptr::eq(context, &MAP) {
            (*value.cast::<ScriptMap>()).deinit();
        } else if core::ptr::eq(context, &OPTION) {
            (*value.cast::<ScriptOption>()).deinit();
        } else if core::ptr::eq(context, &ERROR) {
            (*value.cast::<ScriptError>()).deinit();
        } else if core::ptr::eq(context, &RESULT) {
            (*value.cast::<ScriptResult>()).deinit();
        } else if core::ptr::eq(context, &UNIQUE) {
            (*value.cast::<Unique>()).deinit();
        } else if core::ptr::eq(context, &SHARED) {
            (*value.cast::<Shared>()).deinit();
        } else if core::ptr::eq(context, &WEAK) {
            (*value.cast::<Weak>()).deinit();
        } else {
            let destructor = context.destructor.expect("checked above");
            let mut args = CallArgs::new(&destructor);
            args.push(ScriptRef::new(value, context), &MUT_REF);
            args.call(Return::none()).expect("destruction can never fail");
        }
    }
}

/// Clone the value at `value` into `out`. The context must carry a clone
/// callable.
///
/// # Safety
///
/// `value` must point at a live value of `context`'s type; `out` must have
/// room for `context.size` bytes.
pub unsafe fn fast_clone(out: *mut u8, value: *const u8, context: &TypeContext) {
    assert!(
        context.clone_fn.is_some(),
        "type {} cannot be cloned",
        context.name()
    );
    unsafe {
        if core::ptr::eq(context, &STRING) {
            out.cast::<ScriptString>()
                .write_unaligned((*value.cast::<ScriptString>()).clone_ref());
        } else if core::ptr::eq(context, &ARRAY) {
            out.cast::<ScriptArray>()
                .write_unaligned((*value.cast::<ScriptArray>()).clone_value());
        } else if core::ptr::eq(context, &SET) {
            out.cast::<ScriptSet>()
                .write_unaligned((*value.cast::<ScriptSet>()).clone_value());
        } else if core::ptr::eq(context, &MAP) {
            out.cast::<ScriptMap>()
                .write_unaligned((*value.cast::<ScriptMap>()).clone_value());
        } else if core::ptr::eq(context, &OPTION) {
            out.cast::<ScriptOption>()
                .write_unaligned((*value.cast::<ScriptOption>()).clone_value());
        } else if core::ptr::eq(context, &ERROR) {
            out.cast::<ScriptError>()
                .write_unaligned((*value.cast::<ScriptError>()).clone_value());
        } else if core::ptr::eq(context, &RESULT) {
            out.cast::<ScriptResult>()
                .write_unaligned((*value.cast::<ScriptResult>()).clone_value());
        } else if core::ptr::eq(context, &UNIQUE) {
            out.cast::<Unique>()
                .write_unaligned((*value.cast::<Unique>()).clone_cell());
        } else if core::ptr::eq(context, &SHARED) {
            out.cast::<Shared>()
                .write_unaligned((*value.cast::<Shared>()).clone_ref());
        } else if core::ptr::eq(context, &WEAK) {
            out.cast::<Weak>()
                .write_unaligned((*value.cast::<Weak>()).clone_ref());
        } else if is_builtin_scalar(context) {
            core::ptr::copy_nonoverlapping(value, out, context.size);
        } else {
            let clone_fn = context.clone_fn.expect("checked above");
            let mut reported: *const TypeContext = core::ptr::null();
            let mut args = CallArgs::new(&clone_fn);
            args.push(ScriptRef::new(value.cast_mut(), context), &CONST_REF);
            args.call(Return::from_raw(out, &mut reported))
                .expect("cloning can never fail");
            debug_assert!(core::ptr::eq(reported, context));
        }
    }
}

/// Whether `a` equals `b`. Both must carry this same context.
///
/// # Safety
///
/// Both pointers must point at live values of `context`'s type.
pub unsafe fn fast_eql(a: *const u8, b: *const u8, context: &TypeContext) -> bool {
    unsafe {
        if core::ptr::eq(context, &BOOL) {
            (*a.cast::<bool>()) == (*b.cast::<bool>())
        } else if core::ptr::eq(context, &INT) {
            (*a.cast::<i64>()) == (*b.cast::<i64>())
        } else if core::ptr::eq(context, &FLOAT) {
            (*a.cast::<f64>()) == (*b.cast::<f64>())
        } else if core::ptr::eq(context, &CHAR) {
            (*a.cast::<u32>()) == (*b.cast::<u32>())
        } else if core::ptr::eq(context, &STRING) {
            (*a.cast::<ScriptString>()).eql(&*b.cast::<ScriptString>())
        } else if core::ptr::eq(context, &ARRAY) {
            (*a.cast::<ScriptArray>()).eql(&*b.cast::<ScriptArray>())
        } else if core::ptr::eq(context, &SET) {
            (*a.cast::<ScriptSet>()).eql(&*b.cast::<ScriptSet>())
        } else if core::ptr::eq(context, &MAP) {
            (*a.cast::<ScriptMap>()).eql(&*b.cast::<ScriptMap>())
        } else if core::ptr::eq(context, &OPTION) {
            (*a.cast::<ScriptOption>()).eql(&*b.cast::<ScriptOption>())
        } else if core::ptr::eq(context, &ERROR) {
            (*a.cast::<ScriptError>()).eql(&*b.cast::<ScriptError>())
        } else if core::ptr::eq(context, &RESULT) {
            (*a.cast::<ScriptResult>()).eql(&*b.cast::<ScriptResult>())
        } else if core::ptr::eq(context, &UNIQUE) {
            (*a.cast::<Unique>()).same_cell(&*b.cast::<Unique>())
        } else if core::ptr::eq(context, &SHARED) {
            (*a.cast::<Shared>()).same_cell(&*b.cast::<Shared>())
        } else if core::ptr::eq(context, &WEAK) {
            (*a.cast::<Weak>()).same_cell(&*b.cast::<Weak>())
        } else if core::ptr::eq(context, &FUNCTION) {
            (*a.cast::<Function>()) == (*b.cast::<Function>())
        } else if core::ptr::eq(context, &CONST_REF) || core::ptr::eq(context, &MUT_REF) {
            (*a.cast::<ScriptRef>()).eql(&*b.cast::<ScriptRef>())
        } else {
            let eql_fn = context
                .eql_fn
                .unwrap_or_else(|| panic!("type {} has no equality", context.name()));
            let mut result = false;
            let mut reported: *const TypeContext = core::ptr::null();
            let mut args = CallArgs::new(&eql_fn);
            args.push(ScriptRef::new(a.cast_mut(), context), &CONST_REF);
            args.push(ScriptRef::new(b.cast_mut(), context), &CONST_REF);
            args.call(Return::from_raw(
                (&mut result as *mut bool).cast(),
                &mut reported,
            ))
            .expect("equality can never fail");
            result
        }
    }
}

/// Hash the value at `value`, composed with the process seed.
///
/// # Safety
///
/// `value` must point at a live value of `context`'s type.
pub unsafe fn fast_hash(value: *const u8, context: &TypeContext) -> u64 {
    unsafe {
        if core::ptr::eq(context, &BOOL) {
            hash::hash_word((*value.cast::<bool>()) as u64)
        } else if core::ptr::eq(context, &INT) {
            hash::hash_word((*value.cast::<i64>()) as u64)
        } else if core::ptr::eq(context, &FLOAT) {
            // Floats hash through their integer cast.
            hash::hash_word((*value.cast::<f64>()) as i64 as u64)
        } else if core::ptr::eq(context, &CHAR) {
            hash::hash_word((*value.cast::<u32>()) as u64)
        } else if core::ptr::eq(context, &STRING) {
            (*value.cast::<ScriptString>()).hash()
        } else if core::ptr::eq(context, &ARRAY) {
            (*value.cast::<ScriptArray>()).hash()
        } else if core::ptr::eq(context, &SET) {
            (*value.cast::<ScriptSet>()).hash()
        } else if core::ptr::eq(context, &MAP) {
            (*value.cast::<ScriptMap>()).hash()
        } else if core::ptr::eq(context, &OPTION) {
            (*value.cast::<ScriptOption>()).hash()
        } else if core::ptr::eq(context, &ERROR) {
            (*value.cast::<ScriptError>()).hash()
        } else if core::ptr::eq(context, &RESULT) {
            (*value.cast::<ScriptResult>()).hash()
        } else if core::ptr::eq(context, &UNIQUE) {
            (*value.cast::<Unique>()).hash()
        } else if core::ptr::eq(context, &SHARED) {
            (*value.cast::<Shared>()).hash()
        } else if core::ptr::eq(context, &WEAK) {
            (*value.cast::<Weak>()).hash()
        } else if core::ptr::eq(context, &FUNCTION) {
            (*value.cast::<Function>()).hash()
        } else if core::ptr::eq(context, &CONST_REF) || core::ptr::eq(context, &MUT_REF) {
            (*value.cast::<ScriptRef>()).hash()
        } else {
            let hash_fn = context
                .hash_fn
                .unwrap_or_else(|| panic!("type {} has no hash", context.name()));
            let mut result = 0u64;
            let mut reported: *const TypeContext = core::ptr::null();
            let mut args = CallArgs::new(&hash_fn);
            args.push(ScriptRef::new(value.cast_mut(), context), &CONST_REF);
            args.call(Return::from_raw(
                (&mut result as *mut u64).cast(),
                &mut reported,
            ))
            .expect("hashing can never fail");
            result
        }
    }
}

fn is_builtin_scalar(context: &TypeContext) -> bool {
    core::ptr::eq(context, &BOOL)
        || core::ptr::eq(context, &INT)
        || core::ptr::eq(context, &FLOAT)
        || core::ptr::eq(context, &CHAR)
        || core::ptr::eq(context, &FUNCTION)
        || core::ptr::eq(context, &CONST_REF)
        || core::ptr::eq(context, &MUT_REF)
}

// Native-ABI adapters backing the built-in contexts' callable handles.
// Direct dispatch never reaches these (the fast paths above pointer-match
// first); they exist so a built-in's operations are ordinary callables,
// invokable through the same `Call` machinery as any user function.

fn builtin_deinit(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    unsafe { fast_deinit(reference.ptr(), reference.pointee()) };
    0
}

fn builtin_clone(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let pointee = reference.pointee();
    handler.set_return_with(pointee, |out| unsafe {
        fast_clone(out, reference.ptr(), pointee);
    });
    0
}

fn builtin_eql(handler: &mut Handler) -> i32 {
    let (a, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let (b, _) = unsafe { handler.take_arg_value::<ScriptRef>(1) };
    let equal = unsafe { fast_eql(a.ptr(), b.ptr(), a.pointee()) };
    handler.set_return(equal, &BOOL);
    0
}

fn builtin_hash(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let hashed = unsafe { fast_hash(reference.ptr(), reference.pointee()) } as i64;
    handler.set_return(hashed, &INT);
    0
}

// Memberwise adapters for struct types built with
// [`TypeContext::new_struct`].

fn struct_deinit(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    for member in &reference.pointee().members {
        unsafe {
            fast_deinit(reference.ptr().add(member.offset), member.context());
        }
    }
    0
}

fn struct_clone(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let pointee = reference.pointee();
    handler.set_return_with(pointee, |out| unsafe {
        // Bitwise image first, then deep-clone each member over its copy.
        core::ptr::copy_nonoverlapping(reference.ptr().cast_const(), out, pointee.size);
        for member in &pointee.members {
            fast_clone(
                out.add(member.offset),
                reference.ptr().add(member.offset),
                member.context(),
            );
        }
    });
    0
}

fn struct_eql(handler: &mut Handler) -> i32 {
    let (a, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let (b, _) = unsafe { handler.take_arg_value::<ScriptRef>(1) };
    let pointee = a.pointee();
    let equal = pointee.members.iter().all(|member| unsafe {
        fast_eql(
            a.ptr().add(member.offset),
            b.ptr().add(member.offset),
            member.context(),
        )
    });
    handler.set_return(equal, &BOOL);
    0
}

fn struct_hash(handler: &mut Handler) -> i32 {
    let (reference, _) = unsafe { handler.take_arg_value::<ScriptRef>(0) };
    let pointee = reference.pointee();
    let mut h = hash::seed();
    for member in &pointee.members {
        h = hash::combine(h, unsafe {
            fast_hash(reference.ptr().add(member.offset), member.context())
        });
    }
    handler.set_return(h as i64, &INT);
    0
}
