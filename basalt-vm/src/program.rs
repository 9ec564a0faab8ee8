//! Programs: the owner of compiled functions, type contexts, registries,
//! and the host hook surface.

mod arena;
mod registry;

use core::ptr::NonNull;
use std::sync::Mutex;

use crate::context::TypeContext;
use crate::error::{RuntimeError, RuntimeErrorKind};
use crate::function::{Function, FunctionRecord};

pub(crate) use arena::Arena;
use registry::Registry;

/// Host callbacks a program reports through.
///
/// The program serializes calls behind a mutex, so implementations may be
/// plain mutable state; they must still be `Send` because script threads
/// share one program.
pub trait HostHooks: Send {
    /// A runtime error was raised. Fired at the error's origin, before it
    /// propagates to the calling host.
    fn runtime_error(&mut self, kind: RuntimeErrorKind, message: &str);

    /// Script or runtime output.
    fn print(&mut self, message: &str);
}

/// Default hooks: report through `tracing`.
#[derive(Debug, Default)]
pub struct TracingHooks;

impl HostHooks for TracingHooks {
    fn runtime_error(&mut self, kind: RuntimeErrorKind, message: &str) {
        tracing::error!(?kind, message, "script runtime error");
    }

    fn print(&mut self, message: &str) {
        tracing::info!(message, "script output");
    }
}

/// Address-stable interior of a [`Program`].
pub(crate) struct ProgramInner {
    arena: Arena,
    hooks: Mutex<Box<dyn HostHooks>>,
    functions: Registry<FunctionRecord>,
    types: Registry<TypeContext>,
}

impl ProgramInner {
    /// Report a runtime error to the host hooks.
    pub(crate) fn report_runtime_error(&self, error: &RuntimeError) {
        let mut hooks = self.hooks.lock().unwrap();
        hooks.runtime_error(error.kind, &error.message);
    }

    /// Forward output to the host hooks.
    pub(crate) fn print(&self, message: &str) {
        let mut hooks = self.hooks.lock().unwrap();
        hooks.print(message);
    }

    pub(crate) fn find_function_record(&self, fq_name: &str) -> Option<&FunctionRecord> {
        self.functions
            .find(fq_name)
            .map(|ptr| unsafe { &*ptr.as_ptr() })
    }
}

impl core::fmt::Debug for ProgramInner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgramInner")
            .field("functions", &self.functions)
            .field("types", &self.types)
            .finish_non_exhaustive()
    }
}

/// A compiled program: an arena of function records and type contexts plus
/// the registries that name them.
///
/// Compilation (inserts) happens behind `&mut`; afterwards the program is
/// read-only and may be shared across threads executing it concurrently.
#[derive(Debug)]
pub struct Program {
    inner: Box<ProgramInner>,
}

impl Program {
    /// A program reporting through [`TracingHooks`].
    pub fn new() -> Self {
        Self::with_hooks(Box::new(TracingHooks))
    }

    /// A program reporting through the given hooks.
    pub fn with_hooks(hooks: Box<dyn HostHooks>) -> Self {
        Self {
            inner: Box::new(ProgramInner {
                arena: Arena::new(),
                hooks: Mutex::new(hooks),
                functions: Registry::new(),
                types: Registry::new(),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &ProgramInner {
        &self.inner
    }

    pub(crate) fn inner_ptr(&self) -> *const ProgramInner {
        &*self.inner
    }

    /// Register a type context under a fully-qualified name. Types must be
    /// registered before any function that references them. Panics on a
    /// duplicate name.
    pub fn insert_type(&mut self, fq_name: &str, context: TypeContext) -> &TypeContext {
        let inner = &mut *self.inner;
        let stored = inner.arena.alloc(context);
        inner.types.insert(&inner.arena, fq_name, NonNull::from(stored));
        stored
    }

    /// Look a type up by fully-qualified name.
    pub fn find_type(&self, fq_name: &str) -> Option<&TypeContext> {
        self.inner
            .types
            .find(fq_name)
            .map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Park a built record in the arena and register it. Called by
    /// [`crate::function::FunctionBuilder::build`]. Panics on a duplicate
    /// name.
    pub(crate) fn register_function(&mut self, record: FunctionRecord) -> &FunctionRecord {
        let inner = &mut *self.inner;
        let stored = inner.arena.alloc(record);
        inner
            .functions
            .insert(&inner.arena, stored.fq_name(), NonNull::from(stored));
        stored
    }

    /// Look a function up by fully-qualified name, as a callable value.
    pub fn find_function(&self, fq_name: &str) -> Option<Function> {
        self.inner
            .find_function_record(fq_name)
            .map(|record| Function::Script(record))
    }

    /// Number of registered functions.
    pub fn function_count(&self) -> usize {
        self.inner.functions.len()
    }

    /// Number of registered types.
    pub fn type_count(&self) -> usize {
        self.inner.types.len()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        // Tearing a program down while another thread is inside its hooks
        // is a host bug, not a recoverable state.
        if self.inner.hooks.try_lock().is_err() {
            panic!("program torn down while in use");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_type_after_insert_returns_same_pointer() {
        let mut program = Program::new();
        let inserted = program.insert_type(
            "demo::Pair",
            TypeContext::new_struct(16, "Pair", Vec::new()),
        ) as *const TypeContext;
        let found = program.find_type("demo::Pair").unwrap() as *const TypeContext;
        assert_eq!(inserted, found);
        assert!(program.find_type("demo::Missing").is_none());
        assert_eq!(program.type_count(), 1);
    }

    #[test]
    fn hooks_receive_runtime_errors() {
        use std::sync::{Arc, Mutex};

        #[derive(Default)]
        struct Capture(Arc<Mutex<Vec<(RuntimeErrorKind, String)>>>);
        impl HostHooks for Capture {
            fn runtime_error(&mut self, kind: RuntimeErrorKind, message: &str) {
                self.0.lock().unwrap().push((kind, message.to_owned()));
            }
            fn print(&mut self, _message: &str) {}
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let program = Program::with_hooks(Box::new(Capture(Arc::clone(&seen))));
        program.inner().report_runtime_error(&RuntimeError::new(
            RuntimeErrorKind::DivideByZero,
            "4 / 0",
        ));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, RuntimeErrorKind::DivideByZero);
        assert_eq!(seen[0].1, "4 / 0");
    }

}
