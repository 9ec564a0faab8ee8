//! Built-in value representations.
//!
//! Every value here is `#[repr(C)]`, fits a whole number of 8-byte stack
//! slots, and is moved by plain byte copy. None of them implement `Drop`:
//! ownership is tracked by the per-slot type context, and destruction
//! happens explicitly through [`crate::context::fast_deinit`] when a frame
//! unwinds or a `Deinit` instruction runs. Holding one of these outside the
//! interpreter stack means taking over that responsibility.

pub mod array;
pub mod cells;
pub mod error;
pub mod map;
pub mod option;
pub mod reference;
pub mod set;
pub mod string;

pub use array::ScriptArray;
pub use cells::{Shared, Unique, Weak};
pub use error::{ScriptError, ScriptResult};
pub use map::ScriptMap;
pub use option::ScriptOption;
pub use reference::ScriptRef;
pub use set::ScriptSet;
pub use string::ScriptString;
