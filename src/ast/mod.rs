//! Abstract syntax tree types for UL4.
//!
//! The AST has two layers:
//!
//! - **Statement layer** ([`template`]): [`Node`]s for literal text and
//!   tags, grouped into [`Block`]s. A [`Template`] is the root block.
//! - **Expression layer** ([`expr`]): code inside tags, evaluated to
//!   [`Value`]s.
//!
//! Both layers are plain data: they are built once by the compiler, never
//! mutated afterwards, and can be shared across threads and renders.

pub mod color;
mod display;
pub mod expr;
pub mod location;
pub mod template;
pub mod value;

// Convenience re-exports
pub use color::Color;
pub use expr::*;
pub use location::{Location, Span, Spanned, TagKind};
pub use template::*;
pub use value::{Closure, MonthDelta, Undefined, Value, ValueKind, Vars};
