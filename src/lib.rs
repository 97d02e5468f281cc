#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![deny(clippy::perf, clippy::suspicious)]

//! Core library of the TTCN-3 template sub-language compiler: template
//! tree representation, structural checking, reference resolution, and
//! lowering into target-language matcher-construction statements.

pub mod check;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod lower;
pub mod module;
pub mod syntax;
pub mod template;
pub mod types;

pub use check::{CheckArgs, TemplateChecker, check_definition, check_module};
pub use context::{CompileContext, TempAllocator, Version};
pub use error::{Error, ReparseAborted, Result};
pub use lower::{GeneratedUnit, Generator, InstructionBuffer, lower_module};
