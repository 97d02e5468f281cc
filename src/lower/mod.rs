//! Lowering checked template trees into ordered target-language
//! statement sequences.

mod buffer;
mod generator;

pub use buffer::InstructionBuffer;
pub use generator::Generator;

use crate::context::CompileContext;
use crate::error::ReparseAborted;
use crate::module::{ModuleId, ModuleRegistry};

/// The lowered output of one module: ordered matcher-construction
/// statements, initializers before first use.
#[derive(Debug)]
pub struct GeneratedUnit {
    pub module: String,
    statements: Vec<String>,
}

impl GeneratedUnit {
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.statements.join("\n")
    }
}

/// Lower every non-parameterized template definition of a module, in
/// declaration order. Definitions already lowered at this version (for
/// example because an earlier definition referenced them) are skipped by
/// the version gate.
pub fn lower_module(
    registry: &ModuleRegistry,
    module: ModuleId,
    ctx: &mut CompileContext<'_>,
) -> Result<GeneratedUnit, ReparseAborted> {
    let generator = Generator::new(registry, module);
    let mut buf = InstructionBuffer::new();
    for def_id in registry.def_ids(module) {
        generator.ensure_definition_lowered(ctx, &mut buf, def_id)?;
    }
    Ok(GeneratedUnit {
        module: registry.module(module).name.clone(),
        statements: buf.into_statements(),
    })
}
