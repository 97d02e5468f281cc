//! The ordered statement buffer lowering emits into.

/// Ordered target-language statements for one compilation unit. The
/// low-level text backend consumes these in order; this core only
/// guarantees statement granularity and ordering.
#[derive(Debug, Default)]
pub struct InstructionBuffer {
    stmts: Vec<String>,
}

impl InstructionBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, stmt: impl Into<String>) {
        self.stmts.push(stmt.into());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stmts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.stmts
    }

    #[must_use]
    pub fn into_statements(self) -> Vec<String> {
        self.stmts
    }

    #[must_use]
    pub fn render(&self) -> String {
        self.stmts.join("\n")
    }
}
