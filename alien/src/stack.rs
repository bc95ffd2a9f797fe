use crate::{RootProvider, RuntimeError, Value, Visitor};

#[derive(Debug, Clone)]
pub struct ExecutionState {
    stack: Vec<Value>,
    limit: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionStateInfo {
    pub stack_size: usize,
}

impl Default for ExecutionStateInfo {
    fn default() -> Self {
        Self { stack_size: 128 }
    }
}

impl ExecutionState {
    #[must_use]
    pub fn new(info: &ExecutionStateInfo) -> Self {
        Self {
            stack: Vec::with_capacity(info.stack_size),
            limit: info.stack_size,
        }
    }

    /// Returns the active portion of the stack, top last
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Returns the current stack depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Pushes a value onto the stack
    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.limit {
            return Err(RuntimeError::StackOverflow { limit: self.limit });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops a value from the stack
    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow {
            needed: 1,
            depth: 0,
        })
    }

    /// Top of the stack without removing it
    pub fn peek(&self) -> Result<Value, RuntimeError> {
        self.stack.last().copied().ok_or(RuntimeError::StackUnderflow {
            needed: 1,
            depth: 0,
        })
    }

    /// Overwrites the top of the stack
    pub fn replace(&mut self, value: Value) -> Result<(), RuntimeError> {
        let top = self.stack.last_mut().ok_or(RuntimeError::StackUnderflow {
            needed: 1,
            depth: 0,
        })?;
        *top = value;
        Ok(())
    }

    /// Gets the nth value from the top of the stack (0-indexed)
    #[must_use]
    pub fn stack_get_nth(&self, n: usize) -> Option<Value> {
        let idx = self.stack.len().checked_sub(n + 1)?;
        self.stack.get(idx).copied()
    }

    /// Fails unless at least `n` values are on the stack
    pub fn require(&self, n: usize) -> Result<(), RuntimeError> {
        if self.stack.len() < n {
            return Err(RuntimeError::StackUnderflow {
                needed: n,
                depth: self.stack.len(),
            });
        }
        Ok(())
    }
}

impl RootProvider for ExecutionState {
    fn visit_roots(&mut self, visitor: &mut dyn Visitor) {
        self.stack.iter().for_each(|&value| visitor.visit(value));
    }
}
