use std::sync::Arc;

use log::trace;

use crate::{
    DynamicLoader, ExecutionState, Instruction, PrimitiveContext, RuntimeError, VM, VMCreateInfo,
    Value, get_primitive, primitive_index,
};

pub type ExecutionResult = Result<(), RuntimeError>;

#[derive(Debug)]
pub struct Interpreter {
    pub vm: VM,
    pub state: ExecutionState,
}

impl Interpreter {
    pub fn new(info: VMCreateInfo, loader: Arc<dyn DynamicLoader>) -> Self {
        Self {
            vm: VM::new(info.heap, loader),
            state: ExecutionState::new(&info.stack),
        }
    }

    pub fn execute(&mut self, instruction: &Instruction) -> ExecutionResult {
        trace!("execute {instruction:?}");
        match instruction {
            Instruction::PushFixnum { value } => {
                let value = self.vm.heap.box_integer(*value as i128, &mut self.state);
                self.state.push(value)
            }
            Instruction::PushFloat { value } => {
                let value = self.vm.heap.box_float(*value, &mut self.state);
                self.state.push(value)
            }
            Instruction::PushBytes { value } => {
                let value = self.vm.heap.allocate_bytearray(value, &mut self.state);
                self.state.push(value)
            }
            Instruction::PushBool { value } => self.state.push((*value).into()),
            Instruction::SendPrimitive { id } => {
                let primitive = get_primitive(*id).ok_or_else(|| RuntimeError::UnknownPrimitive {
                    name: format!("{id:?}"),
                })?;
                self.state.require(primitive.inputs)?;
                let mut ctx = PrimitiveContext::new(&mut self.vm, &mut self.state);
                (primitive.ptr)(&mut ctx)
            }
            Instruction::Drop => self.state.pop().map(|_| ()),
        }
    }

    /// Runs until the first failing instruction.
    pub fn run(&mut self, instructions: &[Instruction]) -> ExecutionResult {
        instructions
            .iter()
            .try_for_each(|instruction| self.execute(instruction))
    }

    /// Invokes a primitive by its name
    pub fn call_primitive(&mut self, name: &str) -> ExecutionResult {
        let id = primitive_index(name).ok_or_else(|| RuntimeError::UnknownPrimitive {
            name: name.to_string(),
        })?;
        self.execute(&Instruction::SendPrimitive { id })
    }

    pub fn push(&mut self, value: Value) -> ExecutionResult {
        self.state.push(value)
    }

    pub fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.state.pop()
    }
}
