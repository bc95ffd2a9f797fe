use crate::{ACCESSOR_PRIMITIVES, ExecutionResult, ExecutionState, VM};

mod alien;
mod dll;

#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimitiveMessageIndex(usize);

pub type PrimitiveFunction = fn(&mut PrimitiveContext) -> ExecutionResult;

// inputs are checked against the stack depth before the primitive runs
// e.g. `dlsym` => `name library dlsym` has inputs: 2
#[derive(Debug, Copy, Clone)]
pub struct PrimitiveMessage<'a> {
    pub name: &'a str,
    pub inputs: usize,
    pub outputs: usize,
    pub ptr: PrimitiveFunction,
}

impl<'a> PrimitiveMessage<'a> {
    pub const fn new(
        name: &'a str,
        inputs: usize,
        outputs: usize,
        ptr: PrimitiveFunction,
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
            ptr,
        }
    }
}

pub struct PrimitiveContext<'ex> {
    pub vm: &'ex mut VM,
    pub state: &'ex mut ExecutionState,
}

impl<'ex> PrimitiveContext<'ex> {
    pub fn new(vm: &'ex mut VM, state: &'ex mut ExecutionState) -> Self {
        Self { vm, state }
    }
}

pub const PRIMITIVES: &[PrimitiveMessage] = &[
    PrimitiveMessage::new("<displaced-alien>", 2, 1, alien::displaced_alien),
    PrimitiveMessage::new("alien-address", 1, 1, alien::alien_address),
    PrimitiveMessage::new("dlopen", 1, 1, dll::dlopen),
    PrimitiveMessage::new("dlsym", 2, 1, dll::dlsym),
    PrimitiveMessage::new("dlsym-raw", 2, 1, dll::dlsym_raw),
    PrimitiveMessage::new("dlclose", 1, 0, dll::dlclose),
    PrimitiveMessage::new("dll-valid?", 1, 1, dll::dll_validp),
];

fn all_primitives() -> impl Iterator<Item = &'static PrimitiveMessage<'static>> {
    PRIMITIVES.iter().chain(ACCESSOR_PRIMITIVES)
}

pub fn primitive_index(name: &str) -> Option<PrimitiveMessageIndex> {
    all_primitives()
        .position(|primitive| primitive.name == name)
        .map(PrimitiveMessageIndex)
}

pub fn get_primitive(id: PrimitiveMessageIndex) -> Option<PrimitiveMessage<'static>> {
    all_primitives().nth(id.0).copied()
}

pub fn primitive_names() -> impl Iterator<Item = &'static str> {
    all_primitives().map(|primitive| primitive.name)
}
