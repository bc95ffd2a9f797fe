use crate::{ExecutionResult, PrimitiveContext, offset_value};

/// Primitive: `( displacement delegate -- alien )`
pub fn displaced_alien(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let delegate = ctx.state.pop()?;
    let displacement = ctx.state.pop()?;
    let displacement = offset_value(&ctx.vm.heap, displacement)?;
    let alien = ctx.vm.heap.derive(delegate, displacement, ctx.state)?;
    ctx.state.push(alien)
}

/// Primitive: `( alien -- n )`
/// Byte arrays are refused on purpose, their address moves with every collection.
pub fn alien_address(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let alien = ctx.state.peek()?;
    let address = ctx.vm.heap.resolve_pinned(alien)? as usize;
    let boxed = ctx.vm.heap.box_integer(address as i128, ctx.state);
    ctx.state.replace(boxed)
}
