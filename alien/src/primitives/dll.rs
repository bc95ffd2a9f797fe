use crate::{ExecutionResult, PrimitiveContext, SymbolLookup};

/// Primitive: `( path -- dll )`
pub fn dlopen(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let path = ctx.state.pop()?;
    let library = ctx.vm.open_library(path, ctx.state)?;
    ctx.state.push(library)
}

// the name stays on the stack while resolving and its slot receives the result
fn lookup(ctx: &mut PrimitiveContext, lookup: SymbolLookup) -> ExecutionResult {
    let library = ctx.state.pop()?;
    let name = ctx.state.peek()?;
    let symbol = ctx.vm.resolve_symbol(library, name, lookup, ctx.state)?;
    ctx.state.replace(symbol)
}

/// Primitive: `( name dll/f -- alien/f )`
pub fn dlsym(ctx: &mut PrimitiveContext) -> ExecutionResult {
    lookup(ctx, SymbolLookup::Plain)
}

/// Primitive: `( name dll/f -- alien/f )`
pub fn dlsym_raw(ctx: &mut PrimitiveContext) -> ExecutionResult {
    lookup(ctx, SymbolLookup::Raw)
}

/// Primitive: `( dll -- )`
pub fn dlclose(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let library = ctx.state.pop()?;
    ctx.vm.close_library(library)
}

/// Primitive: `( dll/f -- ? )`
pub fn dll_validp(ctx: &mut PrimitiveContext) -> ExecutionResult {
    let library = ctx.state.peek()?;
    let valid = ctx.vm.is_library_valid(library)?;
    ctx.state.replace(valid.into())
}
