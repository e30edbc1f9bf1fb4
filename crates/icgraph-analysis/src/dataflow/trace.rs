//! Backward def-use tracing of function-pointer values.
//!
//! A function pointer is *traceable* when every definition that can reach
//! it is visible: function constants, no-op casts, phi/select joins,
//! private slots (a stack slot or global that is only ever loaded from and
//! stored to), direct-call return values, and parameters whose incoming
//! functions are known. Anything else makes the trace unresolved.

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use icgraph_core::{Constant, ConstExpr, FunctionId, Opcode, Program, ValueId, ValueKind};

use super::ArgumentFlow;
use crate::{FuncSet, GlobalContext};

/// Origins of a traced function pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    /// Functions the value may hold.
    pub functions: FuncSet,
    /// Stores and calls the value was traced through.
    pub sites: IndexSet<ValueId>,
}

impl Trace {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Stores into `slot` if it is private: every user is a load from it or a
/// store into it (never of it).
pub fn private_slot_stores(program: &Program, slot: ValueId) -> Option<Vec<ValueId>> {
    let is_slot = match &program.value(slot).kind {
        ValueKind::Global(_) => true,
        ValueKind::Instruction(inst) => matches!(inst.opcode, Opcode::Alloca { .. }),
        _ => false,
    };
    if !is_slot {
        return None;
    }

    let mut stores = Vec::new();
    for &user in program.users(slot) {
        match program.opcode(user)? {
            Opcode::Load { .. } => {}
            Opcode::Store { value, ptr } if *ptr == slot && *value != slot => stores.push(user),
            _ => return None,
        }
    }
    Some(stores)
}

/// Return values of a defined function.
fn returned_values(program: &Program, function: FunctionId) -> impl Iterator<Item = ValueId> + '_ {
    program
        .function(function)
        .instructions()
        .filter_map(move |inst| match program.opcode(inst) {
            Some(Opcode::Return { value: Some(v) }) => Some(*v),
            _ => None,
        })
}

/// Traces `value` back to the functions it may hold.
///
/// Returns `None` if some definition cannot be seen. An empty trace means
/// every path ends in null or undef.
pub fn trace_function_pointer(
    program: &Program,
    ctx: &GlobalContext,
    flow: &ArgumentFlow,
    value: ValueId,
) -> Option<Trace> {
    let mut trace = Trace::default();
    let mut work = vec![value];
    let mut visited = FxHashSet::default();
    let mut visited_funcs = FxHashSet::default();

    while let Some(v) = work.pop() {
        if !visited.insert(v) {
            continue;
        }
        match &program.value(v).kind {
            ValueKind::Function(f) => {
                if !program.function(*f).is_intrinsic() {
                    trace.functions.insert(ctx.resolve_declaration(program, *f));
                }
            }
            ValueKind::Constant(Constant::Null | Constant::Undef) => {}
            ValueKind::Constant(Constant::Expr(ConstExpr::Cast { op, operand }))
                if op.is_pointer_noop() =>
            {
                work.push(*operand);
            }
            ValueKind::Argument { function, index } => {
                let known = flow.known(*function, *index as usize)?;
                trace.functions.extend(known.iter().copied());
            }
            ValueKind::Instruction(inst) => match &inst.opcode {
                Opcode::Cast { op, operand } if op.is_pointer_noop() => work.push(*operand),
                Opcode::Phi { incoming } => work.extend(incoming.iter().copied()),
                Opcode::Select {
                    if_true, if_false, ..
                } => work.extend([*if_true, *if_false]),
                Opcode::Load { ptr } => {
                    let slot = program.strip_pointer_casts(*ptr);
                    for store in private_slot_stores(program, slot)? {
                        let stored = program.instruction(store).and_then(|i| i.as_store());
                        if let Some((stored, _)) = stored {
                            trace.sites.insert(store);
                            work.push(stored);
                        }
                    }
                    let init = program
                        .value(slot)
                        .as_global()
                        .and_then(|g| program.global(g).initializer);
                    if let Some(init) = init {
                        work.push(init);
                    }
                }
                Opcode::Call(call) => {
                    let callee = program.base_function(call.callee)?;
                    let callee = ctx.resolve_declaration(program, callee);
                    if program.function(callee).is_declaration() {
                        return None;
                    }
                    trace.sites.insert(v);
                    if visited_funcs.insert(callee) {
                        work.extend(returned_values(program, callee));
                    }
                }
                _ => return None,
            },
            _ => return None,
        }
    }
    Some(trace)
}
