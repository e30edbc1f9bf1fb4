//! Whole-program container and queries.

use crate::{
    BlockId, CallData, CastOp, ConstExpr, Constant, Function, FunctionId, GepIndex,
    GlobalId, GlobalVariable, Instruction, ModuleId, Opcode, SourceLoc, TypeId, TypeTable,
    Value, ValueId, ValueKind,
};

/// A translation unit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Module {
    pub id: ModuleId,
    /// Display name, usually the source or bitcode path.
    pub name: String,
    pub functions: Vec<FunctionId>,
    pub globals: Vec<GlobalId>,
    /// Named struct types defined by this module.
    pub struct_types: Vec<TypeId>,
}

/// A call instruction viewed as a call site.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    /// The call instruction.
    pub id: ValueId,
    /// Function containing the call.
    pub caller: FunctionId,
    data: &'a CallData,
    loc: Option<&'a SourceLoc>,
}

impl<'a> CallSite<'a> {
    pub fn callee(&self) -> ValueId {
        self.data.callee
    }

    pub fn args(&self) -> &'a [ValueId] {
        &self.data.args
    }

    pub fn arg(&self, index: usize) -> Option<ValueId> {
        self.data.args.get(index).copied()
    }

    /// Declared function type.
    pub fn fn_ty(&self) -> TypeId {
        self.data.fn_ty
    }

    pub fn has_sret(&self) -> bool {
        self.data.sret
    }

    pub fn loc(&self) -> Option<&'a SourceLoc> {
        self.loc
    }
}

/// A `getelementptr`, either instruction or constant expression.
#[derive(Debug, Clone, Copy)]
pub struct GepView<'a> {
    pub source_ty: TypeId,
    pub base: ValueId,
    pub indices: &'a [GepIndex],
}

/// A set of modules sharing one type table and one value arena.
///
/// Values, functions and globals of every module live in program-wide
/// arenas, so ids are unique across modules. The use index is derived
/// data and is rebuilt by [`Program::rebuild_uses`].
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    pub(crate) types: TypeTable,
    pub(crate) values: Vec<Value>,
    pub(crate) functions: Vec<Function>,
    pub(crate) globals: Vec<GlobalVariable>,
    pub(crate) modules: Vec<Module>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub(crate) users: Vec<Vec<ValueId>>,
}

impl Program {
    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    /// Returns a value. Ids handed out by the builder, or accepted by
    /// [`Program::validate`], are always valid.
    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.index()]
    }

    pub fn try_value(&self, id: ValueId) -> Option<&Value> {
        self.values.get(id.index())
    }

    /// Type of a value.
    pub fn ty(&self, id: ValueId) -> TypeId {
        self.value(id).ty
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &Function)> {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// First function with the given name.
    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.index()]
    }

    pub fn globals(&self) -> impl Iterator<Item = (GlobalId, &GlobalVariable)> {
        self.globals
            .iter()
            .enumerate()
            .map(|(i, g)| (GlobalId(i as u32), g))
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals().find(|(_, g)| g.name == name).map(|(id, _)| id)
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    /// Modules in load order.
    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// Values that use `id` as an operand, in creation order.
    ///
    /// A global variable counts as a user of its initializer.
    pub fn users(&self, id: ValueId) -> &[ValueId] {
        self.users.get(id.index()).map_or(&[], Vec::as_slice)
    }

    pub fn instruction(&self, id: ValueId) -> Option<&Instruction> {
        self.try_value(id)?.as_instruction()
    }

    pub fn opcode(&self, id: ValueId) -> Option<&Opcode> {
        self.instruction(id).map(|inst| &inst.opcode)
    }

    /// Views a call instruction as a call site.
    pub fn call_site(&self, id: ValueId) -> Option<CallSite<'_>> {
        let inst = self.instruction(id)?;
        let data = inst.as_call()?;
        Some(CallSite {
            id,
            caller: inst.function,
            data,
            loc: inst.loc.as_ref(),
        })
    }

    /// Call instructions of a function in program order.
    pub fn call_sites(&self, function: FunctionId) -> impl Iterator<Item = CallSite<'_>> + '_ {
        self.function(function)
            .instructions()
            .filter_map(move |inst| self.call_site(inst))
    }

    /// Cast operation and operand of a cast instruction or cast constant.
    pub fn as_cast(&self, id: ValueId) -> Option<(CastOp, ValueId)> {
        match &self.try_value(id)?.kind {
            ValueKind::Instruction(Instruction {
                opcode: Opcode::Cast { op, operand },
                ..
            })
            | ValueKind::Constant(Constant::Expr(ConstExpr::Cast { op, operand })) => {
                Some((*op, *operand))
            }
            _ => None,
        }
    }

    /// Pointer operand of a GEP instruction or GEP constant.
    pub fn as_gep(&self, id: ValueId) -> Option<GepView<'_>> {
        match &self.try_value(id)?.kind {
            ValueKind::Instruction(Instruction {
                opcode:
                    Opcode::GetElementPtr {
                        source_ty,
                        base,
                        indices,
                    },
                ..
            })
            | ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr {
                source_ty,
                base,
                indices,
            })) => Some(GepView {
                source_ty: *source_ty,
                base: *base,
                indices,
            }),
            _ => None,
        }
    }

    /// Strips bitcasts and address-space casts.
    pub fn strip_pointer_casts(&self, mut id: ValueId) -> ValueId {
        let mut steps = 0;
        while let Some((op, operand)) = self.as_cast(id) {
            if !op.is_pointer_noop() || steps > self.values.len() {
                break;
            }
            id = operand;
            steps += 1;
        }
        id
    }

    /// Function behind a value after stripping pointer casts.
    pub fn base_function(&self, id: ValueId) -> Option<FunctionId> {
        let stripped = self.strip_pointer_casts(id);
        self.value(stripped).as_function()
    }

    /// Function containing an instruction or argument.
    pub fn function_of(&self, id: ValueId) -> Option<FunctionId> {
        match &self.try_value(id)?.kind {
            ValueKind::Instruction(inst) => Some(inst.function),
            ValueKind::Argument { function, .. } => Some(*function),
            _ => None,
        }
    }

    /// Instruction following `id` in its block.
    pub fn next_instruction(&self, id: ValueId) -> Option<ValueId> {
        let inst = self.instruction(id)?;
        let function = self.function(inst.function);
        function
            .blocks
            .get(inst.block.index())
            .and_then(|bb| bb.next_after(id))
    }

    /// Block containing an instruction.
    pub fn block_of(&self, id: ValueId) -> Option<BlockId> {
        self.instruction(id).map(|inst| inst.block)
    }

    /// Human-readable name of a value for diagnostics.
    pub fn value_label(&self, id: ValueId) -> String {
        let value = self.value(id);
        match &value.kind {
            ValueKind::Function(f) => format!("@{}", self.function(*f).name),
            ValueKind::Global(g) => format!("@{}", self.global(*g).name),
            _ => match &value.name {
                Some(name) => format!("%{name}"),
                None => id.to_string(),
            },
        }
    }

    /// Recomputes the use index and the address-taken flags.
    pub fn rebuild_uses(&mut self) {
        let mut users: Vec<Vec<ValueId>> = vec![Vec::new(); self.values.len()];
        for (i, value) in self.values.iter().enumerate() {
            let user = ValueId(i as u32);
            for operand in value.operands() {
                if let Some(list) = users.get_mut(operand.index()) {
                    if list.last() != Some(&user) {
                        list.push(user);
                    }
                }
            }
        }
        for global in &self.globals {
            if let Some(init) = global.initializer {
                if let Some(list) = users.get_mut(init.index()) {
                    list.push(global.value);
                }
            }
        }
        self.users = users;

        let taken: Vec<bool> = self
            .functions
            .iter()
            .map(|f| {
                self.users(f.value).iter().any(|&user| {
                    match self.instruction(user).and_then(Instruction::as_call) {
                        Some(call) => call.callee != f.value || call.args.contains(&f.value),
                        None => true,
                    }
                })
            })
            .collect();
        for (f, taken) in self.functions.iter_mut().zip(taken) {
            f.address_taken = taken;
        }
    }

    /// Decodes a program from JSON, rejects dangling or mismatched ids
    /// and rebuilds derived indexes.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let mut program: Program = serde_json::from_str(json)?;
        program.validate()?;
        program.types.reindex();
        program.rebuild_uses();
        Ok(program)
    }

    /// Encodes the program as JSON.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
