//! Incremental construction of a [`Program`].
//!
//! Front ends (and tests) build programs through [`ProgramBuilder`] and
//! [`FunctionBuilder`]. Result types of loads, GEPs and calls are derived
//! from operand types, so ill-typed requests are reported as errors rather
//! than producing an inconsistent program.

use crate::{
    BasicBlock, BlockId, CallData, CastOp, ConstExpr, Constant, Error, Function, FunctionId,
    GepIndex, GlobalId, GlobalVariable, Instruction, Linkage, Module, ModuleId, Opcode,
    Program, Result, SourceLoc, TypeId, TypeTable, Value, ValueId, ValueKind,
};

/// Builds a [`Program`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    program: Program,
}

impl ProgramBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutable access to the shared type table.
    pub fn types(&mut self) -> &mut TypeTable {
        &mut self.program.types
    }

    /// Read access to the program built so far.
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Appends a module.
    pub fn add_module(&mut self, name: impl Into<String>) -> ModuleId {
        let id = ModuleId(self.program.modules.len() as u32);
        self.program.modules.push(Module {
            id,
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            struct_types: Vec::new(),
        });
        id
    }

    /// Declares a named struct owned by `module` and sets its body.
    pub fn add_struct(
        &mut self,
        module: ModuleId,
        name: &str,
        fields: Vec<TypeId>,
    ) -> Result<TypeId> {
        let id = self.program.types.struct_type(name, fields)?;
        let structs = &mut self.program.modules[module.index()].struct_types;
        if !structs.contains(&id) {
            structs.push(id);
        }
        Ok(id)
    }

    fn push_value(&mut self, ty: TypeId, kind: ValueKind) -> ValueId {
        let id = ValueId(self.program.values.len() as u32);
        self.program.values.push(Value::new(ty, kind));
        id
    }

    /// Declares a function without a body.
    pub fn declare_function(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        fn_ty: TypeId,
    ) -> Result<FunctionId> {
        let name = name.into();
        let params = match self.program.types.function_parts(fn_ty) {
            Some((_, params, _)) => params.to_vec(),
            None => return Err(Error::NotAFunctionType(self.program.types.display(fn_ty))),
        };

        let id = FunctionId(self.program.functions.len() as u32);
        let ptr_ty = self.program.types.ptr(fn_ty);
        let value = self.push_value(ptr_ty, ValueKind::Function(id));
        let params = params
            .into_iter()
            .enumerate()
            .map(|(index, ty)| {
                self.push_value(
                    ty,
                    ValueKind::Argument {
                        function: id,
                        index: index as u32,
                    },
                )
            })
            .collect();

        self.program.functions.push(Function {
            name,
            ty: fn_ty,
            module,
            linkage: Linkage::External,
            params,
            blocks: Vec::new(),
            value,
            address_taken: false,
        });
        self.program.modules[module.index()].functions.push(id);
        Ok(id)
    }

    /// Declares a function and opens its entry block.
    pub fn define_function(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        fn_ty: TypeId,
    ) -> Result<FunctionId> {
        let id = self.declare_function(module, name, fn_ty)?;
        self.program.functions[id.index()]
            .blocks
            .push(BasicBlock::new(BlockId::ENTRY));
        Ok(id)
    }

    pub fn set_linkage(&mut self, function: FunctionId, linkage: Linkage) {
        self.program.functions[function.index()].linkage = linkage;
    }

    /// Address of a function as a value.
    pub fn function_value(&self, function: FunctionId) -> ValueId {
        self.program.functions[function.index()].value
    }

    /// Formal parameter `index` of a function.
    pub fn param(&self, function: FunctionId, index: usize) -> Result<ValueId> {
        let f = &self.program.functions[function.index()];
        f.params.get(index).copied().ok_or_else(|| Error::NoSuchParam {
            function: f.name.clone(),
            index,
        })
    }

    /// Adds a global variable holding a `value_type` object.
    pub fn add_global(
        &mut self,
        module: ModuleId,
        name: impl Into<String>,
        value_type: TypeId,
        initializer: Option<ValueId>,
    ) -> GlobalId {
        let id = GlobalId(self.program.globals.len() as u32);
        let ptr_ty = self.program.types.ptr(value_type);
        let value = self.push_value(ptr_ty, ValueKind::Global(id));
        self.program.globals.push(GlobalVariable {
            name: name.into(),
            module,
            value_type,
            value,
            initializer,
            linkage: Linkage::External,
            is_constant: false,
        });
        self.program.modules[module.index()].globals.push(id);
        id
    }

    /// Sets the initializer after creation, for self-referencing globals.
    pub fn set_initializer(&mut self, global: GlobalId, initializer: ValueId) {
        self.program.globals[global.index()].initializer = Some(initializer);
    }

    pub fn set_global_linkage(&mut self, global: GlobalId, linkage: Linkage) {
        self.program.globals[global.index()].linkage = linkage;
    }

    /// Address of a global as a value.
    pub fn global_value(&self, global: GlobalId) -> ValueId {
        self.program.globals[global.index()].value
    }

    /// Names a value.
    pub fn set_name(&mut self, value: ValueId, name: impl Into<String>) {
        self.program.values[value.index()].name = Some(name.into());
    }

    pub fn const_null(&mut self, ty: TypeId) -> ValueId {
        self.push_value(ty, ValueKind::Constant(Constant::Null))
    }

    pub fn const_undef(&mut self, ty: TypeId) -> ValueId {
        self.push_value(ty, ValueKind::Constant(Constant::Undef))
    }

    pub fn const_int(&mut self, ty: TypeId, value: i64) -> ValueId {
        self.push_value(ty, ValueKind::Constant(Constant::Int(value)))
    }

    /// Struct, array or vector constant.
    pub fn const_aggregate(&mut self, ty: TypeId, elements: Vec<ValueId>) -> ValueId {
        self.push_value(ty, ValueKind::Constant(Constant::Aggregate(elements)))
    }

    /// Constant cast expression.
    pub fn const_cast(&mut self, op: CastOp, operand: ValueId, to: TypeId) -> ValueId {
        self.push_value(
            to,
            ValueKind::Constant(Constant::Expr(ConstExpr::Cast { op, operand })),
        )
    }

    /// Constant GEP expression with constant indices.
    pub fn const_gep(&mut self, base: ValueId, indices: &[i64]) -> Result<ValueId> {
        let indices: Vec<GepIndex> = indices.iter().map(|&i| GepIndex::Const(i)).collect();
        let (source_ty, result_ty) = self.gep_types(base, &indices)?;
        Ok(self.push_value(
            result_ty,
            ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr {
                source_ty,
                base,
                indices,
            })),
        ))
    }

    fn pointee_of(&self, value: ValueId) -> Result<TypeId> {
        let ty = self.program.values[value.index()].ty;
        self.program
            .types
            .pointee(ty)
            .ok_or_else(|| Error::NotAPointer {
                value,
                ty: self.program.types.display(ty),
            })
    }

    /// Source element type and result type of a GEP.
    fn gep_types(&mut self, base: ValueId, indices: &[GepIndex]) -> Result<(TypeId, TypeId)> {
        let source_ty = self.pointee_of(base)?;
        let mut current = source_ty;
        for index in indices.iter().skip(1) {
            let idx = index.as_const();
            current = self
                .program
                .types
                .element_type(current, idx)
                .ok_or_else(|| Error::BadIndex {
                    index: idx,
                    ty: self.program.types.display(current),
                })?;
        }
        let result_ty = self.program.types.ptr(current);
        Ok((source_ty, result_ty))
    }

    /// Opens a builder positioned at the end of the function's entry block.
    pub fn body(&mut self, function: FunctionId) -> FunctionBuilder<'_> {
        let f = &mut self.program.functions[function.index()];
        if f.blocks.is_empty() {
            f.blocks.push(BasicBlock::new(BlockId::ENTRY));
        }
        FunctionBuilder {
            builder: self,
            function,
            block: BlockId::ENTRY,
            loc: None,
        }
    }

    /// Finishes the program and computes its use index.
    pub fn build(mut self) -> Program {
        self.program.rebuild_uses();
        self.program
    }
}

/// Appends instructions to one function.
#[derive(Debug)]
pub struct FunctionBuilder<'a> {
    builder: &'a mut ProgramBuilder,
    function: FunctionId,
    block: BlockId,
    loc: Option<SourceLoc>,
}

impl FunctionBuilder<'_> {
    /// The program builder, for creating constants mid-body.
    pub fn program(&mut self) -> &mut ProgramBuilder {
        self.builder
    }

    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn param(&self, index: usize) -> Result<ValueId> {
        self.builder.param(self.function, index)
    }

    /// Appends a new block and positions the builder in it.
    pub fn new_block(&mut self) -> BlockId {
        let f = &mut self.builder.program.functions[self.function.index()];
        let id = BlockId(f.blocks.len() as u32);
        f.blocks.push(BasicBlock::new(id));
        self.block = id;
        id
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.block = block;
    }

    /// Debug location for subsequent instructions.
    pub fn at(&mut self, file: &str, line: u32, col: u32) -> &mut Self {
        self.loc = Some(SourceLoc::new(file, line, col));
        self
    }

    fn push(&mut self, ty: TypeId, opcode: Opcode) -> ValueId {
        let inst = Instruction {
            function: self.function,
            block: self.block,
            opcode,
            loc: self.loc.clone(),
        };
        let id = self.builder.push_value(ty, ValueKind::Instruction(inst));
        self.builder.program.functions[self.function.index()].blocks[self.block.index()]
            .instructions
            .push(id);
        id
    }

    /// Stack slot; the result is a pointer to `ty`.
    pub fn alloca(&mut self, ty: TypeId) -> ValueId {
        let ptr = self.builder.types().ptr(ty);
        self.push(ptr, Opcode::Alloca { allocated: ty })
    }

    pub fn load(&mut self, ptr: ValueId) -> Result<ValueId> {
        let ty = self.builder.pointee_of(ptr)?;
        Ok(self.push(ty, Opcode::Load { ptr }))
    }

    /// Load with a result name, e.g. `vtable`.
    pub fn load_named(&mut self, ptr: ValueId, name: &str) -> Result<ValueId> {
        let id = self.load(ptr)?;
        self.builder.set_name(id, name);
        Ok(id)
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        let void = self.builder.types().void();
        self.push(void, Opcode::Store { value, ptr })
    }

    pub fn gep(&mut self, base: ValueId, indices: &[GepIndex]) -> Result<ValueId> {
        let (source_ty, result_ty) = self.builder.gep_types(base, indices)?;
        Ok(self.push(
            result_ty,
            Opcode::GetElementPtr {
                source_ty,
                base,
                indices: indices.to_vec(),
            },
        ))
    }

    /// Address of field `index` of the struct `base` points to.
    pub fn field(&mut self, base: ValueId, index: u32) -> Result<ValueId> {
        self.gep(base, &[GepIndex::Const(0), GepIndex::Const(i64::from(index))])
    }

    pub fn cast(&mut self, op: CastOp, operand: ValueId, to: TypeId) -> ValueId {
        self.push(to, Opcode::Cast { op, operand })
    }

    pub fn bitcast(&mut self, operand: ValueId, to: TypeId) -> ValueId {
        self.cast(CastOp::BitCast, operand, to)
    }

    pub fn phi(&mut self, ty: TypeId, incoming: Vec<ValueId>) -> ValueId {
        self.push(ty, Opcode::Phi { incoming })
    }

    pub fn select(&mut self, condition: ValueId, if_true: ValueId, if_false: ValueId) -> ValueId {
        let ty = self.builder.program.values[if_true.index()].ty;
        self.push(
            ty,
            Opcode::Select {
                condition,
                if_true,
                if_false,
            },
        )
    }

    pub fn unary(&mut self, operand: ValueId) -> ValueId {
        let ty = self.builder.program.values[operand.index()].ty;
        self.push(ty, Opcode::Unary { operand })
    }

    pub fn binary(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.builder.program.values[lhs.index()].ty;
        self.push(ty, Opcode::Binary { lhs, rhs })
    }

    /// Calls `callee`, which must have function-pointer type.
    pub fn call(&mut self, callee: ValueId, args: &[ValueId]) -> Result<ValueId> {
        self.emit_call(callee, args, false)
    }

    /// Call whose first argument is a struct-return slot.
    pub fn call_sret(&mut self, callee: ValueId, args: &[ValueId]) -> Result<ValueId> {
        self.emit_call(callee, args, true)
    }

    fn emit_call(&mut self, callee: ValueId, args: &[ValueId], sret: bool) -> Result<ValueId> {
        let callee_ty = self.builder.program.values[callee.index()].ty;
        let types = &self.builder.program.types;
        let fn_ty = types
            .function_pointee(callee_ty)
            .ok_or_else(|| Error::NotCallable {
                value: callee,
                ty: types.display(callee_ty),
            })?;
        let ret = types
            .function_parts(fn_ty)
            .map(|(ret, _, _)| ret)
            .ok_or(Error::InvalidType(fn_ty))?;
        Ok(self.push(
            ret,
            Opcode::Call(CallData {
                callee,
                args: args.to_vec(),
                fn_ty,
                sret,
            }),
        ))
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        let void = self.builder.types().void();
        self.push(void, Opcode::Return { value })
    }

    pub fn br(&mut self, condition: Option<ValueId>, targets: Vec<BlockId>) -> ValueId {
        let void = self.builder.types().void();
        self.push(void, Opcode::Branch { condition, targets })
    }

    pub fn unreachable(&mut self) -> ValueId {
        let void = self.builder.types().void();
        self.push(void, Opcode::Unreachable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_callback_program() -> Result<(Program, FunctionId, FunctionId)> {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("cb.c");
        let i32 = b.types().i32();
        let fn_ty = b.types().function(i32, vec![i32], false);
        let fn_ptr = b.types().ptr(fn_ty);
        let s = b.add_struct(m, "struct.S", vec![fn_ptr])?;

        let h = b.define_function(m, "h", fn_ty)?;
        {
            let mut fb = b.body(h);
            let x = fb.param(0)?;
            fb.ret(Some(x));
        }

        let main_ty = b.types().function(i32, vec![], false);
        let main = b.define_function(m, "main", main_ty)?;
        let h_val = b.function_value(h);
        let one = b.const_int(i32, 1);
        {
            let mut fb = b.body(main);
            let slot = fb.alloca(s);
            let cb = fb.field(slot, 0)?;
            fb.store(h_val, cb);
            let fp = fb.load(cb)?;
            fb.at("cb.c", 10, 3);
            let r = fb.call(fp, &[one])?;
            fb.ret(Some(r));
        }
        Ok((b.build(), h, main))
    }

    #[test]
    fn test_result_types_follow_operands() {
        let (program, _, main) = make_callback_program().unwrap();
        let insts: Vec<_> = program.function(main).instructions().collect();
        let types = program.types();

        let gep = insts[1];
        let load = insts[3];
        assert_eq!(types.display(program.ty(gep)), "i32 (i32)**");
        assert_eq!(types.display(program.ty(load)), "i32 (i32)*");

        let call = program.call_site(insts[4]).unwrap();
        assert_eq!(call.callee(), load);
        assert_eq!(call.loc().unwrap().to_string(), "cb.c:10:3");
        assert_eq!(types.display(call.fn_ty()), "i32 (i32)");
    }

    #[test]
    fn test_uses_and_address_taken() {
        let (program, h, main) = make_callback_program().unwrap();
        assert!(program.function(h).address_taken);
        assert!(!program.function(main).address_taken);

        let h_val = program.function(h).value;
        let users = program.users(h_val);
        assert_eq!(users.len(), 1);
        assert!(program.instruction(users[0]).unwrap().as_store().is_some());
    }

    #[test]
    fn test_direct_call_does_not_take_address() {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("d.c");
        let void = b.types().void();
        let fn_ty = b.types().function(void, vec![], false);
        let callee = b.define_function(m, "callee", fn_ty).unwrap();
        let caller = b.define_function(m, "caller", fn_ty).unwrap();
        let callee_val = b.function_value(callee);
        b.body(caller).call(callee_val, &[]).unwrap();
        let program = b.build();

        assert!(!program.function(callee).address_taken);
        assert_eq!(program.base_function(callee_val), Some(callee));
    }

    #[test]
    fn test_load_through_non_pointer_fails() {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("e.c");
        let i32 = b.types().i32();
        let fn_ty = b.types().function(i32, vec![i32], false);
        let f = b.define_function(m, "f", fn_ty).unwrap();
        let mut fb = b.body(f);
        let x = fb.param(0).unwrap();
        assert!(matches!(fb.load(x), Err(Error::NotAPointer { .. })));
        assert!(matches!(fb.call(x, &[]), Err(Error::NotCallable { .. })));
    }

    #[test]
    fn test_const_gep_into_global() {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("g.c");
        let i8p = b.types().void_ptr();
        let arr = b.types().array(i8p, 3);
        let vt = b.types().anon_struct(vec![arr]);
        let g = b.add_global(m, "_ZTV4Base", vt, None);
        let gv = b.global_value(g);
        let gep = b.const_gep(gv, &[0, 0, 2]).unwrap();
        let program = b.build();
        assert_eq!(program.types().display(program.ty(gep)), "i8**");
        assert_eq!(program.as_gep(gep).unwrap().base, gv);
    }

    #[test]
    fn test_strip_pointer_casts() {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("s.c");
        let void = b.types().void();
        let fn_ty = b.types().function(void, vec![], false);
        let f = b.define_function(m, "f", fn_ty).unwrap();
        let i8p = b.types().void_ptr();
        let fv = b.function_value(f);
        let c1 = b.const_cast(CastOp::BitCast, fv, i8p);
        let i64 = b.types().i64();
        let c2 = b.const_cast(CastOp::PtrToInt, c1, i64);
        let program = b.build();

        assert_eq!(program.strip_pointer_casts(c1), fv);
        assert_eq!(program.strip_pointer_casts(c2), c2);
        assert_eq!(program.base_function(c1), Some(f));
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_json_roundtrip_rebuilds_uses() {
        let (program, h, _) = make_callback_program().unwrap();
        let json = program.to_json().unwrap();
        let decoded = Program::from_json(&json).unwrap();
        assert_eq!(decoded.function_count(), program.function_count());
        assert_eq!(
            decoded.users(decoded.function(h).value),
            program.users(program.function(h).value)
        );
        assert!(decoded.types().lookup_struct("struct.S").is_some());
    }
}
