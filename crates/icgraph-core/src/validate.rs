//! Structural checks on a decoded [`Program`].
//!
//! The builder only hands out ids it has allocated, so programs built in
//! memory are well formed. A program read from JSON may refer to ids that
//! do not exist, or pair records that disagree with each other. Query
//! methods index arenas directly and would panic on those.

use crate::{
    BasicBlock, BlockId, ConstExpr, Constant, Error, Function, FunctionId, GlobalId, Instruction,
    ModuleId, Opcode, Program, Result, Type, TypeId, ValueId, ValueKind,
};

impl Program {
    /// Checks that every id the program stores points into its arenas, and
    /// that functions, globals, arguments and instructions agree with the
    /// values that represent them.
    pub fn validate(&self) -> Result<()> {
        let check = Checker { program: self };
        check.types()?;
        for (i, module) in self.modules.iter().enumerate() {
            if module.id.index() != i {
                return Err(Error::InvalidModule(module.id));
            }
            for &f in &module.functions {
                check.function_id(f)?;
            }
            for &g in &module.globals {
                check.global_id(g)?;
            }
            for &ty in &module.struct_types {
                check.type_id(ty)?;
            }
        }
        for (id, function) in self.functions() {
            check.function(id, function)?;
        }
        for (id, global) in self.globals() {
            check.module_id(global.module)?;
            check.type_id(global.value_type)?;
            check.value_id(global.value)?;
            if self.values[global.value.index()].as_global() != Some(id) {
                return Err(Error::Inconsistent {
                    value: global.value,
                    expected: "address of its global",
                });
            }
            if let Some(init) = global.initializer {
                check.value_id(init)?;
            }
        }
        for i in 0..self.values.len() {
            check.value(ValueId(i as u32))?;
        }
        Ok(())
    }
}

struct Checker<'a> {
    program: &'a Program,
}

impl Checker<'_> {
    fn type_id(&self, id: TypeId) -> Result<()> {
        match self.program.types.try_get(id) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidType(id)),
        }
    }

    fn value_id(&self, id: ValueId) -> Result<()> {
        match self.program.try_value(id) {
            Some(_) => Ok(()),
            None => Err(Error::InvalidValue(id)),
        }
    }

    fn function_id(&self, id: FunctionId) -> Result<()> {
        if id.index() < self.program.functions.len() {
            Ok(())
        } else {
            Err(Error::InvalidFunction(id))
        }
    }

    fn global_id(&self, id: GlobalId) -> Result<()> {
        if id.index() < self.program.globals.len() {
            Ok(())
        } else {
            Err(Error::InvalidGlobal(id))
        }
    }

    fn module_id(&self, id: ModuleId) -> Result<()> {
        if id.index() < self.program.modules.len() {
            Ok(())
        } else {
            Err(Error::InvalidModule(id))
        }
    }

    /// Only named structs may refer forward, so printing and hashing a
    /// type always terminates.
    fn types(&self) -> Result<()> {
        for (id, ty) in self.program.types.iter() {
            let children: &[TypeId] = match ty {
                Type::Pointer { pointee } => std::slice::from_ref(pointee),
                Type::Array { element, .. } | Type::Vector { element, .. } => {
                    std::slice::from_ref(element)
                }
                Type::Function { ret, params, .. } => {
                    self.type_id(*ret)?;
                    if *ret >= id {
                        return Err(Error::ForwardTypeRef(id));
                    }
                    params
                }
                Type::Struct { fields, .. } => fields,
                Type::Void | Type::Integer { .. } | Type::Float { .. } | Type::Label => &[],
            };
            let named = matches!(ty, Type::Struct { name: Some(_), .. });
            for &child in children {
                self.type_id(child)?;
                if !named && child >= id {
                    return Err(Error::ForwardTypeRef(id));
                }
            }
        }
        Ok(())
    }

    fn function(&self, id: FunctionId, function: &Function) -> Result<()> {
        self.type_id(function.ty)?;
        self.module_id(function.module)?;
        self.value_id(function.value)?;
        if self.program.values[function.value.index()].as_function() != Some(id) {
            return Err(Error::Inconsistent {
                value: function.value,
                expected: "address of its function",
            });
        }
        for (index, &param) in function.params.iter().enumerate() {
            self.value_id(param)?;
            let matches = matches!(
                self.program.values[param.index()].kind,
                ValueKind::Argument { function: f, index: i } if f == id && i as usize == index
            );
            if !matches {
                return Err(Error::Inconsistent {
                    value: param,
                    expected: "argument at its parameter position",
                });
            }
        }
        for (position, block) in function.blocks.iter().enumerate() {
            self.block(id, position, block)?;
        }
        Ok(())
    }

    fn block(&self, function: FunctionId, position: usize, block: &BasicBlock) -> Result<()> {
        if block.id.index() != position {
            return Err(Error::InvalidBlock {
                function,
                block: block.id,
            });
        }
        for &inst in &block.instructions {
            self.value_id(inst)?;
            let placed = self
                .program
                .instruction(inst)
                .is_some_and(|i| i.function == function && i.block == block.id);
            if !placed {
                return Err(Error::Inconsistent {
                    value: inst,
                    expected: "instruction of the block listing it",
                });
            }
        }
        Ok(())
    }

    fn value(&self, id: ValueId) -> Result<()> {
        let value = &self.program.values[id.index()];
        self.type_id(value.ty)?;
        match &value.kind {
            ValueKind::Argument { function, .. } => self.function_id(*function)?,
            ValueKind::Function(f) => self.function_id(*f)?,
            ValueKind::Global(g) => self.global_id(*g)?,
            ValueKind::Constant(Constant::Expr(ConstExpr::GetElementPtr { source_ty, .. })) => {
                self.type_id(*source_ty)?
            }
            ValueKind::Constant(_) => {}
            ValueKind::Instruction(inst) => self.instruction(inst)?,
        }
        let constant = matches!(value.kind, ValueKind::Constant(_));
        for operand in value.operands() {
            self.value_id(operand)?;
            if constant && operand >= id {
                return Err(Error::Inconsistent {
                    value: id,
                    expected: "constant built from earlier values",
                });
            }
        }
        Ok(())
    }

    fn instruction(&self, inst: &Instruction) -> Result<()> {
        self.function_id(inst.function)?;
        let blocks = &self.program.functions[inst.function.index()].blocks;
        let in_range = |block: BlockId| {
            if block.index() < blocks.len() {
                Ok(())
            } else {
                Err(Error::InvalidBlock {
                    function: inst.function,
                    block,
                })
            }
        };
        in_range(inst.block)?;
        match &inst.opcode {
            Opcode::Alloca { allocated } => self.type_id(*allocated)?,
            Opcode::GetElementPtr { source_ty, .. } => self.type_id(*source_ty)?,
            Opcode::Call(call) => self.type_id(call.fn_ty)?,
            Opcode::Branch { targets, .. } => {
                for &target in targets {
                    in_range(target)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CastOp, ProgramBuilder, Value};

    fn program_with_branch() -> Program {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("v.c");
        let i32 = b.types().i32();
        let i32_ptr = b.types().ptr(i32);
        let fn_ty = b.types().function(i32, vec![i32_ptr], false);
        let f = b.define_function(m, "f", fn_ty).unwrap();
        let zero = b.const_int(i32, 0);
        b.add_global(m, "counter", i32, Some(zero));
        let mut fb = b.body(f);
        let p = fb.param(0).unwrap();
        let exit = fb.new_block();
        fb.switch_to(BlockId::ENTRY);
        fb.br(None, vec![exit]);
        fb.switch_to(exit);
        let x = fb.load(p).unwrap();
        fb.ret(Some(x));
        b.build()
    }

    #[test]
    fn test_built_program_is_valid() {
        assert!(program_with_branch().validate().is_ok());
    }

    #[test]
    fn test_dangling_operand() {
        let mut program = program_with_branch();
        let load = program.functions[0]
            .instructions()
            .find(|&i| program.instruction(i).and_then(Instruction::as_load).is_some())
            .unwrap();
        if let ValueKind::Instruction(inst) = &mut program.values[load.index()].kind {
            inst.opcode = Opcode::Load { ptr: ValueId(99) };
        }
        assert!(matches!(program.validate(), Err(Error::InvalidValue(ValueId(99)))));
    }

    #[test]
    fn test_branch_to_missing_block() {
        let mut program = program_with_branch();
        let entry = program.functions[0].blocks[0].instructions[0];
        if let ValueKind::Instruction(inst) = &mut program.values[entry.index()].kind {
            inst.opcode = Opcode::Branch {
                condition: None,
                targets: vec![BlockId(7)],
            };
        }
        assert!(matches!(
            program.validate(),
            Err(Error::InvalidBlock { block: BlockId(7), .. })
        ));
    }

    #[test]
    fn test_function_value_must_point_back() {
        let mut program = program_with_branch();
        let param = program.functions[0].params[0];
        program.functions[0].value = param;
        assert!(matches!(program.validate(), Err(Error::Inconsistent { .. })));
    }

    #[test]
    fn test_dangling_type_inside_type() {
        let mut program = program_with_branch();
        let bad = program.types.ptr(TypeId(500));
        program.functions[0].ty = bad;
        assert!(matches!(program.validate(), Err(Error::InvalidType(TypeId(500)))));
    }

    #[test]
    fn test_global_initializer_out_of_range() {
        let mut program = program_with_branch();
        program.globals[0].initializer = Some(ValueId(1_000));
        assert!(matches!(program.validate(), Err(Error::InvalidValue(ValueId(1_000)))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_from_json_rejects_tampered_operand() {
        let program = program_with_branch();
        let f = &program.functions[0];
        let ptr = f.params[0];
        let json = program.to_json().unwrap();
        let original = format!("{{\"Load\":{{\"ptr\":{}}}}}", ptr.0);
        assert!(json.contains(&original));

        let tampered = json.replace(&original, "{\"Load\":{\"ptr\":99}}");
        let err = Program::from_json(&tampered).unwrap_err();
        assert!(matches!(err, Error::InvalidValue(ValueId(99))));
        assert_eq!(err.to_string(), "invalid value id: %v99");

        assert!(Program::from_json(&json).is_ok());
    }

    #[test]
    fn test_self_referencing_pointer() {
        let mut program = program_with_branch();
        let next = TypeId(program.types.len() as u32);
        let looped = program.types.intern(Type::Pointer { pointee: next });
        assert_eq!(looped, next);
        assert!(matches!(program.validate(), Err(Error::ForwardTypeRef(id)) if id == next));
    }

    #[test]
    fn test_named_struct_may_refer_forward() {
        let mut b = ProgramBuilder::new();
        let m = b.add_module("list.c");
        let node = b.types().named_struct("struct.node");
        let node_ptr = b.types().ptr(node);
        b.types().set_struct_body(node, vec![node_ptr]).unwrap();
        b.add_struct(m, "struct.node", vec![node_ptr]).unwrap();
        assert!(b.build().validate().is_ok());
    }

    #[test]
    fn test_constant_cycle() {
        let mut program = program_with_branch();
        let id = ValueId(program.values.len() as u32);
        let i32_ptr = program.values[program.functions[0].params[0].index()].ty;
        program.values.push(Value::new(
            i32_ptr,
            ValueKind::Constant(Constant::Expr(ConstExpr::Cast {
                op: CastOp::BitCast,
                operand: id,
            })),
        ));
        assert!(matches!(
            program.validate(),
            Err(Error::Inconsistent { value, .. }) if value == id
        ));
    }
}
