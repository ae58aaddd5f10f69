use super::{ConstExpr, Initializer, MAX_VALUE_ID, Module, Operand, Symbol};
use cloakref_utils::errors::IrError;
use std::collections::HashSet;

impl Module {
    /// Checks structural well-formedness: symbol references resolve, every used value is
    /// defined exactly once in its function, branch targets exist and every block ends in a
    /// terminator.
    pub fn validate(&self) -> Result<(), IrError> {
        for global in &self.globals {
            if let Some(Initializer::Array(elems)) = &global.init {
                for elem in elems {
                    if let ConstExpr::SymbolAddr { symbol, .. } = elem {
                        self.check_symbol(*symbol)?;
                    }
                }
            }
        }

        for func in &self.functions {
            if func.next_value > MAX_VALUE_ID {
                return Err(IrError::ValueSpaceExhausted(func.name.clone()));
            }
            let mut defined: HashSet<u32> = func.params().map(|v| v.0).collect();
            for inst in func.instructions() {
                if let Some(result) = inst.result {
                    if !defined.insert(result.0) {
                        return Err(IrError::RedefinedValue {
                            function: func.name.clone(),
                            value: result.0,
                        });
                    }
                }
            }

            for block in &func.blocks {
                match block.insts.last() {
                    Some(last) if last.is_terminator() => {}
                    _ => {
                        return Err(IrError::MissingTerminator {
                            function: func.name.clone(),
                            block: block.label.clone(),
                        });
                    }
                }
                for inst in &block.insts {
                    for op in inst.operands() {
                        match op {
                            Operand::Value(v) if !defined.contains(&v.0) => {
                                return Err(IrError::UndefinedValue {
                                    function: func.name.clone(),
                                    value: v.0,
                                });
                            }
                            Operand::Symbol(symbol) => self.check_symbol(*symbol)?,
                            _ => {}
                        }
                    }
                    for target in inst.successors() {
                        if target.0 >= func.blocks.len() {
                            return Err(IrError::UnknownBlock {
                                function: func.name.clone(),
                                block: target.0,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_symbol(&self, symbol: Symbol) -> Result<(), IrError> {
        match symbol {
            Symbol::Global(id) if id.0 >= self.globals.len() => Err(IrError::UnknownGlobal(id.0)),
            Symbol::Func(id) if id.0 >= self.functions.len() => {
                Err(IrError::UnknownFunction(id.0))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{Function, InstBuilder, Linkage, Module, Signature, Type, ValueId};
    use cloakref_utils::errors::IrError;

    #[test]
    fn rejects_block_without_terminator() {
        let mut module = Module::new("m");
        module.add_function(Function::definition(
            "f",
            Signature::default(),
            Linkage::External,
        ));
        assert!(matches!(
            module.validate(),
            Err(IrError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn rejects_use_of_undefined_value() {
        let mut module = Module::new("m");
        let mut func = Function::definition("f", Signature::default(), Linkage::External);
        let (insts, next) = func.split_block_mut(crate::ir::BlockId(0));
        let mut b = InstBuilder::new(next);
        b.ret(Some(ValueId(9).into()));
        insts.extend(b.finish());
        module.add_function(func);
        assert!(matches!(
            module.validate(),
            Err(IrError::UndefinedValue { value: 9, .. })
        ));
    }

    #[test]
    fn accepts_declarations() {
        let mut module = Module::new("m");
        module.add_function(Function::declaration(
            "ext",
            Signature::new(vec![Type::I64], None),
        ));
        assert!(module.validate().is_ok());
    }
}
