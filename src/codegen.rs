use std::collections::HashMap;

use crate::ast::{Expr, Function, Item, Prototype};
use crate::ir::{ArithOp, FuncId, Program, ValueId};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable referenced: {0}")]
    UnknownVariable(String),
    #[error("invalid binary operator '{0}'")]
    UnknownOperator(char),
    #[error("unknown function referenced: {0}")]
    UnknownFunction(String),
    #[error("invalid number of args in call to {0}: expected {1}, found {2}")]
    InvalidCall(String, usize, usize),
    #[error("conflicting declaration of {0}: declared with {1} params, redeclared with {2}")]
    ConflictingDeclaration(String, usize, usize),
    #[error("function {0} is already defined")]
    Redefinition(String),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
}

/// Lowers one top-level unit at a time into the program container. The
/// symbol table holds the current function's parameters only and is fully
/// replaced per function.
#[derive(Debug)]
pub struct Codegen {
    pub program: Program,
    named_values: HashMap<String, ValueId>,
}

impl Codegen {
    pub fn new() -> Self {
        Codegen {
            program: Program::new(),
            named_values: HashMap::new(),
        }
    }

    pub fn codegen(&mut self, item: &Item) -> Result<FuncId, CodegenError> {
        match item {
            Item::Extern(proto) => self.compile_proto(proto),
            Item::Function(function) => self.compile_fn(function),
        }
    }

    fn codegen_expr(&mut self, expr: &Expr) -> Result<ValueId, CodegenError> {
        match expr {
            Expr::Number(value) => Ok(self.program.emit_const(*value)),
            Expr::Variable(name) => self
                .named_values
                .get(name)
                .copied()
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone())),
            Expr::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                match op {
                    '+' => Ok(self.program.emit_arith(ArithOp::Add, lhs, rhs)),
                    '-' => Ok(self.program.emit_arith(ArithOp::Sub, lhs, rhs)),
                    '*' => Ok(self.program.emit_arith(ArithOp::Mul, lhs, rhs)),
                    '<' => {
                        // the comparison result is boolean, which is not an
                        // expression value; widen it back to the numeric type
                        let cmp = self.program.emit_cmp_lt(lhs, rhs);
                        Ok(self.program.emit_bool_to_num(cmp))
                    }
                    _ => Err(CodegenError::UnknownOperator(*op)),
                }
            }
            Expr::Call(callee, args) => {
                let func = self
                    .program
                    .get(callee)
                    .ok_or_else(|| CodegenError::UnknownFunction(callee.clone()))?;

                let arity = self.program.arity(func);
                if arity != args.len() {
                    return Err(CodegenError::InvalidCall(callee.clone(), arity, args.len()));
                }

                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.codegen_expr(arg)?);
                }

                Ok(self.program.emit_call(func, values))
            }
        }
    }

    /// Resolve a prototype against the program, reusing an earlier
    /// declaration of the same name. Redeclaring with a different arity is
    /// an error, never silently accepted.
    fn compile_proto(&mut self, proto: &Prototype) -> Result<FuncId, CodegenError> {
        if let Some(id) = self.program.get(&proto.name) {
            let declared = self.program.arity(id);
            if declared != proto.params.len() {
                return Err(CodegenError::ConflictingDeclaration(
                    proto.name.clone(),
                    declared,
                    proto.params.len(),
                ));
            }
            return Ok(id);
        }

        Ok(self.program.declare(&proto.name, &proto.params))
    }

    fn compile_fn(&mut self, function: &Function) -> Result<FuncId, CodegenError> {
        let proto = &function.prototype;
        let id = self.compile_proto(proto)?;
        if self.program.is_defined(id) {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        self.program.begin_function(id);

        // fresh symbol table per function; nothing leaks across units
        self.named_values.clear();
        for (index, param) in proto.params.iter().enumerate() {
            let value = self.program.param_value(id, index);
            self.named_values.insert(param.clone(), value);
        }

        let ret = match self.codegen_expr(&function.body) {
            Ok(ret) => ret,
            Err(err) => {
                // roll the partial function back out of the program
                self.program.erase(id);
                return Err(err);
            }
        };
        self.program.emit_ret(ret);

        if self.program.verify(id) {
            Ok(id)
        } else {
            let name = self.program.name(id).to_string();
            self.program.erase(id);
            Err(CodegenError::InvalidFunction(name))
        }
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Codegen::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Token;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn parse_items(input: &str) -> Vec<Item> {
        let mut parser = Parser::from_source(input);
        let mut items = Vec::new();
        loop {
            match parser.current() {
                Token::Eof => return items,
                Token::Op(';') => parser.skip(),
                Token::Def => items.push(Item::Function(parser.parse_definition().unwrap())),
                Token::Extern => items.push(Item::Extern(parser.parse_extern().unwrap())),
                _ => items.push(Item::Function(parser.parse_toplevel().unwrap())),
            }
        }
    }

    fn lower_all(input: &str) -> Result<Codegen, CodegenError> {
        let mut codegen = Codegen::new();
        for item in parse_items(input) {
            codegen.codegen(&item)?;
        }
        Ok(codegen)
    }

    #[test]
    fn extern_then_definition_using_it() {
        let codegen = lower_all("extern sin(x); def f(x) sin(x) * x;").unwrap();
        let dump = codegen.program.to_string();
        assert!(dump.contains("extern sin(x)"));
        assert!(dump.contains("def f(x)"));
        assert!(dump.contains("call sin"));
    }

    #[test]
    fn call_arity_is_enforced() {
        assert_eq!(
            lower_all("extern foo(a b); foo(1);").unwrap_err(),
            CodegenError::InvalidCall("foo".to_string(), 2, 1)
        );
        assert!(lower_all("extern foo(a b); foo(1, 2);").is_ok());
    }

    #[test]
    fn forward_declaration_is_reused_not_duplicated() {
        let mut codegen = Codegen::new();
        let items = parse_items("extern foo(a); def foo(a) a + 1;");
        let declared = codegen.codegen(&items[0]).unwrap();
        let defined = codegen.codegen(&items[1]).unwrap();

        assert_eq!(declared, defined);
        let dump = codegen.program.to_string();
        assert_eq!(dump.matches("foo(a)").count(), 1);
        assert!(dump.starts_with("def foo(a) {"));
    }

    #[test]
    fn unresolved_variable_rolls_the_function_back() {
        let mut codegen = Codegen::new();
        let items = parse_items("def f() x;");
        assert_eq!(
            codegen.codegen(&items[0]).unwrap_err(),
            CodegenError::UnknownVariable("x".to_string())
        );
        // no partial function is left behind
        assert_eq!(codegen.program.get("f"), None);
        assert_eq!(codegen.program.to_string(), "");
    }

    #[test]
    fn unknown_callee_fails() {
        assert_eq!(
            lower_all("def f(x) mystery(x);").unwrap_err(),
            CodegenError::UnknownFunction("mystery".to_string())
        );
    }

    #[test]
    fn less_than_lowers_to_compare_then_widen() {
        let mut codegen = Codegen::new();
        let items = parse_items("def less(a b) a < b;");
        let id = codegen.codegen(&items[0]).unwrap();
        assert_eq!(
            codegen.program.function_to_string(id),
            "def less(a, b) {\nentry:\n  %2 = cmplt %0, %1\n  %3 = widen %2\n  ret %3\n}\n"
        );
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let mut codegen = Codegen::new();
        let body = Expr::Binary(
            '&',
            Box::new(Expr::Number(1.0)),
            Box::new(Expr::Number(2.0)),
        );
        let item = Item::Function(Function {
            prototype: Prototype {
                name: "f".to_string(),
                params: vec![],
            },
            body,
        });
        assert_eq!(
            codegen.codegen(&item).unwrap_err(),
            CodegenError::UnknownOperator('&')
        );
        assert_eq!(codegen.program.get("f"), None);
    }

    #[test]
    fn conflicting_arity_redeclaration_is_an_error() {
        assert_eq!(
            lower_all("extern foo(a); extern foo(a b);").unwrap_err(),
            CodegenError::ConflictingDeclaration("foo".to_string(), 1, 2)
        );
        assert_eq!(
            lower_all("def foo(a) a; def foo(a b) a;").unwrap_err(),
            CodegenError::ConflictingDeclaration("foo".to_string(), 1, 2)
        );
    }

    #[test]
    fn redefinition_is_an_error() {
        assert_eq!(
            lower_all("def f(x) x; def f(x) x + 1;").unwrap_err(),
            CodegenError::Redefinition("f".to_string())
        );
    }

    #[test]
    fn toplevel_expression_commits_then_erases_cleanly() {
        let mut codegen = Codegen::new();
        let items = parse_items("1 + 2 * 3;");
        let id = codegen.codegen(&items[0]).unwrap();
        assert!(codegen.program.verify(id));

        codegen.program.erase(id);
        assert_eq!(codegen.program.to_string(), "");

        // the next anonymous expression can then reuse the name
        let items = parse_items("4 < 5;");
        assert!(codegen.codegen(&items[0]).is_ok());
    }

    #[test]
    fn arguments_lower_in_order_and_short_circuit() {
        let err = lower_all("extern foo(a b); def g(x) foo(x, missing);").unwrap_err();
        assert_eq!(err, CodegenError::UnknownVariable("missing".to_string()));
    }
}
