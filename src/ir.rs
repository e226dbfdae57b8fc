//! The target-program container the code generator emits into. Functions
//! hold typed instructions grouped into basic blocks; an external backend
//! consumes this representation, so nothing here knows about machine code.

use std::collections::HashMap;
use std::fmt;

/// Stable handle to a function in the program. Handles stay valid across
/// later declarations; `erase` tombstones the slot instead of shifting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(usize);

/// Handle to a value inside one function. Parameters occupy `0..arity`;
/// instruction results number upward from there in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "fadd"),
            ArithOp::Sub => write!(f, "fsub"),
            ArithOp::Mul => write!(f, "fmul"),
        }
    }
}

/// One instruction. `CmpLt` produces a boolean value, which is not a valid
/// expression value; only `BoolToNum` may consume it.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Const(f64),
    Arith(ArithOp, ValueId, ValueId),
    CmpLt(ValueId, ValueId),
    BoolToNum(ValueId),
    Call(FuncId, Vec<ValueId>),
    Ret(ValueId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Num,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Block {
    // indices into the function's instruction list
    instrs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    name: String,
    params: Vec<String>,
    insts: Vec<Instr>,
    blocks: Vec<Block>,
    defined: bool,
}

/// Whole-session program: the functions emitted so far plus the insertion
/// cursor used by the `emit_*` calls.
#[derive(Debug, Default)]
pub struct Program {
    funcs: Vec<Option<IrFunction>>,
    by_name: HashMap<String, FuncId>,
    cursor: Option<FuncId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function by name. The name table only shrinks through
    /// `erase`.
    pub fn declare(&mut self, name: &str, params: &[String]) -> FuncId {
        let id = FuncId(self.funcs.len());
        self.funcs.push(Some(IrFunction {
            name: name.to_string(),
            params: params.to_vec(),
            insts: Vec::new(),
            blocks: Vec::new(),
            defined: false,
        }));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<FuncId> {
        self.by_name.get(name).copied()
    }

    fn func(&self, id: FuncId) -> &IrFunction {
        self.funcs[id.0].as_ref().expect("use of erased function")
    }

    fn func_mut(&mut self, id: FuncId) -> &mut IrFunction {
        self.funcs[id.0].as_mut().expect("use of erased function")
    }

    pub fn name(&self, id: FuncId) -> &str {
        &self.func(id).name
    }

    pub fn arity(&self, id: FuncId) -> usize {
        self.func(id).params.len()
    }

    pub fn is_defined(&self, id: FuncId) -> bool {
        self.func(id).defined
    }

    /// Value handle of a positional parameter.
    pub fn param_value(&self, id: FuncId, index: usize) -> ValueId {
        debug_assert!(index < self.func(id).params.len());
        ValueId(index)
    }

    /// Mark the function defined, create its entry block and position the
    /// insertion cursor there. Any previously emitted body is discarded.
    pub fn begin_function(&mut self, id: FuncId) {
        let func = self.func_mut(id);
        func.defined = true;
        func.insts.clear();
        func.blocks.clear();
        func.blocks.push(Block::default());
        self.cursor = Some(id);
    }

    fn push(&mut self, inst: Instr) -> ValueId {
        let id = self.cursor.expect("no insertion point set");
        let func = self.func_mut(id);
        let index = func.insts.len();
        func.insts.push(inst);
        let block = func.blocks.last_mut().expect("no block to insert into");
        block.instrs.push(index);
        ValueId(func.params.len() + index)
    }

    pub fn emit_const(&mut self, value: f64) -> ValueId {
        self.push(Instr::Const(value))
    }

    pub fn emit_arith(&mut self, op: ArithOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::Arith(op, lhs, rhs))
    }

    pub fn emit_cmp_lt(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::CmpLt(lhs, rhs))
    }

    pub fn emit_bool_to_num(&mut self, value: ValueId) -> ValueId {
        self.push(Instr::BoolToNum(value))
    }

    pub fn emit_call(&mut self, callee: FuncId, args: Vec<ValueId>) -> ValueId {
        self.push(Instr::Call(callee, args))
    }

    pub fn emit_ret(&mut self, value: ValueId) {
        self.push(Instr::Ret(value));
    }

    /// Remove a function from the program and the name table. The slot is
    /// tombstoned so other handles stay valid.
    pub fn erase(&mut self, id: FuncId) {
        if let Some(func) = self.funcs[id.0].take() {
            self.by_name.remove(&func.name);
        }
        if self.cursor == Some(id) {
            self.cursor = None;
        }
    }

    /// Structural well-formedness: every block non-empty and terminated by
    /// a single trailing `Ret`, operands defined before use, and types
    /// consistent (booleans exist only between `CmpLt` and `BoolToNum`).
    pub fn verify(&self, id: FuncId) -> bool {
        let func = match self.funcs.get(id.0).and_then(|f| f.as_ref()) {
            Some(func) => func,
            None => return false,
        };
        if !func.defined || func.blocks.is_empty() {
            return false;
        }

        for block in &func.blocks {
            let last = match block.instrs.last() {
                Some(&last) => last,
                None => return false,
            };
            if !matches!(func.insts[last], Instr::Ret(_)) {
                return false;
            }
            let terminated_early = block.instrs[..block.instrs.len() - 1]
                .iter()
                .any(|&i| matches!(func.insts[i], Instr::Ret(_)));
            if terminated_early {
                return false;
            }
        }

        let mut types = vec![Ty::Num; func.params.len()];
        for inst in &func.insts {
            let ty = match inst {
                Instr::Const(_) => Ty::Num,
                Instr::Arith(_, lhs, rhs) => {
                    if ty_of(&types, *lhs) != Some(Ty::Num) || ty_of(&types, *rhs) != Some(Ty::Num)
                    {
                        return false;
                    }
                    Ty::Num
                }
                Instr::CmpLt(lhs, rhs) => {
                    if ty_of(&types, *lhs) != Some(Ty::Num) || ty_of(&types, *rhs) != Some(Ty::Num)
                    {
                        return false;
                    }
                    Ty::Bool
                }
                Instr::BoolToNum(value) => {
                    if ty_of(&types, *value) != Some(Ty::Bool) {
                        return false;
                    }
                    Ty::Num
                }
                Instr::Call(callee, args) => {
                    let callee = match self.funcs.get(callee.0).and_then(|f| f.as_ref()) {
                        Some(callee) => callee,
                        None => return false,
                    };
                    if callee.params.len() != args.len() {
                        return false;
                    }
                    if args.iter().any(|&arg| ty_of(&types, arg) != Some(Ty::Num)) {
                        return false;
                    }
                    Ty::Num
                }
                Instr::Ret(value) => {
                    if ty_of(&types, *value) != Some(Ty::Num) {
                        return false;
                    }
                    Ty::Num
                }
            };
            types.push(ty);
        }

        true
    }

    /// Textual form of one function, for the per-unit echo.
    pub fn function_to_string(&self, id: FuncId) -> String {
        let mut out = String::new();
        let _ = self.write_function(&mut out, self.func(id));
        out
    }

    fn write_function<W: fmt::Write>(&self, out: &mut W, func: &IrFunction) -> fmt::Result {
        if !func.defined {
            return writeln!(out, "extern {}({})", func.name, func.params.join(", "));
        }

        writeln!(out, "def {}({}) {{", func.name, func.params.join(", "))?;
        let arity = func.params.len();
        for (bi, block) in func.blocks.iter().enumerate() {
            if bi == 0 {
                writeln!(out, "entry:")?;
            } else {
                writeln!(out, "bb{}:", bi)?;
            }
            for &index in &block.instrs {
                let value = arity + index;
                match &func.insts[index] {
                    Instr::Const(c) => writeln!(out, "  %{} = const {}", value, c)?,
                    Instr::Arith(op, lhs, rhs) => {
                        writeln!(out, "  %{} = {} %{}, %{}", value, op, lhs.0, rhs.0)?
                    }
                    Instr::CmpLt(lhs, rhs) => {
                        writeln!(out, "  %{} = cmplt %{}, %{}", value, lhs.0, rhs.0)?
                    }
                    Instr::BoolToNum(v) => writeln!(out, "  %{} = widen %{}", value, v.0)?,
                    Instr::Call(callee, args) => {
                        let callee = self
                            .funcs
                            .get(callee.0)
                            .and_then(|f| f.as_ref())
                            .map(|f| f.name.as_str())
                            .unwrap_or("<erased>");
                        let args = args
                            .iter()
                            .map(|arg| format!("%{}", arg.0))
                            .collect::<Vec<_>>()
                            .join(", ");
                        writeln!(out, "  %{} = call {}({})", value, callee, args)?
                    }
                    Instr::Ret(v) => writeln!(out, "  ret %{}", v.0)?,
                }
            }
        }
        writeln!(out, "}}")
    }
}

fn ty_of(types: &[Ty], value: ValueId) -> Option<Ty> {
    types.get(value.0).copied()
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for func in self.funcs.iter().flatten() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            self.write_function(f, func)?;
        }
        Ok(())
    }
}
