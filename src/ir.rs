//! Three-address, SSA-ish intermediate representation.
//!
//! A [`Module`] owns an ordered list of [`IrFunction`]s and a table of
//! interned string literals. Each function owns an ordered list of
//! [`BasicBlock`]s, the first of which is the entry block. Each block owns
//! an ordered list of [`Instruction`]s ending in exactly one [`Terminator`].
//!
//! Unlike the stack-threaded model used further down this pipeline's
//! ancestor (every operation taking and returning a stack pointer), values
//! here are named: each instruction produces at most one SSA destination,
//! and variables live behind `alloca`/`load`/`store` rather than as
//! registers, so codegen can treat every local as a stack slot without a
//! separate register-allocation pass.

use crate::diagnostics::SourceLocation;
use crate::types::Type;
use std::fmt;

/// A compile-time constant operand, carrying the type it was produced with.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
}

/// An operand to an IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Const(Constant, Type),
    /// A previously-defined SSA value, referenced by name.
    Value(String, Type),
    /// A basic-block label, used only as a branch target, never as a value.
    Label(String),
    /// The address of an interned string literal in the module's rodata
    /// table, referenced by its label.
    StringLit(String),
    /// The address of a file-scope variable, referenced by its symbol name.
    GlobalAddr(String, Type),
}

impl Operand {
    pub fn ty(&self) -> Type {
        match self {
            Operand::Const(_, ty) | Operand::Value(_, ty) => ty.clone(),
            Operand::Label(_) => Type::void(),
            Operand::StringLit(_) => Type::char().pointer(),
            Operand::GlobalAddr(_, ty) => ty.pointer(),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Const(Constant::Int(v), _) => write!(f, "{v}"),
            Operand::Const(Constant::Float(v), _) => write!(f, "{v}"),
            Operand::Value(name, _) => write!(f, "%{name}"),
            Operand::Label(name) => write!(f, "{name}"),
            Operand::StringLit(label) => write!(f, "@{label}"),
            Operand::GlobalAddr(name, _) => write!(f, "@{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single IR instruction. `dest` is `None` for instructions with no
/// result (e.g. `store`).
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub dest: Option<String>,
    pub kind: InstKind,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Arith { op: ArithOp, ty: Type, lhs: Operand, rhs: Operand },
    Compare { op: CompareOp, ty: Type, lhs: Operand, rhs: Operand },
    Neg { ty: Type, operand: Operand },
    Not { ty: Type, operand: Operand },
    BitNot { ty: Type, operand: Operand },
    /// Reserves stack space for a local of `ty`; the destination is the
    /// address, always a pointer one level deeper than `ty`.
    Alloca { ty: Type },
    Load { ty: Type, address: Operand },
    Store { ty: Type, address: Operand, value: Operand },
    /// Address of `base` plus a byte `offset` (struct member access) or a
    /// scaled index (array/pointer arithmetic, `scale` = element size).
    AddrOf { base: Operand, offset: Operand },
    /// A no-op value rename, used when a cast doesn't change representation
    /// or when a value simply needs a new SSA name (e.g. after a phi-less
    /// merge in this alloca-based lowering).
    Move { ty: Type, value: Operand },
    /// Int<->float and integer width conversions; `from`/`to` record the
    /// source and destination types so codegen picks the right opcode.
    Convert { from: Type, to: Type, value: Operand },
    Call { callee: String, args: Vec<Operand>, ty: Type },
}

impl Instruction {
    pub fn ty(&self) -> Type {
        match &self.kind {
            InstKind::Arith { ty, .. }
            | InstKind::Neg { ty, .. }
            | InstKind::Not { ty, .. }
            | InstKind::BitNot { ty, .. }
            | InstKind::Load { ty, .. }
            | InstKind::Move { ty, .. }
            | InstKind::Call { ty, .. } => ty.clone(),
            InstKind::Compare { .. } => Type::int(),
            InstKind::Alloca { ty } => ty.pointer(),
            InstKind::Store { .. } => Type::void(),
            InstKind::AddrOf { base, .. } => base.ty().pointer(),
            InstKind::Convert { to, .. } => to.clone(),
        }
    }
}

/// The single instruction that must end every basic block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Branch { target: String },
    CondBranch { cond: Operand, then_label: String, else_label: String },
    Return { value: Option<Operand> },
    /// Placeholder used while a block is under construction; replaced before
    /// the function is considered complete. Never valid in a finished
    /// module.
    Unset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instructions: Vec::new(),
            terminator: Terminator::Unset,
        }
    }

    pub fn is_terminated(&self) -> bool {
        !matches!(self.terminator, Terminator::Unset)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrParam {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<IrParam>,
    pub is_variadic: bool,
    /// `None` for `extern` declarations with no body.
    pub blocks: Vec<BasicBlock>,
}

impl IrFunction {
    pub fn entry_label(&self) -> Option<&str> {
        self.blocks.first().map(|b| b.label.as_str())
    }

    pub fn block_mut(&mut self, label: &str) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.label == label)
    }

    /// Checks the invariants every finished function must satisfy: every
    /// block ends in exactly one real terminator, and the entry block
    /// exists (for defined functions).
    pub fn verify(&self) -> Result<(), String> {
        if self.blocks.is_empty() {
            return Err(format!("function '{}' has no basic blocks", self.name));
        }
        for block in &self.blocks {
            if matches!(block.terminator, Terminator::Unset) {
                return Err(format!(
                    "block '{}' in function '{}' has no terminator",
                    block.label, self.name
                ));
            }
        }
        Ok(())
    }
}

/// A module-level interned string literal, emitted once into `.rodata` and
/// referenced by every use site through its label.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    pub label: String,
    pub value: String,
}

/// A file-scope variable, emitted into `.data` with a `.quad` initializer
/// (zero when the declaration had none, or a non-constant one this
/// compiler's C89 subset doesn't evaluate at compile time).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVar {
    pub name: String,
    pub ty: Type,
    pub init: Option<Constant>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub functions: Vec<IrFunction>,
    pub strings: Vec<StringLiteral>,
    pub globals: Vec<GlobalVar>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn verify(&self) -> Result<(), String> {
        for f in &self.functions {
            if !f.blocks.is_empty() {
                f.verify()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.c"), 1, 1)
    }

    #[test]
    fn block_starts_unterminated() {
        let b = BasicBlock::new("entry");
        assert!(!b.is_terminated());
    }

    #[test]
    fn function_verify_rejects_unterminated_block() {
        let f = IrFunction {
            name: "f".into(),
            return_type: Type::int(),
            params: vec![],
            is_variadic: false,
            blocks: vec![BasicBlock::new("entry")],
        };
        assert!(f.verify().is_err());
    }

    #[test]
    fn function_verify_accepts_terminated_block() {
        let mut b = BasicBlock::new("entry");
        b.terminator = Terminator::Return { value: None };
        let f = IrFunction {
            name: "f".into(),
            return_type: Type::void(),
            params: vec![],
            is_variadic: false,
            blocks: vec![b],
        };
        assert!(f.verify().is_ok());
    }

    #[test]
    fn alloca_type_is_pointer_to_element() {
        let inst = Instruction {
            dest: Some("t0".into()),
            kind: InstKind::Alloca { ty: Type::int() },
            location: loc(),
        };
        assert_eq!(inst.ty(), Type::int().pointer());
    }

    #[test]
    fn module_verify_skips_bodyless_externs() {
        let f = IrFunction {
            name: "printf".into(),
            return_type: Type::int(),
            params: vec![],
            is_variadic: true,
            blocks: vec![],
        };
        let module = Module { functions: vec![f], strings: vec![], globals: vec![] };
        assert!(module.verify().is_ok());
    }
}
