//! The MPCL abstract syntax tree.
//!
//! Nodes are tagged variants; each compiler pass (constant evaluation,
//! SSA generation) dispatches over them with a match.

use mpcl_circuit::TypeInfo;
use std::fmt;

use crate::error::Point;

/// A possibly package-qualified name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Name {
    pub package: Option<String>,
    pub name: String,
}

impl Name {
    pub fn plain(name: &str) -> Self {
        Name {
            package: None,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.package {
            Some(pkg) => write!(f, "{}.{}", pkg, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Lshift,
    Rshift,
    Band,
    Bclear,
    Add,
    Sub,
    Bor,
    Bxor,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> u8 {
        use BinaryOp::*;
        match self {
            Mul | Div | Mod | Lshift | Rshift | Band | Bclear => 5,
            Add | Sub | Bor | Bxor => 4,
            Eq | Neq | Lt | Le | Gt | Ge => 3,
            And => 2,
            Or => 1,
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use BinaryOp::*;
        let s = match self {
            Mul => "*",
            Div => "/",
            Mod => "%",
            Lshift => "<<",
            Rshift => ">>",
            Band => "&",
            Bclear => "&^",
            Add => "+",
            Sub => "-",
            Bor => "|",
            Bxor => "^",
            Eq => "==",
            Neq => "!=",
            Lt => "<",
            Le => "<=",
            Gt => ">",
            Ge => ">=",
            And => "&&",
            Or => "||",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Not,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    NameRef {
        loc: Point,
        name: Name,
    },
    IntLit {
        loc: Point,
        value: i64,
    },
    BoolLit {
        loc: Point,
        value: bool,
    },
    StringLit {
        loc: Point,
        value: String,
    },
    Binary {
        loc: Point,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        loc: Point,
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Call {
        loc: Point,
        name: Name,
        args: Vec<Expr>,
    },
    /// Type conversion `T(e)`; calls whose callee resolves to a type.
    Conversion {
        loc: Point,
        type_info: TypeInfo,
        expr: Box<Expr>,
    },
    Slice {
        loc: Point,
        expr: Box<Expr>,
        from: Option<Box<Expr>>,
        to: Option<Box<Expr>>,
    },
    Index {
        loc: Point,
        expr: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        loc: Point,
        expr: Box<Expr>,
        field: String,
    },
    /// Composite literal for an array or struct type.
    Composite {
        loc: Point,
        type_name: Option<String>,
        type_info: Option<TypeInfo>,
        values: Vec<(Option<String>, Expr)>,
    },
    /// `make(T)`: the zero value of array type `T`.
    Make {
        loc: Point,
        type_info: TypeInfo,
    },
}

impl Expr {
    pub fn location(&self) -> Point {
        match self {
            Expr::NameRef { loc, .. }
            | Expr::IntLit { loc, .. }
            | Expr::BoolLit { loc, .. }
            | Expr::StringLit { loc, .. }
            | Expr::Binary { loc, .. }
            | Expr::Unary { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Conversion { loc, .. }
            | Expr::Slice { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::Field { loc, .. }
            | Expr::Composite { loc, .. }
            | Expr::Make { loc, .. } => *loc,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::NameRef { name, .. } => write!(f, "{}", name),
            Expr::IntLit { value, .. } => write!(f, "{}", value),
            Expr::BoolLit { value, .. } => write!(f, "{}", value),
            Expr::StringLit { value, .. } => write!(f, "{:?}", value),
            Expr::Binary {
                op, left, right, ..
            } => write!(f, "{} {} {}", left, op, right),
            Expr::Unary { op, expr, .. } => match op {
                UnaryOp::Minus => write!(f, "-{}", expr),
                UnaryOp::Not => write!(f, "!{}", expr),
            },
            Expr::Call { name, args, .. } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::Conversion {
                type_info, expr, ..
            } => write!(f, "{}({})", type_info, expr),
            Expr::Slice { expr, from, to, .. } => {
                write!(f, "{}[", expr)?;
                if let Some(from) = from {
                    write!(f, "{}", from)?;
                }
                write!(f, ":")?;
                if let Some(to) = to {
                    write!(f, "{}", to)?;
                }
                write!(f, "]")
            }
            Expr::Index { expr, index, .. } => write!(f, "{}[{}]", expr, index),
            Expr::Field { expr, field, .. } => write!(f, "{}.{}", expr, field),
            Expr::Composite { type_name, .. } => {
                write!(f, "{}{{...}}", type_name.as_deref().unwrap_or(""))
            }
            Expr::Make { type_info, .. } => write!(f, "make({})", type_info),
        }
    }
}

pub type List = Vec<Stmt>;

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VariableDef {
        loc: Point,
        names: Vec<String>,
        type_info: TypeInfo,
        init: Option<Expr>,
    },
    ConstantDef {
        loc: Point,
        name: String,
        init: Expr,
    },
    Assign {
        loc: Point,
        lvalues: Vec<Expr>,
        /// Compound assignment operator, e.g. `+=`; plain `=`/`:=` when
        /// absent.
        op: Option<BinaryOp>,
        exprs: Vec<Expr>,
        define: bool,
    },
    If {
        loc: Point,
        cond: Expr,
        true_branch: List,
        false_branch: List,
    },
    For {
        loc: Point,
        init: Box<Stmt>,
        cond: Expr,
        inc: Box<Stmt>,
        body: List,
    },
    Return {
        loc: Point,
        exprs: Vec<Expr>,
    },
    ExprStmt {
        loc: Point,
        expr: Expr,
    },
}

impl Stmt {
    pub fn location(&self) -> Point {
        match self {
            Stmt::VariableDef { loc, .. }
            | Stmt::ConstantDef { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::For { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::ExprStmt { loc, .. } => *loc,
        }
    }
}

/// A function argument or named return value.
#[derive(Clone, Debug, PartialEq)]
pub struct Argument {
    pub name: String,
    pub type_info: TypeInfo,
}

/// A function declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Func {
    pub loc: Point,
    pub name: String,
    pub args: Vec<Argument>,
    pub returns: Vec<TypeInfo>,
    pub body: List,
}

/// One parsed compilation unit.
#[derive(Clone, Debug, Default)]
pub struct Unit {
    pub package: String,
    pub imports: Vec<String>,
    pub constants: Vec<(String, Expr)>,
    pub types: Vec<(String, TypeInfo)>,
    pub functions: Vec<Func>,
}

impl Unit {
    pub fn function(&self, name: &str) -> Option<&Func> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeInfo> {
        self.types
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}
