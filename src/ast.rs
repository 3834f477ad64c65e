//! Abstract syntax tree.
//!
//! Two polymorphic families — [`Expr`] and [`Stmt`] — implemented as tagged
//! enums with exhaustive pattern matching, replacing the inheritance +
//! visitor hierarchy of the original implementation (see DESIGN.md, "Source
//! patterns and their re-architected forms").

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeclKind {
    Var,
    Vas,
    Let,
    Const,
}

/// The structural type grammar from spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Int(Option<u8>),
    UInt(Option<u8>),
    Float(Option<u8>),
    Str(Option<u32>),
    Bool,
    Void,
    Any,
    Sol,
    Map(Box<TypeNode>, Box<TypeNode>),
    Array(Box<TypeNode>),
    Union(Vec<TypeNode>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    FloorDiv,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Is,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

/// A fragment of an interpolated string: either a literal run of text or a
/// sub-expression whose value is converted to text (spec.md §4.4).
#[derive(Debug, Clone, PartialEq)]
pub enum InterpPart {
    Text(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub binding: Option<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal {
        value: Literal,
        line: usize,
        col: usize,
    },
    Identifier {
        name: String,
        line: usize,
        col: usize,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        line: usize,
        col: usize,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        line: usize,
        col: usize,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
        line: usize,
        col: usize,
    },
    Grouping(Box<Expr>),
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        line: usize,
        col: usize,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        line: usize,
        col: usize,
    },
    Postfix {
        op: PostfixOp,
        target: Box<Expr>,
        line: usize,
        col: usize,
    },
    ArrayLit {
        elements: Vec<Expr>,
        line: usize,
        col: usize,
    },
    MapLit {
        entries: Vec<(Expr, Expr)>,
        line: usize,
        col: usize,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        line: usize,
        col: usize,
    },
    Interpolated {
        parts: Vec<InterpPart>,
        line: usize,
        col: usize,
    },
    /// `receiver.name`, before the semantic pass determines whether `name`
    /// is a plain field/member access or a package constant.
    Member {
        object: Box<Expr>,
        name: String,
        line: usize,
        col: usize,
    },
    /// `object.method(args)` — a dedicated-opcode container/math method, or
    /// a plain user call resolved at emission time.
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        line: usize,
        col: usize,
    },
    /// A member access that the semantic pass has proven refers to a known
    /// package (`pkg.member` where `get_constant(pkg, member)` succeeds).
    PackageConst {
        package: String,
        name: String,
        line: usize,
        col: usize,
    },
    This {
        line: usize,
        col: usize,
    },
    New {
        type_name: Box<TypeNode>,
        args: Vec<Expr>,
        line: usize,
        col: usize,
    },
    Uninit {
        line: usize,
        col: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Sol,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
}

impl Expr {
    pub fn line_col(&self) -> (usize, usize) {
        match self {
            Expr::Literal { line, col, .. }
            | Expr::Identifier { line, col, .. }
            | Expr::Unary { line, col, .. }
            | Expr::Binary { line, col, .. }
            | Expr::Logical { line, col, .. }
            | Expr::Assign { line, col, .. }
            | Expr::Call { line, col, .. }
            | Expr::Postfix { line, col, .. }
            | Expr::ArrayLit { line, col, .. }
            | Expr::MapLit { line, col, .. }
            | Expr::Subscript { line, col, .. }
            | Expr::Interpolated { line, col, .. }
            | Expr::Member { line, col, .. }
            | Expr::MethodCall { line, col, .. }
            | Expr::PackageConst { line, col, .. }
            | Expr::This { line, col }
            | Expr::New { line, col, .. }
            | Expr::Uninit { line, col } => (*line, *col),
            Expr::Grouping(inner) => inner.line_col(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Print {
        args: Vec<Expr>,
        newline: bool,
        line: usize,
        col: usize,
    },
    VarDecl {
        kind: DeclKind,
        name: String,
        type_ann: Option<TypeNode>,
        init: Option<Expr>,
        line: usize,
        col: usize,
    },
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    FuncDecl {
        name: String,
        params: Vec<(String, Option<TypeNode>)>,
        return_type: Option<TypeNode>,
        body: Vec<Stmt>,
        line: usize,
        col: usize,
    },
    Return {
        value: Option<Expr>,
        line: usize,
        col: usize,
    },
    Break {
        line: usize,
        col: usize,
    },
    Continue {
        line: usize,
        col: usize,
    },
    Switch {
        scrutinee: Expr,
        cases: Vec<SwitchCase>,
        default: Option<Vec<Stmt>>,
    },
    Delete {
        target: Expr,
        line: usize,
        col: usize,
    },
    Throw {
        value: Expr,
        line: usize,
        col: usize,
    },
    Try {
        body: Vec<Stmt>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Stmt>>,
    },
    Import {
        name: String,
        line: usize,
        col: usize,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub statements: Vec<Stmt>,
}
