//! AST node types shared by BRL, BCL and BDL.

use serde::Serialize;

/// Source span for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// A parsed source file (or the body of a nested `module`).
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub items: Vec<Item>,
}

/// Top-level declarations.
#[derive(Debug, Clone, Serialize)]
pub enum Item {
    Component(ComponentDef),
    Rule(RuleDef),
    Function(FnDef),
    Import(ImportDef),
    Module(ModuleDef),
    Entity(EntityDef),
}

impl Item {
    pub fn span(&self) -> Span {
        match self {
            Item::Component(c) => c.span,
            Item::Rule(r) => r.span,
            Item::Function(f) => f.span,
            Item::Import(i) => i.span,
            Item::Module(m) => m.span,
            Item::Entity(e) => e.span,
        }
    }
}

/// `component Health { current: integer max: integer }`
#[derive(Debug, Clone, Serialize)]
pub struct ComponentDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeExpr,
    pub optional: bool,
    pub span: Span,
}

/// Type annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TypeExpr {
    String,
    Boolean,
    Integer,
    Float,
    Decimal,
    Id,
    List(Box<TypeExpr>),
    Optional(Box<TypeExpr>),
    /// A record (component) name.
    Named(String),
    /// `Character & Skills & Health`: every listed record is required.
    Composite(Vec<String>),
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeExpr::String => f.write_str("string"),
            TypeExpr::Boolean => f.write_str("boolean"),
            TypeExpr::Integer => f.write_str("integer"),
            TypeExpr::Float => f.write_str("float"),
            TypeExpr::Decimal => f.write_str("decimal"),
            TypeExpr::Id => f.write_str("id"),
            TypeExpr::List(inner) => write!(f, "list<{inner}>"),
            TypeExpr::Optional(inner) => write!(f, "{inner}?"),
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::Composite(names) => f.write_str(&names.join(" & ")),
        }
    }
}

/// `rule name on Event(param: Type) when guard [priority: N] { body }`
#[derive(Debug, Clone, Serialize)]
pub struct RuleDef {
    pub name: Option<String>,
    pub event: String,
    pub param: Param,
    pub guard: Option<Expr>,
    pub priority: Option<i64>,
    pub body: Block,
    pub span: Span,
}

/// `fn name(params): Type { body }` or `choice fn name(params): Type { body }`
#[derive(Debug, Clone, Serialize)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub is_choice: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// `import a.b.c` or `import a.b.{X, Y}`
#[derive(Debug, Clone, Serialize)]
pub struct ImportDef {
    pub path: Vec<String>,
    pub items: Option<Vec<String>>,
    pub span: Span,
}

/// `module name { items }`
#[derive(Debug, Clone, Serialize)]
pub struct ModuleDef {
    pub name: String,
    pub module: Module,
    pub span: Span,
}

/// An entity instance declared at top level.
#[derive(Debug, Clone, Serialize)]
pub struct EntityDef {
    pub variable: Option<String>,
    pub components: Vec<ComponentInit>,
    pub bound_functions: Vec<BoundFnDef>,
    pub span: Span,
}

/// `.name = choice(params): Type { body }` inside an entity block.
#[derive(Debug, Clone, Serialize)]
pub struct BoundFnDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub span: Span,
}

/// `Health { current: 100 max: 100 }`
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInit {
    pub name: String,
    pub fields: Vec<FieldInit>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Statements.
#[derive(Debug, Clone, Serialize)]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<TypeExpr>,
        value: Expr,
        span: Span,
    },
    Assign {
        target: Expr,
        op: AssignOp,
        value: Expr,
        span: Span,
    },
    If(IfStmt),
    For {
        var: String,
        iterable: Expr,
        body: Block,
        span: Span,
    },
    While {
        condition: Expr,
        body: Block,
        span: Span,
    },
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Schedule(ScheduleStmt),
    Cancel {
        target: Expr,
        span: Span,
    },
    Create {
        components: Vec<ComponentInit>,
        span: Span,
    },
    Delete {
        target: Expr,
        span: Span,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, Serialize)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_block: Block,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum ElseBranch {
    ElseIf(Box<IfStmt>),
    Else(Block),
}

/// `schedule [recurring] [delay: expr] EventName { field: expr ... }`
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleStmt {
    pub event: String,
    pub recurring: bool,
    pub delay: Option<Expr>,
    pub interval: Option<Expr>,
    pub fields: Vec<FieldInit>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AssignOp {
    Set,
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Expressions.
#[derive(Debug, Clone, Serialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub enum ExprKind {
    Literal(Literal),
    /// Variable reference: `x`, `event`
    Ident(String),
    /// `@warrior` (name stored without the `@`)
    EntityRef(String),
    /// `a.b`
    Field {
        object: Box<Expr>,
        field: String,
    },
    /// `a[i]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `min(a, b)`
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// `e.selectTarget(enemies)`
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// `e has Health`
    Has {
        object: Box<Expr>,
        component: String,
    },
    /// `entities having Health`
    EntitiesHaving(String),
    /// `clone e { Health { current: 1 } }`
    Clone {
        source: Box<Expr>,
        overrides: Vec<ComponentInit>,
    },
    /// `[a, b, c]`
    List(Vec<Expr>),
    Paren(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Literal {
    String(String),
    Integer(i64),
    Float(f64),
    /// Kept as source text (without the `d` suffix).
    Decimal(String),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Neg,
    Not,
}
