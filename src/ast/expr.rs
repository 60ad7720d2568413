use super::location::Spanned;
use super::value::Value;

pub type Expr = Spanned<ExprKind>;

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal value, also the result of constant folding: `42`, `"foo"`,
    /// `@(2012-10-06)`, `#fff`
    Const(Value),

    /// List literal: `[1, 2, x]`
    List(Vec<Expr>),

    /// `[item for target in container if condition]`
    ListComp(Box<Comprehension>),

    /// Dict literal: `{"a": 1, b: 2}`
    Dict(Vec<(Expr, Expr)>),

    /// `{key: value for target in container if condition}`
    DictComp(Box<DictComprehension>),

    /// `(item for target in container if condition)`
    GenExpr(Box<Comprehension>),

    /// Variable reference. Falls back to built-in functions, then to an
    /// undefined value.
    Var(String),

    /// `obj.attr`
    GetAttr { obj: Box<Expr>, attr: String },

    /// `obj[index]`
    GetItem { obj: Box<Expr>, index: Box<Expr> },

    /// `obj[start:stop]`, either bound may be omitted.
    GetSlice {
        obj: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
    },

    /// `not x`, `-x`
    Unary { op: UnaryOp, operand: Box<Expr> },

    /// Arithmetic, comparison, containment and boolean operators.
    Binary {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },

    /// `f(args)`
    Call { callee: Box<Expr>, args: CallArgs },

    /// `obj.method(args)`
    CallMeth {
        obj: Box<Expr>,
        method: String,
        args: CallArgs,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub item: Expr,
    pub target: Target,
    pub container: Expr,
    pub condition: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DictComprehension {
    pub key: Expr,
    pub value: Expr,
    pub target: Target,
    pub container: Expr,
    pub condition: Option<Expr>,
}

/// Arguments of a call, in the order they're evaluated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub positional: Vec<Expr>,
    pub keyword: Vec<(String, Expr)>,
    /// `*expr`: a list whose items are appended to the positional arguments.
    pub rest: Option<Box<Expr>>,
    /// `**expr`: a dict whose items are added as keyword arguments.
    pub rest_keyword: Option<Box<Expr>>,
}

impl CallArgs {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
            && self.keyword.is_empty()
            && self.rest.is_none()
            && self.rest_keyword.is_none()
    }
}

/// The left side of an assignment or the variable part of a `for`:
/// a name or a (nested) tuple of names.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Unpack(Vec<Target>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    NotContains,
    Add,
    Sub,
    Mul,
    FloorDiv,
    TrueDiv,
    Mod,
    And,
    Or,
}

impl BinOp {
    pub const ALL: [BinOp; 16] = [
        BinOp::Eq,
        BinOp::Ne,
        BinOp::Lt,
        BinOp::Le,
        BinOp::Gt,
        BinOp::Ge,
        BinOp::Contains,
        BinOp::NotContains,
        BinOp::Add,
        BinOp::Sub,
        BinOp::Mul,
        BinOp::FloorDiv,
        BinOp::TrueDiv,
        BinOp::Mod,
        BinOp::And,
        BinOp::Or,
    ];

    /// Source form of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Contains => "in",
            BinOp::NotContains => "not in",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::FloorDiv => "//",
            BinOp::TrueDiv => "/",
            BinOp::Mod => "%",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    /// Stable name used as the node's type tag in the codec.
    pub fn tag(self) -> &'static str {
        match self {
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Le => "le",
            BinOp::Gt => "gt",
            BinOp::Ge => "ge",
            BinOp::Contains => "contains",
            BinOp::NotContains => "notcontains",
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::FloorDiv => "floordiv",
            BinOp::TrueDiv => "truediv",
            BinOp::Mod => "mod",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn tag(self) -> &'static str {
        match self {
            UnaryOp::Not => "not",
            UnaryOp::Neg => "neg",
        }
    }
}

/// Compound assignment operators: `+=`, `-=`, `*=`, `//=`, `/=`, `%=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    TrueDiv,
    Mod,
}

impl AssignOp {
    pub const ALL: [AssignOp; 6] = [
        AssignOp::Add,
        AssignOp::Sub,
        AssignOp::Mul,
        AssignOp::FloorDiv,
        AssignOp::TrueDiv,
        AssignOp::Mod,
    ];

    /// The binary operator applied before storing.
    pub fn binop(self) -> BinOp {
        match self {
            AssignOp::Add => BinOp::Add,
            AssignOp::Sub => BinOp::Sub,
            AssignOp::Mul => BinOp::Mul,
            AssignOp::FloorDiv => BinOp::FloorDiv,
            AssignOp::TrueDiv => BinOp::TrueDiv,
            AssignOp::Mod => BinOp::Mod,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Mul => "*=",
            AssignOp::FloorDiv => "//=",
            AssignOp::TrueDiv => "/=",
            AssignOp::Mod => "%=",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.symbol() == symbol)
    }

    pub fn tag(self) -> &'static str {
        match self {
            AssignOp::Add => "addvar",
            AssignOp::Sub => "subvar",
            AssignOp::Mul => "mulvar",
            AssignOp::FloorDiv => "floordivvar",
            AssignOp::TrueDiv => "truedivvar",
            AssignOp::Mod => "modvar",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.tag() == tag)
    }
}
