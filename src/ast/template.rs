use std::sync::Arc;

use super::expr::{AssignOp, Expr, Target};
use super::location::Location;

/// A compiled template: the root of the AST.
///
/// A template owns its source text (every [`Location`] points into it), the
/// options it was compiled with, and its top level block. Templates defined
/// with `<?def?>` inside another template are nested [`NodeKind::Def`]
/// nodes sharing the parent's source.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: Option<String>,
    pub source: Arc<str>,
    pub keepws: bool,
    pub startdelim: String,
    pub enddelim: String,
    /// Declared parameters for `<?def name(a, b=1)?>`. `None` means the
    /// template accepts arbitrary keyword arguments.
    pub params: Option<Vec<Param>>,
    /// The `def` tag for nested templates, `None` at the top level.
    pub location: Option<Location>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// An ordered run of nodes plus the tag that closed it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub nodes: Vec<Node>,
    pub end: Option<Location>,
}

/// A statement-level node: literal text or one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Location,
}

impl Node {
    pub fn new(kind: NodeKind, location: Location) -> Self {
        Self { kind, location }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Literal text, with line feed whitespace already removed unless the
    /// template keeps whitespace.
    Text(String),

    /// `<?print expr?>`
    Print(Expr),

    /// `<?printx expr?>`: like `print`, but XML-escaped.
    PrintX(Expr),

    /// `<?return expr?>`
    Return(Expr),

    /// `<?code expr?>`: evaluated for its side effects.
    Expr(Expr),

    /// `<?code target = expr?>`
    Store { target: Target, value: Expr },

    /// `<?code name += expr?>` and the other compound assignments.
    Modify {
        op: AssignOp,
        name: String,
        value: Expr,
    },

    /// `<?if?>…<?elif?>…<?else?>…<?end if?>`
    If(IfBlock),

    /// `<?for target in container?>…<?end for?>`
    For(ForBlock),

    Break,
    Continue,

    /// `<?def name?>…<?end def?>`
    Def(Arc<Template>),
}

/// A conditional chain. Branches are tried in order; the `else` branch, if
/// present, is last and has no condition.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock {
    pub branches: Vec<Branch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub kind: BranchKind,
    pub condition: Option<Expr>,
    pub location: Location,
    pub body: Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchKind {
    If,
    ElIf,
    Else,
}

impl BranchKind {
    pub fn tag(self) -> &'static str {
        match self {
            BranchKind::If => "if",
            BranchKind::ElIf => "elif",
            BranchKind::Else => "else",
        }
    }
}

/// A `for` loop. The target is bound once per item in a scope that
/// disappears when the loop ends.
#[derive(Debug, Clone, PartialEq)]
pub struct ForBlock {
    pub target: Target,
    pub container: Expr,
    pub body: Block,
}
