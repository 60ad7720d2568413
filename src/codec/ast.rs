//! Templates and their AST in the token stream.
//!
//! Every node is written as `(tag …)`. Expressions carry their source span
//! as two ints, statements carry a full location. Text nodes only store
//! their location: the text itself is recomputed from the source.

use std::sync::Arc;

use super::{Decoder, Encoder, Frame, Result, VERSION};
use crate::ast::expr::{
    AssignOp, BinOp, CallArgs, Comprehension, DictComprehension, Expr, ExprKind, Target, UnaryOp,
};
use crate::ast::location::{Location, Span, Spanned, TagKind};
use crate::ast::template::{
    Block, Branch, BranchKind, ForBlock, IfBlock, Node, NodeKind, Param, Template,
};
use crate::error::CodecError;
use crate::parser::strip_linefeeds;

// ── Encoding ────────────────────────────────────────────────────────────

impl Encoder {
    /// Write a template. A nested template whose source is the parent's
    /// writes `n` instead of repeating it.
    pub(super) fn template(&mut self, t: &Template, parent: Option<&Arc<str>>) -> Result<()> {
        self.word("(template");
        self.int(VERSION);
        self.opt_string(t.name.as_deref());
        match parent {
            Some(source) if Arc::ptr_eq(source, &t.source) || **source == *t.source => self.none(),
            _ => self.string(&t.source),
        }
        self.bool(t.keepws);
        self.string(&t.startdelim);
        self.string(&t.enddelim);
        match &t.params {
            None => self.none(),
            Some(params) => {
                self.word("[");
                for param in params {
                    self.word("[");
                    self.string(&param.name);
                    self.opt_expr(param.default.as_ref())?;
                    self.word("]");
                }
                self.word("]");
            }
        }
        self.opt_location(t.location.as_ref());
        self.block(&t.body, &t.source)?;
        self.word(")");
        Ok(())
    }

    fn location(&mut self, location: &Location) {
        self.word("(location");
        match location.kind() {
            Some(kind) => self.string(kind.keyword()),
            None => self.none(),
        }
        let (tag, code) = (location.tag_span(), location.code_span());
        self.usize(tag.start);
        self.usize(tag.end);
        self.usize(code.start);
        self.usize(code.end);
        self.word(")");
    }

    fn opt_location(&mut self, location: Option<&Location>) {
        match location {
            Some(location) => self.location(location),
            None => self.none(),
        }
    }

    fn block(&mut self, block: &Block, source: &Arc<str>) -> Result<()> {
        self.word("[");
        for node in &block.nodes {
            self.node(node, source)?;
        }
        self.word("]");
        self.opt_location(block.end.as_ref());
        Ok(())
    }

    fn node(&mut self, node: &Node, source: &Arc<str>) -> Result<()> {
        let tag = match &node.kind {
            NodeKind::Text(_) => "text",
            NodeKind::Print(_) => "print",
            NodeKind::PrintX(_) => "printx",
            NodeKind::Return(_) => "return",
            NodeKind::Expr(_) => "expr",
            NodeKind::Store { .. } => "storevar",
            NodeKind::Modify { op, .. } => op.tag(),
            NodeKind::If(_) => "ieie",
            NodeKind::For(_) => "for",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::Def(_) => "def",
        };
        self.word(format_args!("({tag}"));
        self.location(&node.location);
        match &node.kind {
            NodeKind::Text(_) | NodeKind::Break | NodeKind::Continue => {}
            NodeKind::Print(e) | NodeKind::PrintX(e) | NodeKind::Return(e) | NodeKind::Expr(e) => {
                self.expr(e)?;
            }
            NodeKind::Store { target, value } => {
                self.target(target);
                self.expr(value)?;
            }
            NodeKind::Modify { name, value, .. } => {
                self.string(name);
                self.expr(value)?;
            }
            NodeKind::If(block) => {
                self.word("[");
                for branch in &block.branches {
                    self.word(format_args!("({}", branch.kind.tag()));
                    self.location(&branch.location);
                    self.opt_expr(branch.condition.as_ref())?;
                    self.block(&branch.body, source)?;
                    self.word(")");
                }
                self.word("]");
            }
            NodeKind::For(block) => {
                self.target(&block.target);
                self.expr(&block.container)?;
                self.block(&block.body, source)?;
            }
            NodeKind::Def(template) => self.template(template, Some(source))?,
        }
        self.word(")");
        Ok(())
    }

    fn target(&mut self, target: &Target) {
        match target {
            Target::Name(name) => self.string(name),
            Target::Unpack(targets) => {
                self.word("[");
                for target in targets {
                    self.target(target);
                }
                self.word("]");
            }
        }
    }

    fn opt_expr(&mut self, expr: Option<&Expr>) -> Result<()> {
        match expr {
            Some(expr) => self.expr(expr),
            None => {
                self.none();
                Ok(())
            }
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<()> {
        self.word("[");
        for expr in exprs {
            self.expr(expr)?;
        }
        self.word("]");
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> Result<()> {
        let tag = match &expr.node {
            ExprKind::Const(_) => "const",
            ExprKind::List(_) => "list",
            ExprKind::ListComp(_) => "listcomp",
            ExprKind::Dict(_) => "dict",
            ExprKind::DictComp(_) => "dictcomp",
            ExprKind::GenExpr(_) => "genexpr",
            ExprKind::Var(_) => "var",
            ExprKind::GetAttr { .. } => "getattr",
            ExprKind::GetItem { .. } => "getitem",
            ExprKind::GetSlice { .. } => "getslice",
            ExprKind::Unary { op, .. } => op.tag(),
            ExprKind::Binary { op, .. } => op.tag(),
            ExprKind::Call { .. } => "callfunc",
            ExprKind::CallMeth { .. } => "callmeth",
        };
        self.word(format_args!("({tag}"));
        self.usize(expr.span.start);
        self.usize(expr.span.end);
        match &expr.node {
            ExprKind::Const(value) => self.value(value)?,
            ExprKind::List(items) => self.exprs(items)?,
            ExprKind::ListComp(comp) | ExprKind::GenExpr(comp) => {
                self.expr(&comp.item)?;
                self.target(&comp.target);
                self.expr(&comp.container)?;
                self.opt_expr(comp.condition.as_ref())?;
            }
            ExprKind::Dict(items) => {
                self.word("[");
                for (key, value) in items {
                    self.word("[");
                    self.expr(key)?;
                    self.expr(value)?;
                    self.word("]");
                }
                self.word("]");
            }
            ExprKind::DictComp(comp) => {
                self.expr(&comp.key)?;
                self.expr(&comp.value)?;
                self.target(&comp.target);
                self.expr(&comp.container)?;
                self.opt_expr(comp.condition.as_ref())?;
            }
            ExprKind::Var(name) => self.string(name),
            ExprKind::GetAttr { obj, attr } => {
                self.expr(obj)?;
                self.string(attr);
            }
            ExprKind::GetItem { obj, index } => {
                self.expr(obj)?;
                self.expr(index)?;
            }
            ExprKind::GetSlice { obj, start, stop } => {
                self.expr(obj)?;
                self.opt_expr(start.as_deref())?;
                self.opt_expr(stop.as_deref())?;
            }
            ExprKind::Unary { operand, .. } => self.expr(operand)?,
            ExprKind::Binary { left, right, .. } => {
                self.expr(left)?;
                self.expr(right)?;
            }
            ExprKind::Call { callee, args } => {
                self.expr(callee)?;
                self.args(args)?;
            }
            ExprKind::CallMeth { obj, method, args } => {
                self.expr(obj)?;
                self.string(method);
                self.args(args)?;
            }
        }
        self.word(")");
        Ok(())
    }

    fn args(&mut self, args: &CallArgs) -> Result<()> {
        self.exprs(&args.positional)?;
        self.word("[");
        for (name, value) in &args.keyword {
            self.word("[");
            self.string(name);
            self.expr(value)?;
            self.word("]");
        }
        self.word("]");
        self.opt_expr(args.rest.as_deref())?;
        self.opt_expr(args.rest_keyword.as_deref())
    }
}

// ── Decoding ────────────────────────────────────────────────────────────

impl Decoder<'_> {
    /// Read the rest of a template after its `(template` token.
    pub(super) fn template(&mut self) -> Result<Template> {
        let found = self.int()?;
        if found != VERSION {
            return Err(CodecError::Version {
                expected: VERSION,
                found,
            });
        }
        let name = self.opt_string()?;
        let offset = self.pos;
        let source: Arc<str> = if self.none() {
            match self.frames.last() {
                Some(frame) => Arc::clone(&frame.source),
                None => return Err(self.malformed(offset, "top level template without source")),
            }
        } else {
            Arc::from(self.string()?)
        };
        let keepws = self.bool()?;
        let startdelim = self.string()?;
        let enddelim = self.string()?;
        self.frames.push(Frame {
            source: Arc::clone(&source),
            keepws,
        });
        let params = if self.none() {
            None
        } else {
            let mut params = Vec::new();
            self.expect("[")?;
            while !self.at("]") {
                self.expect("[")?;
                let name = self.string()?;
                let default = self.opt_expr()?;
                self.expect("]")?;
                params.push(Param { name, default });
            }
            self.expect("]")?;
            Some(params)
        };
        let location = self.opt_location()?;
        let body = self.block()?;
        self.close()?;
        self.frames.pop();
        Ok(Template {
            name,
            source,
            keepws,
            startdelim,
            enddelim,
            params,
            location,
            body,
        })
    }

    fn frame(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| self.malformed(self.pos, "node outside of a template"))
    }

    fn location(&mut self) -> Result<Location> {
        let (offset, tag) = self.open()?;
        if tag != "location" {
            return Err(self.malformed(offset, format!("expected a location, found {tag:?}")));
        }
        let kind = match self.opt_string()? {
            None => None,
            Some(keyword) => Some(
                TagKind::from_keyword(&keyword)
                    .ok_or_else(|| self.malformed(offset, format!("unknown tag kind {keyword:?}")))?,
            ),
        };
        let tag = Span::new(self.usize()?, self.usize()?);
        let code = Span::new(self.usize()?, self.usize()?);
        self.close()?;
        let source = Arc::clone(&self.frame()?.source);
        for span in [tag, code] {
            let valid = span.start <= span.end
                && source.is_char_boundary(span.start)
                && source.is_char_boundary(span.end);
            if !valid {
                return Err(self.malformed(offset, "location outside of the template source"));
            }
        }
        Ok(Location::new(source, kind, tag, code))
    }

    fn opt_location(&mut self) -> Result<Option<Location>> {
        if self.none() { Ok(None) } else { self.location().map(Some) }
    }

    fn block(&mut self) -> Result<Block> {
        self.expect("[")?;
        let mut nodes = Vec::new();
        while !self.at("]") {
            nodes.push(self.node()?);
        }
        self.expect("]")?;
        let end = self.opt_location()?;
        Ok(Block { nodes, end })
    }

    fn node(&mut self) -> Result<Node> {
        let (offset, tag) = self.open()?;
        let location = self.location()?;
        let kind = match tag {
            "text" => {
                let keepws = self.frame()?.keepws;
                let code = location.code();
                NodeKind::Text(if keepws {
                    code.to_string()
                } else {
                    strip_linefeeds(code)
                })
            }
            "print" => NodeKind::Print(self.expr()?),
            "printx" => NodeKind::PrintX(self.expr()?),
            "return" => NodeKind::Return(self.expr()?),
            "expr" => NodeKind::Expr(self.expr()?),
            "storevar" => NodeKind::Store {
                target: self.target()?,
                value: self.expr()?,
            },
            "ieie" => {
                let mut branches = Vec::new();
                self.expect("[")?;
                while !self.at("]") {
                    branches.push(self.branch()?);
                }
                self.expect("]")?;
                NodeKind::If(IfBlock { branches })
            }
            "for" => NodeKind::For(ForBlock {
                target: self.target()?,
                container: self.expr()?,
                body: self.block()?,
            }),
            "break" => NodeKind::Break,
            "continue" => NodeKind::Continue,
            "def" => {
                let (offset, tag) = self.open()?;
                if tag != "template" {
                    return Err(CodecError::UnknownTag {
                        tag: tag.to_string(),
                        offset,
                    });
                }
                NodeKind::Def(Arc::new(self.template()?))
            }
            _ => match AssignOp::from_tag(tag) {
                Some(op) => NodeKind::Modify {
                    op,
                    name: self.string()?,
                    value: self.expr()?,
                },
                None => {
                    return Err(CodecError::UnknownTag {
                        tag: tag.to_string(),
                        offset,
                    });
                }
            },
        };
        self.close()?;
        Ok(Node::new(kind, location))
    }

    fn branch(&mut self) -> Result<Branch> {
        let (offset, tag) = self.open()?;
        let kind = match tag {
            "if" => BranchKind::If,
            "elif" => BranchKind::ElIf,
            "else" => BranchKind::Else,
            _ => {
                return Err(CodecError::UnknownTag {
                    tag: tag.to_string(),
                    offset,
                });
            }
        };
        let location = self.location()?;
        let condition = self.opt_expr()?;
        let body = self.block()?;
        self.close()?;
        Ok(Branch {
            kind,
            condition,
            location,
            body,
        })
    }

    fn target(&mut self) -> Result<Target> {
        if !self.at("[") {
            return self.string().map(Target::Name);
        }
        self.expect("[")?;
        let mut targets = Vec::new();
        while !self.at("]") {
            targets.push(self.target()?);
        }
        self.expect("]")?;
        Ok(Target::Unpack(targets))
    }

    fn opt_expr(&mut self) -> Result<Option<Expr>> {
        if self.none() { Ok(None) } else { self.expr().map(Some) }
    }

    fn boxed(&mut self) -> Result<Box<Expr>> {
        self.expr().map(Box::new)
    }

    fn opt_boxed(&mut self) -> Result<Option<Box<Expr>>> {
        Ok(self.opt_expr()?.map(Box::new))
    }

    fn exprs(&mut self) -> Result<Vec<Expr>> {
        self.expect("[")?;
        let mut exprs = Vec::new();
        while !self.at("]") {
            exprs.push(self.expr()?);
        }
        self.expect("]")?;
        Ok(exprs)
    }

    fn comprehension(&mut self) -> Result<Box<Comprehension>> {
        Ok(Box::new(Comprehension {
            item: self.expr()?,
            target: self.target()?,
            container: self.expr()?,
            condition: self.opt_expr()?,
        }))
    }

    fn expr(&mut self) -> Result<Expr> {
        let (offset, tag) = self.open()?;
        let span = Span::new(self.usize()?, self.usize()?);
        let node = match tag {
            "const" => ExprKind::Const(self.value()?),
            "list" => ExprKind::List(self.exprs()?),
            "listcomp" => ExprKind::ListComp(self.comprehension()?),
            "genexpr" => ExprKind::GenExpr(self.comprehension()?),
            "dict" => {
                self.expect("[")?;
                let mut items = Vec::new();
                while !self.at("]") {
                    self.expect("[")?;
                    items.push((self.expr()?, self.expr()?));
                    self.expect("]")?;
                }
                self.expect("]")?;
                ExprKind::Dict(items)
            }
            "dictcomp" => ExprKind::DictComp(Box::new(DictComprehension {
                key: self.expr()?,
                value: self.expr()?,
                target: self.target()?,
                container: self.expr()?,
                condition: self.opt_expr()?,
            })),
            "var" => ExprKind::Var(self.string()?),
            "getattr" => ExprKind::GetAttr {
                obj: self.boxed()?,
                attr: self.string()?,
            },
            "getitem" => ExprKind::GetItem {
                obj: self.boxed()?,
                index: self.boxed()?,
            },
            "getslice" => ExprKind::GetSlice {
                obj: self.boxed()?,
                start: self.opt_boxed()?,
                stop: self.opt_boxed()?,
            },
            "not" | "neg" => ExprKind::Unary {
                op: if tag == "not" { UnaryOp::Not } else { UnaryOp::Neg },
                operand: self.boxed()?,
            },
            "callfunc" => ExprKind::Call {
                callee: self.boxed()?,
                args: self.args()?,
            },
            "callmeth" => ExprKind::CallMeth {
                obj: self.boxed()?,
                method: self.string()?,
                args: self.args()?,
            },
            _ => match BinOp::from_tag(tag) {
                Some(op) => ExprKind::Binary {
                    left: self.boxed()?,
                    op,
                    right: self.boxed()?,
                },
                None => {
                    return Err(CodecError::UnknownTag {
                        tag: tag.to_string(),
                        offset,
                    });
                }
            },
        };
        self.close()?;
        Ok(Spanned::new(node, span))
    }

    fn args(&mut self) -> Result<CallArgs> {
        let positional = self.exprs()?;
        let mut keyword = Vec::new();
        self.expect("[")?;
        while !self.at("]") {
            self.expect("[")?;
            keyword.push((self.string()?, self.expr()?));
            self.expect("]")?;
        }
        self.expect("]")?;
        Ok(CallArgs {
            positional,
            keyword,
            rest: self.opt_boxed()?,
            rest_keyword: self.opt_boxed()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::codec::{decode_template, encode_template};
    use crate::error::CodecError;
    use crate::options::CompileOptions;
    use crate::parser::compile;

    fn round_trip(source: &str, options: CompileOptions) {
        let template = compile(source, &options).unwrap();
        let dump = encode_template(&template).unwrap();
        assert_eq!(decode_template(&dump).unwrap(), template, "dump was {dump}");
    }

    #[test]
    fn test_round_trip_statements() {
        round_trip(
            "<?for (i, x) in enumerate(xs)?><?if i?>,<?elif x?>-<?else?>.<?end if?><?print x?><?end for?>",
            CompileOptions::new(),
        );
        round_trip(
            "<?code n = 1?><?code n += 2?><?code n //= 2?><?printx n?><?code f(*a, **b)?>",
            CompileOptions::new(),
        );
    }

    #[test]
    fn test_round_trip_expressions() {
        round_trip(
            "<?print [x*2 for x in y if x > 1]?><?print {k: v for (k, v) in d.items()}?>\
             <?print (x for x in y)?><?print s[1:-1]?><?print s[:2]?><?print not a and -b?>\
             <?print x.foo(1, key=2)?><?print {'a': 1}['a']?>",
            CompileOptions::new(),
        );
    }

    #[test]
    fn test_round_trip_nested_def_keeps_whitespace_mode() {
        round_trip(
            "<?def greet(name, greeting='Hello')?>\n  <?print greeting?>, <?print name?>!\n<?end def?>\n<?print greet.renders(name='x')?>",
            CompileOptions::new().name("outer").keepws(false),
        );
        round_trip(
            "{{def f}}\n  text\n{{end def}}",
            CompileOptions::new().delimiters("{{", "}}").keepws(true),
        );
    }

    #[test]
    fn test_nested_template_shares_source() {
        let template = compile("<?def f?>x<?end def?>", &CompileOptions::new()).unwrap();
        let dump = encode_template(&template).unwrap();
        assert_eq!(dump.matches("s\"<?def f?>x<?end def?>\"").count(), 1);
    }

    #[test]
    fn test_version_mismatch() {
        let template = compile("x", &CompileOptions::new()).unwrap();
        let dump = encode_template(&template).unwrap().replacen("i24", "i23", 1);
        assert_eq!(
            decode_template(&dump),
            Err(CodecError::Version {
                expected: 24,
                found: 23
            })
        );
    }

    #[test]
    fn test_location_out_of_range() {
        let dump = "(template i24 n s\"ab\" T s\"<?\" s\"?>\" n n [ (text (location n i0 i9 i0 i9 ) ) ] n )";
        assert!(matches!(decode_template(dump), Err(CodecError::Malformed { .. })));
    }
}
