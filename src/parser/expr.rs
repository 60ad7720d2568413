//! Builds expression and statement ASTs from the code inside a tag.
//!
//! The grammar lives in `ul4.pest`. Pest spans are relative to the tag's
//! code, so every span is shifted by the code's offset into the template
//! source before it is stored.

use chrono::{NaiveDate, NaiveDateTime};
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use crate::ast::color::Color;
use crate::ast::expr::*;
use crate::ast::location::{Location, Span, Spanned};
use crate::ast::template::{NodeKind, Param};
use crate::ast::value::Value;
use crate::error::ParseError;
use crate::eval::ops;

#[derive(Parser)]
#[grammar = "parser/ul4.pest"]
struct Ul4Parser;

/// Parse the code of `location` as an expression.
pub fn parse_expression(location: &Location) -> Result<Expr, ParseError> {
    let builder = Builder::new(location);
    let pair = builder.parse(Rule::expression_tag, "expression")?;
    builder.expr(pair.into_inner().next().unwrap())
}

/// Parse the code of a `code` tag.
pub fn parse_statement(location: &Location) -> Result<NodeKind, ParseError> {
    let builder = Builder::new(location);
    let pair = builder.parse(Rule::statement_tag, "statement")?;
    let stmt = pair.into_inner().next().unwrap();
    let inner = stmt.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::assign => {
            let mut parts = inner.into_inner();
            let target = builder.target(parts.next().unwrap());
            let value = builder.expr(parts.next().unwrap())?;
            Ok(NodeKind::Store { target, value })
        }
        Rule::aug_assign => {
            let mut parts = inner.into_inner();
            let name = parts.next().unwrap().as_str().to_string();
            let op_pair = parts.next().unwrap();
            let op = AssignOp::from_symbol(op_pair.as_str())
                .ok_or_else(|| builder.error(&op_pair, "unknown assignment operator"))?;
            let value = builder.expr(parts.next().unwrap())?;
            Ok(NodeKind::Modify { op, name, value })
        }
        _ => Ok(NodeKind::Expr(builder.expr(inner)?)),
    }
}

/// Parse the code of a `for` tag: `target in container`.
pub fn parse_for(location: &Location) -> Result<(Target, Expr), ParseError> {
    let builder = Builder::new(location);
    let pair = builder.parse(Rule::for_tag, "loop header")?;
    let mut inner = pair.into_inner();
    let target = builder.target(inner.next().unwrap());
    let _in = inner.next();
    let container = builder.expr(inner.next().unwrap())?;
    Ok((target, container))
}

/// Parse the code of a `def` tag: `name` or `name(param, param=default)`.
pub fn parse_def(location: &Location) -> Result<(String, Option<Vec<Param>>), ParseError> {
    let builder = Builder::new(location);
    let pair = builder.parse(Rule::def_tag, "template name")?;
    let mut inner = pair.into_inner();
    let name = inner.next().unwrap().as_str().to_string();
    let params = match inner.next() {
        Some(list) if list.as_rule() == Rule::param_list => {
            let mut params: Vec<Param> = Vec::new();
            for param in list.into_inner() {
                let span_pair = param.clone();
                let mut parts = param.into_inner();
                let name = parts.next().unwrap().as_str().to_string();
                if params.iter().any(|p| p.name == name) {
                    return Err(builder.error(&span_pair, format!("duplicate parameter {name:?}")));
                }
                let default = parts.next().map(|e| builder.expr(e)).transpose()?;
                if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                    return Err(builder.error(
                        &span_pair,
                        "parameter without default follows parameter with default",
                    ));
                }
                params.push(Param { name, default });
            }
            Some(params)
        }
        _ => None,
    };
    Ok((name, params))
}

struct Builder<'l> {
    location: &'l Location,
    offset: usize,
}

impl<'l> Builder<'l> {
    fn new(location: &'l Location) -> Self {
        Self {
            location,
            offset: location.code_span().start,
        }
    }

    fn parse(&self, rule: Rule, what: &str) -> Result<Pair<'l, Rule>, ParseError> {
        let code = self.location.code();
        if code.is_empty() {
            return Err(ParseError::syntax(format!("{what} required"))
                .with_location(self.location.clone()));
        }
        let mut pairs = Ul4Parser::parse(rule, code).map_err(|e| {
            let pos = match e.location {
                pest::error::InputLocation::Pos(p) => p,
                pest::error::InputLocation::Span((s, _)) => s,
            };
            ParseError::syntax(format!("invalid {what}: {}", e.variant.message()))
                .with_location(self.location.clone())
                .with_offset(self.offset + pos)
        })?;
        Ok(pairs.next().unwrap())
    }

    fn span(&self, pair: &Pair<Rule>) -> Span {
        let s = pair.as_span();
        Span::new(self.offset + s.start(), self.offset + s.end())
    }

    fn error(&self, pair: &Pair<Rule>, message: impl Into<String>) -> ParseError {
        ParseError::syntax(message)
            .with_location(self.location.clone())
            .with_offset(self.offset + pair.as_span().start())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn expr(&self, pair: Pair<Rule>) -> Result<Expr, ParseError> {
        match pair.as_rule() {
            Rule::expr | Rule::slice_start | Rule::slice_stop => {
                self.expr(pair.into_inner().next().unwrap())
            }
            Rule::or_expr
            | Rule::and_expr
            | Rule::contain_expr
            | Rule::cmp_expr
            | Rule::add_expr
            | Rule::mul_expr => self.chain(pair),
            Rule::not_expr | Rule::neg_expr => self.unary(pair),
            Rule::postfix_expr => self.postfix(pair),
            Rule::atom => self.atom(pair.into_inner().next().unwrap()),
            rule => Err(self.error(&pair, format!("unexpected {rule:?} in expression"))),
        }
    }

    /// Left-associative chain of binary operators.
    fn chain(&self, pair: Pair<Rule>) -> Result<Expr, ParseError> {
        let mut inner = pair.into_inner();
        let mut left = self.expr(inner.next().unwrap())?;
        while let Some(op_pair) = inner.next() {
            let op = binop(&op_pair);
            let right = self.expr(inner.next().unwrap())?;
            left = fold_binary(left, op, right);
        }
        Ok(left)
    }

    fn unary(&self, pair: Pair<Rule>) -> Result<Expr, ParseError> {
        let span = self.span(&pair);
        let mut inner = pair.into_inner();
        let first = inner.next().unwrap();
        let op = match first.as_rule() {
            Rule::kw_not => UnaryOp::Not,
            Rule::neg_op => UnaryOp::Neg,
            _ => return self.expr(first),
        };
        let operand = self.expr(inner.next().unwrap())?;
        Ok(fold_unary(op, operand, span))
    }

    fn postfix(&self, pair: Pair<Rule>) -> Result<Expr, ParseError> {
        let mut inner = pair.into_inner();
        let mut expr = self.expr(inner.next().unwrap())?;
        for post in inner {
            let op = post.into_inner().next().unwrap();
            let span = Span::new(expr.span.start, self.offset + op.as_span().end());
            expr = match op.as_rule() {
                Rule::attr_call => {
                    let mut parts = op.into_inner();
                    let method = parts.next().unwrap().as_str().to_string();
                    let args = match parts.next() {
                        Some(args) => self.call_args(args)?,
                        None => CallArgs::default(),
                    };
                    Spanned::new(
                        ExprKind::CallMeth {
                            obj: Box::new(expr),
                            method,
                            args,
                        },
                        span,
                    )
                }
                Rule::attr => {
                    let attr = op.into_inner().next().unwrap().as_str().to_string();
                    Spanned::new(
                        ExprKind::GetAttr {
                            obj: Box::new(expr),
                            attr,
                        },
                        span,
                    )
                }
                Rule::index => {
                    let index = op.into_inner().next().unwrap();
                    if index.as_rule() == Rule::slice {
                        let mut start = None;
                        let mut stop = None;
                        for bound in index.into_inner() {
                            let built = Box::new(self.expr(bound.clone())?);
                            if bound.as_rule() == Rule::slice_start {
                                start = Some(built);
                            } else {
                                stop = Some(built);
                            }
                        }
                        Spanned::new(
                            ExprKind::GetSlice {
                                obj: Box::new(expr),
                                start,
                                stop,
                            },
                            span,
                        )
                    } else {
                        let index = self.expr(index)?;
                        fold_getitem(expr, index, span)
                    }
                }
                _ => {
                    let args = match op.into_inner().next() {
                        Some(args) => self.call_args(args)?,
                        None => CallArgs::default(),
                    };
                    Spanned::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    )
                }
            };
        }
        Ok(expr)
    }

    fn call_args(&self, pair: Pair<Rule>) -> Result<CallArgs, ParseError> {
        let mut args = CallArgs::default();
        for item in pair.into_inner() {
            if item.as_rule() == Rule::comprehension {
                let span = self.span(&item);
                let comp = self.comprehension(item)?;
                args.positional
                    .push(Spanned::new(ExprKind::GenExpr(Box::new(comp)), span));
                continue;
            }
            let arg = item.into_inner().next().unwrap();
            match arg.as_rule() {
                Rule::star_star_arg => {
                    if args.rest_keyword.is_some() {
                        return Err(self.error(&arg, "duplicate ** argument"));
                    }
                    let value = self.expr(arg.into_inner().next().unwrap())?;
                    args.rest_keyword = Some(Box::new(value));
                }
                Rule::star_arg => {
                    if args.rest.is_some() {
                        return Err(self.error(&arg, "duplicate * argument"));
                    }
                    let value = self.expr(arg.into_inner().next().unwrap())?;
                    args.rest = Some(Box::new(value));
                }
                Rule::kw_arg => {
                    let span_pair = arg.clone();
                    let mut parts = arg.into_inner();
                    let name = parts.next().unwrap().as_str().to_string();
                    if args.keyword.iter().any(|(n, _)| *n == name) {
                        return Err(
                            self.error(&span_pair, format!("duplicate keyword argument {name:?}"))
                        );
                    }
                    let value = self.expr(parts.next().unwrap())?;
                    args.keyword.push((name, value));
                }
                _ => {
                    if !args.keyword.is_empty() || args.rest_keyword.is_some() {
                        return Err(
                            self.error(&arg, "positional argument follows keyword argument")
                        );
                    }
                    args.positional.push(self.expr(arg)?);
                }
            }
        }
        Ok(args)
    }

    /// `item for target in container [if condition]`
    fn comprehension(&self, pair: Pair<Rule>) -> Result<Comprehension, ParseError> {
        let mut parts = pair.into_inner().filter(|p| !is_keyword(p));
        let item = self.expr(parts.next().unwrap())?;
        let target = self.target(parts.next().unwrap());
        let container = self.expr(parts.next().unwrap())?;
        let condition = parts.next().map(|c| self.expr(c)).transpose()?;
        Ok(Comprehension {
            item,
            target,
            container,
            condition,
        })
    }

    fn target(&self, pair: Pair<Rule>) -> Target {
        let mut items = Vec::new();
        let mut trailing_comma = false;
        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::target_item => {
                    let inner = part.into_inner().next().unwrap();
                    items.push(match inner.as_rule() {
                        Rule::name => Target::Name(inner.as_str().to_string()),
                        _ => self.target(inner),
                    });
                }
                Rule::trailing_comma => trailing_comma = true,
                _ => {}
            }
        }
        if items.len() == 1 && !trailing_comma {
            items.remove(0)
        } else {
            Target::Unpack(items)
        }
    }

    // ── Atoms ───────────────────────────────────────────────────────────

    fn atom(&self, pair: Pair<Rule>) -> Result<Expr, ParseError> {
        let span = self.span(&pair);
        let constant = |value: Value| Ok(Spanned::new(ExprKind::Const(value), span));
        match pair.as_rule() {
            Rule::none_lit => constant(Value::None),
            Rule::true_lit => constant(Value::Bool(true)),
            Rule::false_lit => constant(Value::Bool(false)),
            Rule::int => constant(Value::Int(self.int(&pair)?)),
            Rule::float => {
                let f: f64 = pair
                    .as_str()
                    .parse()
                    .map_err(|_| self.error(&pair, format!("invalid float {}", pair.as_str())))?;
                constant(Value::Float(f))
            }
            Rule::string => constant(Value::Str(self.string(&pair)?)),
            Rule::date => constant(Value::Date(self.date(&pair)?)),
            Rule::color => {
                let color = Color::parse(pair.as_str())
                    .ok_or_else(|| self.error(&pair, format!("invalid color {}", pair.as_str())))?;
                constant(Value::Color(color))
            }
            Rule::name => Ok(Spanned::new(ExprKind::Var(pair.as_str().to_string()), span)),
            Rule::list => {
                let items = pair
                    .into_inner()
                    .map(|p| self.expr(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Spanned::new(ExprKind::List(items), span))
            }
            Rule::listcomp => {
                let comp = self.comprehension(pair.into_inner().next().unwrap())?;
                Ok(Spanned::new(ExprKind::ListComp(Box::new(comp)), span))
            }
            Rule::genexpr => {
                let comp = self.comprehension(pair.into_inner().next().unwrap())?;
                Ok(Spanned::new(ExprKind::GenExpr(Box::new(comp)), span))
            }
            Rule::dict => {
                let mut items = Vec::new();
                for item in pair.into_inner() {
                    let mut kv = item.into_inner();
                    let key = self.expr(kv.next().unwrap())?;
                    let value = self.expr(kv.next().unwrap())?;
                    items.push((key, value));
                }
                Ok(Spanned::new(ExprKind::Dict(items), span))
            }
            Rule::dictcomp => {
                let mut parts = pair.into_inner().filter(|p| !is_keyword(p));
                let key = self.expr(parts.next().unwrap())?;
                let value = self.expr(parts.next().unwrap())?;
                let target = self.target(parts.next().unwrap());
                let container = self.expr(parts.next().unwrap())?;
                let condition = parts.next().map(|c| self.expr(c)).transpose()?;
                let comp = DictComprehension {
                    key,
                    value,
                    target,
                    container,
                    condition,
                };
                Ok(Spanned::new(ExprKind::DictComp(Box::new(comp)), span))
            }
            Rule::paren => {
                let mut inner = self.expr(pair.into_inner().next().unwrap())?;
                inner.span = span;
                Ok(inner)
            }
            rule => Err(self.error(&pair, format!("unexpected {rule:?} in atom position"))),
        }
    }

    fn int(&self, pair: &Pair<Rule>) -> Result<i64, ParseError> {
        let text = pair.as_str();
        let lower = text.to_ascii_lowercase();
        let (digits, radix) = if let Some(d) = lower.strip_prefix("0x") {
            (d, 16)
        } else if let Some(d) = lower.strip_prefix("0o") {
            (d, 8)
        } else if let Some(d) = lower.strip_prefix("0b") {
            (d, 2)
        } else {
            (lower.as_str(), 10)
        };
        i64::from_str_radix(digits, radix)
            .map_err(|_| self.error(pair, format!("integer literal {text} is too large")))
    }

    fn string(&self, pair: &Pair<Rule>) -> Result<String, ParseError> {
        let raw = pair.as_str();
        let body = &raw[1..raw.len() - 1];
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            let Some(escape) = chars.next() else {
                out.push('\\');
                break;
            };
            let width = match escape {
                'n' => {
                    out.push('\n');
                    continue;
                }
                't' => {
                    out.push('\t');
                    continue;
                }
                'r' => {
                    out.push('\r');
                    continue;
                }
                '\\' | '\'' | '"' => {
                    out.push(escape);
                    continue;
                }
                'a' => {
                    out.push('\x07');
                    continue;
                }
                'b' => {
                    out.push('\x08');
                    continue;
                }
                'f' => {
                    out.push('\x0c');
                    continue;
                }
                'v' => {
                    out.push('\x0b');
                    continue;
                }
                '0' => {
                    out.push('\0');
                    continue;
                }
                'x' => 2,
                'u' => 4,
                'U' => 8,
                other => {
                    out.push('\\');
                    out.push(other);
                    continue;
                }
            };
            let hex: String = chars.by_ref().take(width).collect();
            let decoded = (hex.len() == width)
                .then(|| u32::from_str_radix(&hex, 16).ok())
                .flatten()
                .and_then(char::from_u32)
                .ok_or_else(|| self.error(pair, format!("invalid escape \\{escape}{hex}")))?;
            out.push(decoded);
        }
        Ok(out)
    }

    fn date(&self, pair: &Pair<Rule>) -> Result<NaiveDateTime, ParseError> {
        let raw = pair.as_str();
        let text = raw[2..raw.len() - 1].trim_end_matches('T');
        parse_date(text).ok_or_else(|| self.error(pair, format!("invalid date {raw}")))
    }
}

/// Parse `YYYY-MM-DD` optionally followed by `THH:MM`, `THH:MM:SS` or
/// `THH:MM:SS.ffffff`.
pub(crate) fn parse_date(text: &str) -> Option<NaiveDateTime> {
    if !text.contains('T') {
        return NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

fn is_keyword(pair: &Pair<Rule>) -> bool {
    matches!(
        pair.as_rule(),
        Rule::kw_for | Rule::kw_in | Rule::kw_if | Rule::kw_not | Rule::kw_and | Rule::kw_or
    )
}

fn binop(pair: &Pair<Rule>) -> BinOp {
    match pair.as_rule() {
        Rule::kw_or => BinOp::Or,
        Rule::kw_and => BinOp::And,
        Rule::contain_op => {
            if pair.clone().into_inner().count() == 2 {
                BinOp::NotContains
            } else {
                BinOp::Contains
            }
        }
        _ => match pair.as_str() {
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "//" => BinOp::FloorDiv,
            "/" => BinOp::TrueDiv,
            "%" => BinOp::Mod,
            s => unreachable!("unknown operator: {s}"),
        },
    }
}

// ── Constant folding ────────────────────────────────────────────────────

fn as_const(expr: &Expr) -> Option<&Value> {
    match &expr.node {
        ExprKind::Const(v) => Some(v),
        _ => None,
    }
}

/// Keep a folded result only if it succeeded and is defined. Failures are
/// left for runtime so they're reported with a location.
fn folded(result: Result<Value, crate::EvalError>, span: Span) -> Option<Expr> {
    match result {
        Ok(v) if !v.is_undefined() => Some(Spanned::new(ExprKind::Const(v), span)),
        _ => None,
    }
}

fn fold_binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    let span = left.span.merge(right.span);
    if let (Some(l), Some(r)) = (as_const(&left), as_const(&right)) {
        let result = match op {
            BinOp::And => Ok(if l.is_truthy() { r.clone() } else { l.clone() }),
            BinOp::Or => Ok(if l.is_truthy() { l.clone() } else { r.clone() }),
            _ => ops::binary(op, l, r),
        };
        if let Some(expr) = folded(result, span) {
            return expr;
        }
    }
    Spanned::new(
        ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        },
        span,
    )
}

fn fold_unary(op: UnaryOp, operand: Expr, span: Span) -> Expr {
    if let Some(v) = as_const(&operand)
        && let Some(expr) = folded(ops::unary(op, v), span)
    {
        return expr;
    }
    Spanned::new(
        ExprKind::Unary {
            op,
            operand: Box::new(operand),
        },
        span,
    )
}

fn fold_getitem(obj: Expr, index: Expr, span: Span) -> Expr {
    if let (Some(o), Some(i)) = (as_const(&obj), as_const(&index))
        && let Some(expr) = folded(ops::getitem(o, i), span)
    {
        return expr;
    }
    Spanned::new(
        ExprKind::GetItem {
            obj: Box::new(obj),
            index: Box::new(index),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::location::TagKind;
    use std::sync::Arc;

    fn loc(code: &str) -> Location {
        let source = format!("<?print {code}?>");
        let len = source.len();
        Location::new(
            Arc::from(source),
            Some(TagKind::Print),
            Span::new(0, len),
            Span::new(8, 8 + code.len()),
        )
    }

    fn expr(code: &str) -> ExprKind {
        parse_expression(&loc(code)).expect("parse failed").node
    }

    #[test]
    fn test_constant_folding() {
        assert_eq!(expr("1 + 2"), ExprKind::Const(Value::Int(3)));
        assert_eq!(expr("-5"), ExprKind::Const(Value::Int(-5)));
        assert_eq!(expr("'ab' * 2"), ExprKind::Const(Value::from("abab")));
        assert_eq!(expr("not None"), ExprKind::Const(Value::Bool(true)));
        assert_eq!(expr("'abc'[1]"), ExprKind::Const(Value::from("b")));
    }

    #[test]
    fn test_failing_fold_is_left_for_runtime() {
        assert!(matches!(expr("1 // 0"), ExprKind::Binary { op: BinOp::FloorDiv, .. }));
        assert!(matches!(expr("[1][5]"), ExprKind::GetItem { .. }));
    }

    #[test]
    fn test_precedence() {
        let ExprKind::Binary { op, right, .. } = expr("a + b * c") else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.node, ExprKind::Binary { op: BinOp::Mul, .. }));

        let ExprKind::Unary { op, operand } = expr("not a in b") else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Not);
        assert!(matches!(operand.node, ExprKind::Binary { op: BinOp::Contains, .. }));
    }

    #[test]
    fn test_not_in() {
        assert!(matches!(expr("a not in b"), ExprKind::Binary { op: BinOp::NotContains, .. }));
    }

    #[test]
    fn test_literals() {
        assert_eq!(expr("0x1f"), ExprKind::Const(Value::Int(31)));
        assert_eq!(expr("0b101"), ExprKind::Const(Value::Int(5)));
        assert_eq!(expr("1.5"), ExprKind::Const(Value::Float(1.5)));
        assert_eq!(expr(r#""a\tb""#), ExprKind::Const(Value::from("a\tb")));
        assert_eq!(expr(r"'ä'"), ExprKind::Const(Value::from("ä")));
        assert_eq!(expr("#f00"), ExprKind::Const(Value::Color(Color::new(255, 0, 0, 255))));
        let ExprKind::Const(Value::Date(d)) = expr("@(2012-10-06T12:34)") else {
            panic!("expected date");
        };
        assert_eq!(d.to_string(), "2012-10-06 12:34:00");
    }

    #[test]
    fn test_call_arguments() {
        let ExprKind::Call { args, .. } = expr("f(1, x=2, *a, **b)") else {
            panic!("expected call");
        };
        assert_eq!(args.positional.len(), 1);
        assert_eq!(args.keyword[0].0, "x");
        assert!(args.rest.is_some());
        assert!(args.rest_keyword.is_some());
    }

    #[test]
    fn test_generator_argument() {
        let ExprKind::Call { args, .. } = expr("sum(x for x in y)") else {
            panic!("expected call");
        };
        assert!(matches!(args.positional[0].node, ExprKind::GenExpr(_)));
    }

    #[test]
    fn test_method_attr_slice() {
        assert!(matches!(expr("x.upper()"), ExprKind::CallMeth { .. }));
        assert!(matches!(expr("x.name"), ExprKind::GetAttr { .. }));
        let ExprKind::GetSlice { start, stop, .. } = expr("x[:2]") else {
            panic!("expected slice");
        };
        assert!(start.is_none());
        assert!(stop.is_some());
    }

    #[test]
    fn test_comprehensions() {
        assert!(matches!(expr("[x for x in y if x]"), ExprKind::ListComp(_)));
        assert!(matches!(expr("{x: 1 for x in y}"), ExprKind::DictComp(_)));
        assert!(matches!(expr("{1: 2}"), ExprKind::Dict(_)));
        let ExprKind::ListComp(comp) = expr("[a for (a, b) in y]") else {
            panic!("expected listcomp");
        };
        assert_eq!(
            comp.target,
            Target::Unpack(vec![Target::Name("a".into()), Target::Name("b".into())])
        );
    }

    #[test]
    fn test_spans_are_absolute() {
        let e = parse_expression(&loc("x + y")).unwrap();
        assert_eq!(e.span, Span::new(8, 13));
    }

    #[test]
    fn test_syntax_error_has_offset() {
        let err = parse_expression(&loc("1 +")).unwrap_err();
        assert!(err.message.starts_with("invalid expression"));
        assert!(err.offset.is_some());
    }

    #[test]
    fn test_statements() {
        let code = |c: &str| {
            let mut l = loc(c);
            l = Location::new(
                Arc::from(l.source()),
                Some(TagKind::Code),
                l.tag_span(),
                l.code_span(),
            );
            parse_statement(&l).expect("parse failed")
        };
        assert!(matches!(code("x = 1"), NodeKind::Store { .. }));
        assert!(matches!(code("x //= 2"), NodeKind::Modify { op: AssignOp::FloorDiv, .. }));
        assert!(matches!(code("x == 1"), NodeKind::Expr(_)));
        let NodeKind::Store { target, .. } = code("a, (b, c) = x") else {
            panic!("expected store");
        };
        assert_eq!(
            target,
            Target::Unpack(vec![
                Target::Name("a".into()),
                Target::Unpack(vec![Target::Name("b".into()), Target::Name("c".into())]),
            ])
        );
    }

    #[test]
    fn test_def_header() {
        let (name, params) = parse_def(&loc("f(a, b=2)")).unwrap();
        assert_eq!(name, "f");
        let params = params.unwrap();
        assert_eq!(params[0].name, "a");
        assert!(params[1].default.is_some());
        assert_eq!(parse_def(&loc("g")).unwrap().1, None);
        assert!(parse_def(&loc("h(a=1, b)")).is_err());
    }
}
