//! Template compiler.
//!
//! Compilation happens in two steps. The [`tokenizer`] splits the source
//! into text runs and tags, then [`compile`] walks the tags with a stack of
//! open blocks (`if`, `for` and `def`), parsing each tag's code with the
//! pest grammar in `ul4.pest` (see [`expr`]).

pub mod expr;
pub mod tokenizer;

use std::sync::Arc;

use crate::ast::location::{Location, TagKind};
use crate::ast::template::*;
use crate::error::ParseError;
use crate::options::CompileOptions;

pub use tokenizer::{strip_linefeeds, tokenize};

/// Compile template source into a [`Template`] AST.
///
/// Every error carries the location of the offending tag and the name of
/// the template being compiled.
pub fn compile(source: &str, options: &CompileOptions) -> Result<Template, ParseError> {
    let template = build(Arc::from(source), options)
        .map_err(|e| e.with_template(options.name.as_deref()))?;
    tracing::debug!(
        name = ?template.name,
        nodes = template.body.nodes.len(),
        "compiled template"
    );
    Ok(template)
}

/// A block that has been opened by a tag and not yet closed.
enum Open {
    /// The top level template or a `<?def?>`.
    Template(Template),
    If {
        done: Vec<Branch>,
        current: Branch,
    },
    For {
        location: Location,
        target: crate::ast::Target,
        container: crate::ast::Expr,
        nodes: Vec<Node>,
    },
}

impl Open {
    fn nodes_mut(&mut self) -> &mut Vec<Node> {
        match self {
            Open::Template(t) => &mut t.body.nodes,
            Open::If { current, .. } => &mut current.body.nodes,
            Open::For { nodes, .. } => nodes,
        }
    }

    fn location(&self) -> Option<&Location> {
        match self {
            Open::Template(t) => t.location.as_ref(),
            Open::If { done, current } => Some(&done.first().unwrap_or(current).location),
            Open::For { location, .. } => Some(location),
        }
    }

    /// Turn the finished block into a node of its parent.
    fn close(self, end: Location) -> Node {
        match self {
            Open::Template(mut t) => {
                t.body.end = Some(end.clone());
                let location = t.location.clone().unwrap_or(end);
                Node::new(NodeKind::Def(Arc::new(t)), location)
            }
            Open::If { mut done, mut current } => {
                current.body.end = Some(end);
                done.push(current);
                let location = done[0].location.clone();
                Node::new(NodeKind::If(IfBlock { branches: done }), location)
            }
            Open::For {
                location,
                target,
                container,
                nodes,
            } => Node::new(
                NodeKind::For(ForBlock {
                    target,
                    container,
                    body: Block {
                        nodes,
                        end: Some(end),
                    },
                }),
                location,
            ),
        }
    }
}

fn build(source: Arc<str>, options: &CompileOptions) -> Result<Template, ParseError> {
    let tokens = tokenize(&source, &options.startdelim, &options.enddelim)?;
    let root = Template {
        name: options.name.clone(),
        source: Arc::clone(&source),
        keepws: options.keepws,
        startdelim: options.startdelim.clone(),
        enddelim: options.enddelim.clone(),
        params: None,
        location: None,
        body: Block::default(),
    };
    let mut stack = vec![Open::Template(root)];

    for location in tokens {
        let Some(kind) = location.kind() else {
            let text = if options.keepws {
                location.code().to_string()
            } else {
                strip_linefeeds(location.code())
            };
            if !text.is_empty() {
                push(&mut stack, Node::new(NodeKind::Text(text), location));
            }
            continue;
        };

        match kind {
            TagKind::Print => {
                let e = expr::parse_expression(&location)?;
                push(&mut stack, Node::new(NodeKind::Print(e), location));
            }
            TagKind::PrintX => {
                let e = expr::parse_expression(&location)?;
                push(&mut stack, Node::new(NodeKind::PrintX(e), location));
            }
            TagKind::Return => {
                let e = expr::parse_expression(&location)?;
                push(&mut stack, Node::new(NodeKind::Return(e), location));
            }
            TagKind::Code => {
                let node = expr::parse_statement(&location)?;
                push(&mut stack, Node::new(node, location));
            }
            TagKind::If => {
                let condition = expr::parse_expression(&location)?;
                stack.push(Open::If {
                    done: Vec::new(),
                    current: branch(BranchKind::If, Some(condition), location),
                });
            }
            TagKind::ElIf => {
                let Some(Open::If { done, current }) = stack.last_mut() else {
                    return Err(structural("elif doesn't match any if", location));
                };
                if current.kind == BranchKind::Else {
                    return Err(structural("else already seen in if", location));
                }
                let condition = expr::parse_expression(&location)?;
                let next = branch(BranchKind::ElIf, Some(condition), location.clone());
                let mut finished = std::mem::replace(current, next);
                finished.body.end = Some(location);
                done.push(finished);
            }
            TagKind::Else => {
                let Some(Open::If { done, current }) = stack.last_mut() else {
                    return Err(structural("else doesn't match any if", location));
                };
                if current.kind == BranchKind::Else {
                    return Err(structural("else already seen in if", location));
                }
                let next = branch(BranchKind::Else, None, location.clone());
                let mut finished = std::mem::replace(current, next);
                finished.body.end = Some(location);
                done.push(finished);
            }
            TagKind::For => {
                let (target, container) = expr::parse_for(&location)?;
                stack.push(Open::For {
                    location,
                    target,
                    container,
                    nodes: Vec::new(),
                });
            }
            TagKind::Break | TagKind::Continue => {
                let in_loop = stack
                    .iter()
                    .rev()
                    .take_while(|open| !matches!(open, Open::Template(_)))
                    .any(|open| matches!(open, Open::For { .. }));
                if !in_loop {
                    let message = format!("{} outside of for loop", kind.keyword());
                    return Err(structural(message, location));
                }
                let node = if kind == TagKind::Break {
                    NodeKind::Break
                } else {
                    NodeKind::Continue
                };
                push(&mut stack, Node::new(node, location));
            }
            TagKind::Def => {
                let (name, params) = expr::parse_def(&location)?;
                stack.push(Open::Template(Template {
                    name: Some(name),
                    source: Arc::clone(&source),
                    keepws: options.keepws,
                    startdelim: options.startdelim.clone(),
                    enddelim: options.enddelim.clone(),
                    params,
                    location: Some(location),
                    body: Block::default(),
                }));
            }
            TagKind::End => {
                if stack.len() <= 1 {
                    return Err(structural("not in any block", location));
                }
                let matches = match (location.code(), stack.last()) {
                    ("", Some(Open::If { .. } | Open::For { .. })) => Ok(()),
                    ("", _) => Err("def must be closed with <?end def?>"),
                    ("if", Some(Open::If { .. })) => Ok(()),
                    ("if", _) => Err("endif doesn't match any if"),
                    ("for", Some(Open::For { .. })) => Ok(()),
                    ("for", _) => Err("endfor doesn't match any for"),
                    ("def", Some(Open::Template(_))) => Ok(()),
                    ("def", _) => Err("enddef doesn't match any def"),
                    (other, _) => {
                        let message = format!("illegal end value {other:?}");
                        return Err(structural(message, location.clone()));
                    }
                };
                matches.map_err(|message| structural(message, location.clone()))?;
                if let Some(open) = stack.pop() {
                    push(&mut stack, open.close(location));
                }
            }
            TagKind::Note => {}
        }
    }

    if stack.len() > 1 {
        let innermost = stack.last().and_then(Open::location).cloned();
        let mut err = ParseError::structural("block unclosed");
        if let Some(location) = innermost {
            err = err.with_location(location);
        }
        return Err(err);
    }

    match stack.pop() {
        Some(Open::Template(t)) => Ok(t),
        _ => Err(ParseError::structural("block unclosed")),
    }
}

fn push(stack: &mut [Open], node: Node) {
    if let Some(open) = stack.last_mut() {
        open.nodes_mut().push(node);
    }
}

fn branch(kind: BranchKind, condition: Option<crate::ast::Expr>, location: Location) -> Branch {
    Branch {
        kind,
        condition,
        location,
        body: Block::default(),
    }
}

fn structural(message: impl Into<String>, location: Location) -> ParseError {
    ParseError::structural(message).with_location(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;

    fn compile_src(source: &str) -> Result<Template, ParseError> {
        compile(source, &CompileOptions::new().name("t"))
    }

    fn message(source: &str) -> String {
        compile_src(source).expect_err("should fail").message
    }

    #[test]
    fn test_text_and_print() {
        let t = compile_src("Hello <?print name?>!").unwrap();
        assert_eq!(t.body.nodes.len(), 3);
        assert!(matches!(t.body.nodes[1].kind, NodeKind::Print(_)));
        assert_eq!(t.name.as_deref(), Some("t"));
    }

    #[test]
    fn test_if_chain() {
        let t = compile_src("<?if a?>A<?elif b?>B<?else?>C<?end if?>").unwrap();
        let NodeKind::If(chain) = &t.body.nodes[0].kind else {
            panic!("expected if");
        };
        let kinds: Vec<BranchKind> = chain.branches.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BranchKind::If, BranchKind::ElIf, BranchKind::Else]);
        assert!(chain.branches[2].condition.is_none());
        assert_eq!(chain.branches[2].body.end.as_ref().unwrap().code(), "if");
    }

    #[test]
    fn test_nested_def_shares_source() {
        let t = compile_src("<?def f(n)?><?return n?><?end def?>").unwrap();
        let NodeKind::Def(sub) = &t.body.nodes[0].kind else {
            panic!("expected def");
        };
        assert_eq!(sub.name.as_deref(), Some("f"));
        assert!(Arc::ptr_eq(&sub.source, &t.source));
        assert_eq!(sub.params.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_keepws_false_strips_linefeeds() {
        let options = CompileOptions::new().keepws(false);
        let t = compile("<?for x in y?>\n  <?print x?>\n<?end for?>\n", &options).unwrap();
        let NodeKind::For(f) = &t.body.nodes[0].kind else {
            panic!("expected for");
        };
        assert_eq!(f.body.nodes.len(), 1);
        assert_eq!(t.body.nodes.len(), 1);
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(message("<?elif x?>"), "elif doesn't match any if");
        assert_eq!(message("<?else?>"), "else doesn't match any if");
        assert_eq!(message("<?if x?><?else?><?else?><?end if?>"), "else already seen in if");
        assert_eq!(message("<?if x?><?else?><?elif y?><?end if?>"), "else already seen in if");
        assert_eq!(message("<?end?>"), "not in any block");
        assert_eq!(message("<?if x?><?end for?>"), "endfor doesn't match any for");
        assert_eq!(message("<?for x in y?><?end if?>"), "endif doesn't match any if");
        assert_eq!(message("<?if x?><?end def?>"), "enddef doesn't match any def");
        assert_eq!(message("<?if x?><?end while?>"), "illegal end value \"while\"");
        assert_eq!(message("<?def f?><?end?>"), "def must be closed with <?end def?>");
        assert_eq!(message("<?if x?>"), "block unclosed");
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(message("<?break?>"), "break outside of for loop");
        assert_eq!(message("<?if x?><?continue?><?end if?>"), "continue outside of for loop");
        assert_eq!(
            message("<?for x in y?><?def f?><?break?><?end def?><?end for?>"),
            "break outside of for loop"
        );
        assert!(compile_src("<?for x in y?><?if x?><?break?><?end if?><?end for?>").is_ok());
    }

    #[test]
    fn test_error_carries_location_and_template() {
        let err = compile_src("abc<?if x?>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Structural);
        assert_eq!(err.template.as_deref(), Some("t"));
        assert_eq!(err.location.unwrap().tag(), "<?if x?>");

        let err = compile_src("<?print 1 +?>").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Syntax);
    }

    #[test]
    fn test_note_is_ignored() {
        let t = compile_src("a<?note anything?>b").unwrap();
        assert_eq!(t.body.nodes.len(), 2);
    }
}
