//! Indented pseudo-code listing of a template, via `Display for Template`.
//!
//! ```text
//! def page {
//!     for item in items {
//!         print item.name
//!     }
//! }
//! ```

use std::fmt::{self, Write};

use super::expr::{Expr, Target};
use super::template::{Block, NodeKind, Template};
use super::value::repr_str;

struct Listing<'a> {
    source: &'a str,
    indent: usize,
    out: String,
}

impl<'a> Listing<'a> {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn code(&self, expr: &Expr) -> &'a str {
        self.source.get(expr.span.start..expr.span.end).unwrap_or("?")
    }

    fn template(&mut self, template: &Template) {
        let mut head = String::from("def ");
        head.push_str(template.name.as_deref().unwrap_or("unnamed"));
        if let Some(params) = &template.params {
            let names: Vec<String> = params
                .iter()
                .map(|p| match &p.default {
                    Some(default) => format!("{}={}", p.name, self.code(default)),
                    None => p.name.clone(),
                })
                .collect();
            let _ = write!(head, "({})", names.join(", "));
        }
        head.push_str(" {");
        self.line(&head);
        self.block(&template.body);
        self.line("}");
    }

    fn block(&mut self, block: &Block) {
        self.indent += 1;
        for node in &block.nodes {
            match &node.kind {
                NodeKind::Text(text) => self.line(&format!("text {}", repr_str(text))),
                NodeKind::Print(e) => self.line(&format!("print {}", self.code(e))),
                NodeKind::PrintX(e) => self.line(&format!("printx {}", self.code(e))),
                NodeKind::Return(e) => self.line(&format!("return {}", self.code(e))),
                NodeKind::Expr(e) => self.line(self.code(e)),
                NodeKind::Store { target, value } => {
                    self.line(&format!("{} = {}", target_code(target), self.code(value)))
                }
                NodeKind::Modify { op, name, value } => {
                    self.line(&format!("{name} {} {}", op.symbol(), self.code(value)))
                }
                NodeKind::If(chain) => {
                    for (i, branch) in chain.branches.iter().enumerate() {
                        let keyword = branch.kind.tag();
                        let head = match &branch.condition {
                            Some(cond) => format!("{keyword} {} {{", self.code(cond)),
                            None => format!("{keyword} {{"),
                        };
                        if i == 0 {
                            self.line(&head);
                        } else {
                            self.line(&format!("}} {head}"));
                        }
                        self.block(&branch.body);
                    }
                    self.line("}");
                }
                NodeKind::For(f) => {
                    self.line(&format!(
                        "for {} in {} {{",
                        target_code(&f.target),
                        self.code(&f.container)
                    ));
                    self.block(&f.body);
                    self.line("}");
                }
                NodeKind::Break => self.line("break"),
                NodeKind::Continue => self.line("continue"),
                NodeKind::Def(template) => self.template(template),
            }
        }
        self.indent -= 1;
    }
}

fn target_code(target: &Target) -> String {
    match target {
        Target::Name(name) => name.clone(),
        Target::Unpack(items) if items.len() == 1 => format!("({},)", target_code(&items[0])),
        Target::Unpack(items) => {
            let parts: Vec<String> = items.iter().map(target_code).collect();
            format!("({})", parts.join(", "))
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut listing = Listing {
            source: &self.source,
            indent: 0,
            out: String::new(),
        };
        listing.template(self);
        f.write_str(listing.out.trim_end_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use crate::{CompileOptions, Template};

    fn listing(source: &str) -> String {
        Template::compile(source, CompileOptions::new().name("page"))
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_loop_listing() {
        assert_eq!(
            listing("<?for (k, v) in d.items()?><?print k?><?end for?>"),
            "def page {\n    for (k, v) in d.items() {\n        print k\n    }\n}"
        );
    }

    #[test]
    fn test_branches_and_nested_def() {
        let out = listing("<?if x?>a<?else?><?code n += 1?><?end if?><?def f(a, b=2)?><?return a?><?end def?>");
        assert_eq!(
            out,
            "def page {\n    if x {\n        text 'a'\n    } else {\n        n += 1\n    }\n    \
             def f(a, b=2) {\n        return a\n    }\n}"
        );
    }
}
