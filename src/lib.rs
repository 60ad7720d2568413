//! # ul4
//!
//! A template language for generating text. Templates mix literal text with
//! tags such as `<?print x?>`, `<?if?>`, `<?for?>` and `<?def?>`; rendering
//! evaluates the tags against host supplied variables.
//!
//! The crate is split into layers:
//!
//! - **Compiling** turns source into an immutable [`Template`] AST. Constant
//!   subexpressions are folded while parsing.
//! - **Rendering** runs a template lazily: [`Template::render`] returns a
//!   [`Render`] iterator over output fragments.
//! - **The registry** holds built-in functions and methods. Hosts can add
//!   their own by building a [`Registry`] and calling
//!   [`Template::render_with`].
//! - **The codec** serializes templates and values to a portable text
//!   format, see [`codec`].
//!
//! ## Quick start
//!
//! ```rust
//! use ul4::{Template, CompileOptions, Vars};
//!
//! let t = Template::compile("Hello, <?print name?>!", CompileOptions::new()).unwrap();
//!
//! let mut vars = Vars::new();
//! vars.insert("name".into(), "Alice".into());
//! assert_eq!(t.render_to_string(vars).unwrap(), "Hello, Alice!");
//! ```
//!
//! ## Templates as functions
//!
//! A template run with [`Template::call`] discards its output and produces
//! the value of its `<?return?>` tag:
//!
//! ```rust
//! use ul4::{Value, Vars};
//!
//! let t = ul4::compile("<?def f(n)?><?return n * 2?><?end def?><?return f(21)?>", None, false, "<?", "?>").unwrap();
//! assert_eq!(t.call(Vars::new()).unwrap(), Value::Int(42));
//! ```

pub mod ast;
pub mod codec;
pub mod error;
pub mod eval;
mod options;
mod parser;
pub mod registry;

use std::io;

pub use ast::color::Color;
pub use ast::location::{Location, Span, TagKind};
pub use ast::template::Template;
pub use ast::value::{Closure, MonthDelta, Undefined, Value, ValueKind, Vars};
pub use error::{CodecError, Error, EvalError, EvalErrorKind, ParseError, ParseErrorKind, TraceFrame};
pub use eval::{Evaluator, Render, Signal};
pub use options::CompileOptions;
pub use parser::strip_linefeeds;
pub use registry::{
    Args, ClosureFunction, ParamDef, Registry, Signature, Ul4Function, Ul4Method, xmlescape,
};

/// Compile template source.
///
/// `name` is used in error messages. Unless `keepws` is set, line feeds and
/// the indentation following them are removed from literal text.
pub fn compile(
    source: &str,
    name: Option<&str>,
    keepws: bool,
    startdelim: &str,
    enddelim: &str,
) -> Result<Template, ParseError> {
    let mut options = CompileOptions::new()
        .keepws(keepws)
        .delimiters(startdelim, enddelim);
    if let Some(name) = name {
        options = options.name(name);
    }
    Template::compile(source, options)
}

/// Serialize a compiled template, see [`codec`].
pub fn save(template: &Template) -> Result<String, CodecError> {
    codec::encode_template(template)
}

/// Load a template written by [`save`].
pub fn load(text: &str) -> Result<Template, CodecError> {
    codec::decode_template(text)
}

impl Template {
    /// Compile source text with the given options.
    pub fn compile(source: &str, options: CompileOptions) -> Result<Self, ParseError> {
        parser::compile(source, &options)
    }

    /// Start rendering with the built-in functions. Nothing is evaluated
    /// until the returned iterator is polled.
    pub fn render(&self, vars: Vars) -> Render<'_> {
        self.render_with(Registry::shared(), vars)
    }

    /// Start rendering with a custom registry.
    pub fn render_with<'a>(&'a self, registry: &'a Registry, vars: Vars) -> Render<'a> {
        Render::new(self, Evaluator::new(registry, vars))
    }

    /// Render to completion and concatenate the output.
    pub fn render_to_string(&self, vars: Vars) -> Result<String, EvalError> {
        self.render(vars).collect()
    }

    /// Run the template as a function: output is discarded and the value of
    /// `<?return?>` is returned, `None` if there is none.
    pub fn call(&self, vars: Vars) -> Result<Value, EvalError> {
        self.render(vars).call()
    }

    pub fn call_with(&self, registry: &Registry, vars: Vars) -> Result<Value, EvalError> {
        self.render_with(registry, vars).call()
    }

    pub fn dumps(&self) -> Result<String, CodecError> {
        codec::encode_template(self)
    }

    pub fn loads(text: &str) -> Result<Self, CodecError> {
        codec::decode_template(text)
    }

    /// Write the serialized template. Codec errors are reported as
    /// [`io::ErrorKind::InvalidData`].
    pub fn dump(&self, mut writer: impl io::Write) -> io::Result<()> {
        let text = self
            .dumps()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writer.write_all(text.as_bytes())
    }

    /// Read a serialized template to the end of `reader`.
    pub fn load_from(mut reader: impl io::Read) -> io::Result<Self> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Self::loads(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
