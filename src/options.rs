/// Options controlling how template source is compiled.
///
/// All fields have sensible defaults: unnamed, whitespace kept, `<?` and
/// `?>` as tag delimiters. Use the builder methods to override them:
///
/// ```rust
/// use ul4::CompileOptions;
///
/// let options = CompileOptions::new()
///     .name("page")
///     .keepws(false)
///     .delimiters("{{", "}}");
/// assert_eq!(options.startdelim, "{{");
/// ```
#[derive(Clone, PartialEq)]
pub struct CompileOptions {
    /// Name reported in error traces and by `template.name`.
    pub name: Option<String>,

    /// When `false`, every line feed in literal text is removed together
    /// with the indentation that follows it.
    pub keepws: bool,

    pub startdelim: String,
    pub enddelim: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            name: None,
            keepws: true,
            startdelim: "<?".to_string(),
            enddelim: "?>".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the template name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Keep or strip line feed whitespace in literal text.
    pub fn keepws(mut self, keepws: bool) -> Self {
        self.keepws = keepws;
        self
    }

    /// Use different tag delimiters.
    pub fn delimiters(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.startdelim = start.into();
        self.enddelim = end.into();
        self
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("name", &self.name)
            .field("keepws", &self.keepws)
            .field("delimiters", &format_args!("{} {}", self.startdelim, self.enddelim))
            .finish()
    }
}
