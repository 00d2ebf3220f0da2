/// Where a token starts in the source text. Lines and columns are 1-based and
/// columns count characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn start() -> Self {
        Self { line: 1, column: 1 }
    }

    /// The span reached after consuming `text` from `self`.
    pub fn advance(self, text: &str) -> Span {
        text.chars().fold(self, |span, c| {
            if c == '\n' {
                Span {
                    line: span.line + 1,
                    column: 1,
                }
            } else {
                Span {
                    line: span.line,
                    column: span.column + 1,
                }
            }
        })
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.line, self.column)
    }
}
