use std::fmt;

pub fn display_fn<F>(f: F) -> impl fmt::Display
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    struct DisplayFn<F> {
        f: F,
    }
    impl<F> fmt::Display for DisplayFn<F>
    where
        F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            (self.f)(formatter)
        }
    }
    DisplayFn { f }
}

/// Render an excerpt of `source` ending at the 1-based `line`, with a caret
/// under `column` of the last shown line.
pub fn source_context(source: &str, line: usize, column: usize) -> String {
    const NUM_LINES: usize = 10;
    let lines: Vec<&str> = source.split('\n').collect();
    let end = line.min(lines.len());
    let start = end.saturating_sub(NUM_LINES);
    let mut out = String::new();
    out.push_str(&"-".repeat(20));
    out.push('\n');
    for l in &lines[start..end] {
        out.push_str(l);
        out.push('\n');
    }
    out.push_str(&" ".repeat(column));
    out.push('^');
    out.push('\n');
    out.push_str(&"-".repeat(20));
    out
}
