//! Static discovery of the modules a code string imports.
//!
//! The scan is line based and fails closed: text that merely looks like an
//! import statement (for example inside a multi-line string) is still
//! reported. Imports it cannot see are caught by the run-time guard in the
//! interpreter harness.

const DYNAMIC_IMPORT_CALLS: [&str; 2] = ["__import__(", "import_module("];

/// Returns every module name imported by `code`, in order of appearance and
/// without duplicates.
#[must_use]
pub fn scan_imports(code: &str) -> Vec<String> {
    let mut modules: Vec<String> = Vec::new();
    let mut record = |module: &str| {
        if is_module_name(module) && !modules.iter().any(|seen| seen == module) {
            modules.push(module.to_owned());
        }
    };

    for line in code.lines() {
        let line = strip_comment(line);
        for statement in line.split(';') {
            let statement = statement.trim();
            match split_keyword(statement) {
                Some(("import", rest)) => {
                    for clause in rest.split(',') {
                        if let Some(module) = clause.split_whitespace().next() {
                            record(module.trim_matches(|c| c == '(' || c == ')'));
                        }
                    }
                }
                Some(("from", rest)) => {
                    let mut words = rest.split_whitespace();
                    if let (Some(module), Some("import")) = (words.next(), words.next()) {
                        record(module);
                    }
                }
                _ => {}
            }

            for call in DYNAMIC_IMPORT_CALLS {
                for (index, _) in statement.match_indices(call) {
                    if let Some(module) = string_literal(&statement[index + call.len()..]) {
                        record(module);
                    }
                }
            }
        }
    }

    modules
}

fn split_keyword(statement: &str) -> Option<(&str, &str)> {
    let (keyword, rest) = statement.split_once(char::is_whitespace)?;
    matches!(keyword, "import" | "from").then_some((keyword, rest))
}

/// Returns the leading string literal of `text`, if it starts with one.
fn string_literal(text: &str) -> Option<&str> {
    let text = text.trim_start();
    let quote = text.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &text[1..];
    body.find(quote).map(|end| &body[..end])
}

/// Drops a trailing `#` comment, ignoring `#` inside string literals.
fn strip_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return &line[..index],
            None => {}
        }
    }
    line
}

fn is_module_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.split('.').all(|segment| {
            segment
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
                && segment.chars().all(|c| c.is_alphanumeric() || c == '_')
        })
}
