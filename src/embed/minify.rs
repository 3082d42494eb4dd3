//! Line-oriented shrinking of the Python helper scripts.
//!
//! Whole-line comments go, and so do docstring blocks whose delimiters are
//! lines consisting of exactly four spaces and `"""`. Nothing else is
//! touched, and an unterminated docstring is kept as ordinary lines.

const DOC_DELIMITER: &str = "    \"\"\"";

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

pub fn minify(source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut kept = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line == DOC_DELIMITER
            && let Some(len) = lines[i + 1..].iter().position(|l| *l == DOC_DELIMITER)
        {
            i += len + 2;
            continue;
        }
        if !is_comment(line) {
            kept.push(line);
        }
        i += 1;
    }

    let mut out = kept.join("\n");
    out.push('\n');
    out
}

pub fn minify_bytes(source: &[u8]) -> Vec<u8> {
    minify(&String::from_utf8_lossy(source)).into_bytes()
}
