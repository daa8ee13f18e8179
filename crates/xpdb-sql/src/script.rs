//! DDL script splitting.
//!
//! Schema scripts are sent one statement at a time. Statements end at a line
//! containing `;` (after `--` comments are stripped), except inside
//! dollar-quoted bodies (`$tag$ ... $tag$`), which are copied verbatim so
//! procedural function bodies survive intact.

use regex::Regex;
use std::sync::LazyLock;

/// Opening or closing dollar-quote marker; the tag may be empty
static DOLLAR_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\w*\$").expect("dollar-quote regex pattern is invalid - this is a bug")
});

/// Statement kinds executed during schema bootstrap (case-sensitive
/// substring match). Everything else in a script is skipped.
pub const EXECUTABLE_VERBS: [&str; 8] = [
    "CREATE TABLE",
    "CREATE SEQUENCE",
    "INSERT INTO",
    "CREATE TYPE",
    "CREATE FUNCTION",
    "SET",
    "CREATE INDEX",
    "CREATE UNIQUE INDEX",
];

/// Whether a statement passes the bootstrap allow-list
pub fn is_executable(statement: &str) -> bool {
    EXECUTABLE_VERBS.iter().any(|verb| statement.contains(verb))
}

/// A DDL script split into statements, in script order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    statements: Vec<String>,
}

impl Script {
    /// All statements, trimmed
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Statements passing the bootstrap allow-list
    pub fn executable_statements(&self) -> impl Iterator<Item = &str> + '_ {
        self.statements
            .iter()
            .map(String::as_str)
            .filter(|s| is_executable(s))
    }

    /// Number of statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Whether the script held no statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl IntoIterator for Script {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.statements.into_iter()
    }
}

struct Splitter {
    statements: Vec<String>,
    current: String,
}

impl Splitter {
    fn finish_statement(&mut self) {
        let stmt = std::mem::take(&mut self.current);
        let stmt = stmt.trim();
        if !stmt.is_empty() {
            self.statements.push(stmt.to_string());
        }
    }

    /// Plain (non dollar-quoted) text: strip comments line by line and close
    /// a statement at every complete line holding `;`. A partial line runs
    /// into the following dollar-quoted body.
    fn push_plain(&mut self, text: &str) {
        for segment in text.split_inclusive('\n') {
            let (line, newline) = match segment.strip_suffix('\n') {
                Some(line) => (line, true),
                None => (segment, false),
            };
            let code = line.split_once("--").map_or(line, |(code, _)| code);
            self.current.push_str(code);
            if newline {
                self.current.push('\n');
            }
            if newline && code.contains(';') {
                self.finish_statement();
            }
        }
    }
}

/// Split a DDL script into statements.
///
/// Never fails: an unterminated dollar-quoted body drops the statement it
/// belongs to and the rest of the script, with a warning.
pub fn split_statements(ddl: &str) -> Script {
    let mut splitter = Splitter {
        statements: Vec::new(),
        current: String::new(),
    };
    let mut pos = 0;
    let mut search = 0;

    while let Some(open) = DOLLAR_MARKER.find_at(ddl, search) {
        let line_start = ddl[..open.start()].rfind('\n').map_or(0, |i| i + 1);
        if ddl[line_start.max(pos)..open.start()].contains("--") {
            // marker inside a comment
            search = open.end();
            continue;
        }

        splitter.push_plain(&ddl[pos..open.start()]);

        let marker = open.as_str();
        match ddl[open.end()..].find(marker) {
            Some(offset) => {
                let close_end = open.end() + offset + marker.len();
                splitter.current.push_str(&ddl[open.start()..close_end]);
                pos = close_end;
                search = close_end;
            }
            None => {
                tracing::warn!(
                    marker,
                    offset = open.start(),
                    "unterminated dollar-quoted body, ignoring the rest of the script"
                );
                splitter.current.clear();
                pos = ddl.len();
                break;
            }
        }
    }

    splitter.push_plain(&ddl[pos..]);
    splitter.finish_statement();

    Script {
        statements: splitter.statements,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FUNCTION_DDL: &str = "\
CREATE TABLE a (x int);
CREATE FUNCTION f() RETURNS trigger AS $$
BEGIN
  NEW.x := 1;
  RETURN NEW;
END;
$$ LANGUAGE plpgsql;
CREATE TABLE b (y int);
";

    #[test]
    fn test_plain_statements() {
        let script = split_statements("CREATE TABLE a (x int);\nCREATE TABLE b (y int);\n");
        assert_eq!(
            script.statements(),
            &["CREATE TABLE a (x int);", "CREATE TABLE b (y int);"]
        );
    }

    #[test]
    fn test_multi_line_statement() {
        let script = split_statements("CREATE TABLE a (\n  x int,\n  y text\n);\n");
        assert_eq!(script.len(), 1);
        assert_eq!(script.statements()[0], "CREATE TABLE a (\n  x int,\n  y text\n);");
    }

    #[test]
    fn test_comments_stripped() {
        let script = split_statements(
            "-- leading comment; with semicolon\nCREATE TABLE a (x int); -- trailing\n",
        );
        assert_eq!(script.statements(), &["CREATE TABLE a (x int);"]);
    }

    #[test]
    fn test_dollar_body_not_split() {
        let script = split_statements(FUNCTION_DDL);
        assert_eq!(script.len(), 3);
        assert_eq!(script.statements()[0], "CREATE TABLE a (x int);");
        let func = &script.statements()[1];
        assert!(func.starts_with("CREATE FUNCTION f() RETURNS trigger AS $$\nBEGIN"));
        assert!(func.contains("NEW.x := 1;\n  RETURN NEW;\nEND;\n$$"));
        assert!(func.ends_with("$$ LANGUAGE plpgsql;"));
        assert_eq!(script.statements()[2], "CREATE TABLE b (y int);");
    }

    #[test]
    fn test_tagged_dollar_body() {
        let script = split_statements(
            "CREATE FUNCTION g() RETURNS text AS $body$ SELECT '$$;' $body$ LANGUAGE sql;\n",
        );
        assert_eq!(script.len(), 1);
        assert!(script.statements()[0].contains("SELECT '$$;'"));
    }

    #[test]
    fn test_unterminated_marker_drops_fragment() {
        let script = split_statements(
            "CREATE TABLE a (x int);\nCREATE FUNCTION f() RETURNS int AS $$\nBEGIN; RETURN 1;\n",
        );
        assert_eq!(script.statements(), &["CREATE TABLE a (x int);"]);
    }

    #[test]
    fn test_marker_in_comment_ignored() {
        let script = split_statements("-- uses $$ quoting\nCREATE TABLE a (x int);\n");
        assert_eq!(script.statements(), &["CREATE TABLE a (x int);"]);
    }

    #[test]
    fn test_trailing_statement_without_terminator() {
        let script = split_statements("CREATE TABLE a (x int);\nSET search_path = public");
        assert_eq!(
            script.statements(),
            &["CREATE TABLE a (x int);", "SET search_path = public"]
        );
    }

    #[test]
    fn test_executable_allow_list() {
        let script = split_statements(
            "CREATE TABLE a (x int);\n\
             ALTER TABLE ONLY a ADD PRIMARY KEY (x);\n\
             COMMENT ON TABLE a IS 'doc';\n\
             CREATE UNIQUE INDEX a_x ON a (x);\n\
             insert into a values (1);\n\
             INSERT INTO a VALUES (2);\n",
        );
        let executable: Vec<&str> = script.executable_statements().collect();
        assert_eq!(
            executable,
            vec![
                "CREATE TABLE a (x int);",
                "CREATE UNIQUE INDEX a_x ON a (x);",
                "INSERT INTO a VALUES (2);",
            ]
        );
    }

    #[test]
    fn test_empty_script() {
        assert!(split_statements("").is_empty());
        assert!(split_statements("\n-- only a comment\n\n").is_empty());
    }
}
