// Grammar of the node command input:
//
//   line     := segment ( '->' segment )*
//   segment  := base ( '~' clause )*
//   base     := [ prefix ':' ] text
//   clause   := key '@' value
//
// Quoted spans ("..." or '...') are scanned as a single token, so `->` and `~`
// inside quotes do not split. A single quote opens a span only at the start of a
// word, so apostrophes stay literal. An unmatched quote is an ordinary character.

pub const CHAIN: &str = "->";
pub const CLAUSE: char = '~';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    Tags(Vec<String>),
    Details(String),
    Synonyms(Vec<String>),
    Unknown { key: String, value: String },
    Malformed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub type_prefix: Option<String>,
    pub base: String,
    pub clauses: Vec<Clause>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    pub segments: Vec<Segment>,
}

impl Segment {
    pub fn tags(&self) -> Vec<String> {
        self.clauses
            .iter()
            .filter_map(|c| match c { Clause::Tags(v) => Some(v.clone()), _ => None })
            .flatten()
            .collect()
    }

    pub fn synonyms(&self) -> Vec<String> {
        self.clauses
            .iter()
            .filter_map(|c| match c { Clause::Synonyms(v) => Some(v.clone()), _ => None })
            .flatten()
            .collect()
    }

    /// The last `details@` clause wins.
    pub fn details(&self) -> Option<String> {
        self.clauses.iter().rev().find_map(|c| match c {
            Clause::Details(d) => Some(d.clone()),
            _ => None,
        })
    }
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(input: &str) -> Self {
        Self { chars: input.chars().collect(), pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_chain(&self) -> bool {
        self.chars.get(self.pos) == Some(&'-') && self.chars.get(self.pos + 1) == Some(&'>')
    }

    fn closing_quote_from(&self, start: usize, quote: char) -> Option<usize> {
        (start + 1..self.chars.len()).find(|&i| self.chars[i] == quote)
    }

    fn opens_quote(&self, ch: char) -> bool {
        match ch {
            '"' => true,
            '\'' => self
                .pos
                .checked_sub(1)
                .and_then(|i| self.chars.get(i))
                .is_none_or(|prev| prev.is_whitespace() || matches!(prev, '@' | ',' | ':' | '~' | '>')),
            _ => false,
        }
    }

    // Consume text up to the next top-level `->` or `~`.
    fn scan_fragment(&mut self) -> String {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch == CLAUSE || self.at_chain() {
                break;
            }
            if self.opens_quote(ch) {
                if let Some(end) = self.closing_quote_from(self.pos, ch) {
                    out.extend(&self.chars[self.pos..=end]);
                    self.pos = end + 1;
                    continue;
                }
            }
            out.push(ch);
            self.pos += 1;
        }
        out
    }
}

/// Parse every non-blank line of a submission, in document order.
pub fn parse_input(input: &str) -> Vec<Line> {
    input
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(parse_line)
        .collect()
}

pub fn parse_line(input: &str) -> Line {
    let mut cur = Cursor::new(input);
    let mut segments = vec![parse_segment(&mut cur)];
    while cur.at_chain() {
        cur.pos += CHAIN.len();
        segments.push(parse_segment(&mut cur));
    }
    Line { segments }
}

fn parse_segment(cur: &mut Cursor) -> Segment {
    let (type_prefix, base) = parse_base(&cur.scan_fragment());
    let mut clauses = Vec::new();
    while cur.peek() == Some(CLAUSE) {
        cur.pos += 1;
        clauses.push(parse_clause(&cur.scan_fragment()));
    }
    debug_assert!(cur.at_end() || cur.at_chain());
    Segment { type_prefix, base, clauses }
}

fn parse_base(raw: &str) -> (Option<String>, String) {
    let trimmed = raw.trim();
    if let Some((prefix, rest)) = trimmed.split_once(':') {
        let prefix = prefix.trim();
        if !prefix.is_empty() && !prefix.contains(char::is_whitespace) && !prefix.contains('"') {
            return (Some(prefix.to_string()), rest.trim().to_string());
        }
    }
    (None, trimmed.to_string())
}

pub fn parse_clause(raw: &str) -> Clause {
    let trimmed = raw.trim();
    let Some((key, value)) = trimmed.split_once('@') else {
        return Clause::Malformed(trimmed.to_string());
    };
    let key = key.trim().to_lowercase();
    let value = value.trim();
    match key.as_str() {
        "tag" | "tags" => Clause::Tags(split_list(value).into_iter().map(|t| t.to_lowercase()).collect()),
        "synonym" | "synonyms" => Clause::Synonyms(split_list(value)),
        "detail" | "details" => Clause::Details(strip_quotes(value).to_string()),
        "" => Clause::Malformed(trimmed.to_string()),
        _ => Clause::Unknown { key, value: value.to_string() },
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| strip_quotes(v.trim()).trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

// Remove one surrounding pair of matching quotes, if present.
pub fn strip_quotes(s: &str) -> &str {
    let t = s.trim();
    if t.len() >= 2
        && ((t.starts_with('"') && t.ends_with('"')) || (t.starts_with('\'') && t.ends_with('\'')))
    {
        &t[1..t.len() - 1]
    } else {
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chain_with_prefix_and_metadata() {
        let line = parse_line(r#"fruit ~ tags@Food,red -> tension:rotten ~ detail@"gone bad" -> bad apple"#);
        assert_eq!(line.segments.len(), 3);
        assert_eq!(
            line.segments[0],
            Segment {
                type_prefix: None,
                base: "fruit".into(),
                clauses: vec![Clause::Tags(vec!["food".into(), "red".into()])],
            }
        );
        assert_eq!(line.segments[1].type_prefix.as_deref(), Some("tension"));
        assert_eq!(line.segments[1].base, "rotten");
        assert_eq!(line.segments[1].details().as_deref(), Some("gone bad"));
        assert_eq!(line.segments[2].base, "bad apple");
    }

    #[test]
    fn delimiters_inside_quotes_do_not_split() {
        let line = parse_line(r#"a ~ details@"x -> y ~ z" -> b"#);
        assert_eq!(line.segments.len(), 2);
        assert_eq!(line.segments[0].details().as_deref(), Some("x -> y ~ z"));
        assert_eq!(line.segments[1].base, "b");
    }

    #[test]
    fn single_quoted_spans_do_not_split() {
        let line = parse_line("a ~ details@'x -> y ~ z' -> b");
        assert_eq!(line.segments.len(), 2);
        assert_eq!(line.segments[0].details().as_deref(), Some("x -> y ~ z"));
        assert_eq!(line.segments[1].base, "b");
    }

    #[test]
    fn apostrophes_stay_literal() {
        let line = parse_line("Bob's idea -> Ann's plan");
        let bases: Vec<&str> = line.segments.iter().map(|s| s.base.as_str()).collect();
        assert_eq!(bases, vec!["Bob's idea", "Ann's plan"]);
    }

    #[test]
    fn unmatched_quote_is_literal() {
        let line = parse_line(r#"a ~ details@"open -> b"#);
        assert_eq!(line.segments.len(), 2);
        assert_eq!(line.segments[0].details().as_deref(), Some("\"open"));
    }

    #[test]
    fn malformed_and_unknown_clauses_are_kept_but_inert() {
        let seg = &parse_line("fever ~ chills ~ color@red ~ @x").segments[0];
        assert_eq!(
            seg.clauses,
            vec![
                Clause::Malformed("chills".into()),
                Clause::Unknown { key: "color".into(), value: "red".into() },
                Clause::Malformed("@x".into()),
            ]
        );
        assert!(seg.tags().is_empty());
        assert!(seg.synonyms().is_empty());
        assert_eq!(seg.details(), None);
    }

    #[test]
    fn prefix_requires_a_single_word() {
        assert_eq!(parse_base("task: ship it"), (Some("task".into()), "ship it".into()));
        assert_eq!(parse_base("note to self: call"), (None, "note to self: call".into()));
        assert_eq!(parse_base(": bare"), (None, ": bare".into()));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let lines = parse_input("a -> b\n\n   \nc");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].segments[0].base, "c");
    }
}
