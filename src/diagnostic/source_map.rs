/// Line index over a source text, for turning byte offsets into positions.
pub struct SourceMap {
    /// Byte offset at which each line starts; always begins with 0.
    line_starts: Vec<usize>,
}

impl SourceMap {
    pub fn new(source: &str) -> Self {
        let breaks = source.match_indices('\n').map(|(i, _)| i + 1);
        SourceMap { line_starts: std::iter::once(0).chain(breaks).collect() }
    }

    /// 1-based (line, column) of a byte offset. A newline belongs to the
    /// line it ends.
    pub fn lookup(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        (line + 1, offset - self.line_starts[line] + 1)
    }

    /// Text of a 1-based line without its line terminator; empty when the
    /// line does not exist.
    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        let Some(&start) = line.checked_sub(1).and_then(|i| self.line_starts.get(i)) else {
            return "";
        };
        let end = self.line_starts.get(line).copied().unwrap_or(source.len());
        source[start..end].trim_end_matches(['\n', '\r'])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_single_line() {
        let src = "(+ x 2) ; sum";
        let sm = SourceMap::new(src);
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.lookup(2), (1, 3));
        assert_eq!(sm.lookup(14), (1, 15));
    }

    #[test]
    fn lookup_multi_line() {
        let src = "(def! a 1)\n(def! b 2)\n(+ a b 10)";
        let sm = SourceMap::new(src);
        assert_eq!(sm.lookup(0), (1, 1));   // '(' of the first form
        assert_eq!(sm.lookup(10), (1, 11)); // newline after the first form
        assert_eq!(sm.lookup(11), (2, 1));  // second form
        assert_eq!(sm.lookup(22), (3, 1));  // third form
    }

    #[test]
    fn line_text_single() {
        let src = "(+ x 2) ; sum";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "(+ x 2) ; sum");
    }

    #[test]
    fn line_text_multi() {
        let src = "(a)\n[b]\n{:c 1}";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "(a)");
        assert_eq!(sm.line_text(src, 2), "[b]");
        assert_eq!(sm.line_text(src, 3), "{:c 1}");
    }

    #[test]
    fn line_text_out_of_bounds() {
        let src = "nil";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 0), "");
        assert_eq!(sm.line_text(src, 99), "");
    }

    #[test]
    fn empty_source() {
        let src = "";
        let sm = SourceMap::new(src);
        assert_eq!(sm.lookup(0), (1, 1));
        assert_eq!(sm.line_text(src, 1), "");
    }

    #[test]
    fn line_text_trailing_newline() {
        let src = "nil\n";
        let sm = SourceMap::new(src);
        assert_eq!(sm.line_text(src, 1), "nil");
        assert_eq!(sm.line_text(src, 2), "");
    }

    #[test]
    fn lookup_at_newline_boundary() {
        let src = "a\n\"s\"\n:k";
        let sm = SourceMap::new(src);
        // a newline belongs to the line it ends
        assert_eq!(sm.lookup(1), (1, 2));
        assert_eq!(sm.lookup(2), (2, 1));
        assert_eq!(sm.lookup(5), (2, 4));
        assert_eq!(sm.lookup(6), (3, 1));
    }
}
