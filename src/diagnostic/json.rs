use super::{Diagnostic, SourceMap};

/// Renders a diagnostic as a single line of JSON.
pub fn render(d: &Diagnostic) -> String {
    let mut obj = serde_json::json!({
        "severity": "error",
        "stage": d.stage.name(),
        "message": d.message,
        "notes": d.notes,
    });

    if let Some(label) = &d.label {
        let mut span = serde_json::json!({
            "start": label.span.start,
            "end": label.span.end,
            "message": label.message,
        });
        if let Some(source) = &d.source {
            let (line, col) = SourceMap::new(source).lookup(label.span.start);
            span["line"] = serde_json::Value::from(line);
            span["col"] = serde_json::Value::from(col);
        }
        obj["span"] = span;
    }

    if let Some(s) = &d.suggestion {
        obj["suggestion"] = serde_json::Value::String(s.clone());
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"severity":"error","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Stage;
    use crate::reader::Span;

    fn parse_json(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn render_basic_error() {
        let v = parse_json(&render(&Diagnostic::error(Stage::Runtime, "unknown global: x")));
        assert_eq!(v["severity"], "error");
        assert_eq!(v["stage"], "runtime");
        assert_eq!(v["message"], "unknown global: x");
        assert!(v.get("span").is_none());
    }

    #[test]
    fn render_with_span_and_source() {
        let d = Diagnostic::error(Stage::Read, "malformed number '12x'")
            .with_span(Span { start: 3, end: 6 }, "here")
            .with_source("(+ 12x 1)".to_string());
        let v = parse_json(&render(&d));
        assert_eq!(v["span"]["start"], 3);
        assert_eq!(v["span"]["end"], 6);
        assert_eq!(v["span"]["line"], 1);
        assert_eq!(v["span"]["col"], 4);
    }

    #[test]
    fn render_span_without_source_has_no_line() {
        let d = Diagnostic::error(Stage::Read, "bad").with_span(Span { start: 5, end: 8 }, "here");
        let v = parse_json(&render(&d));
        assert!(v["span"].get("line").is_none());
        assert!(v["span"].get("col").is_none());
    }

    #[test]
    fn render_notes_and_suggestion() {
        let d = Diagnostic::error(Stage::Compile, "fn* is not supported")
            .with_note("function definitions are not compiled yet")
            .with_suggestion("use a native procedure");
        let v = parse_json(&render(&d));
        assert_eq!(v["notes"][0], "function definitions are not compiled yet");
        assert_eq!(v["suggestion"], "use a native procedure");
    }

    #[test]
    fn render_is_single_line() {
        let d = Diagnostic::error(Stage::Read, "multi\nline");
        assert!(!render(&d).contains('\n'));
    }
}
