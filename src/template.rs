//! Template splitter and renderer.
//!
//! A template mixes literal text with code regions delimited by `<% … %>`.
//! Text segments land in the output verbatim; code segments run through the
//! lexer, parser, and interpreter against one persistent root environment,
//! so declarations in one region are visible in the next.
use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::lexer;
use crate::location::Location;
use crate::parser;
use crate::runtime::builtins::install_builtins;
use crate::runtime::env::Env;
use crate::runtime::interpreter::Interpreter;
use crate::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Text,
    Code,
}

/// Maximal run of template source that is either plain text or code. The
/// `<%`/`%>` markers belong to neither segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: String,
    pub location: Location,
}

pub fn scan(source: &Source) -> Result<Vec<Segment>> {
    let input = source.content();
    let bytes = input.as_bytes();
    let mut segments = Vec::new();

    let mut in_code = false;
    let mut location = Location::start();
    let mut segment_start = 0usize;
    let mut segment_location = location;
    let mut i = 0usize;

    let mut flush = |segments: &mut Vec<Segment>, from: usize, to: usize, kind, at: Location| {
        if from < to {
            segments.push(Segment {
                kind,
                content: input[from..to].to_string(),
                location: at,
            });
        }
    };

    while i < bytes.len() {
        let (open, close) = (bytes[i], bytes.get(i + 1).copied());
        if !in_code && open == b'<' && close == Some(b'%') {
            flush(&mut segments, segment_start, i, SegmentKind::Text, segment_location);
            location = location.advance(b'<').advance(b'%');
            i += 2;
            segment_start = i;
            segment_location = location;
            in_code = true;
            continue;
        }
        if in_code && open == b'%' && close == Some(b'>') {
            flush(&mut segments, segment_start, i, SegmentKind::Code, segment_location);
            location = location.advance(b'%').advance(b'>');
            i += 2;
            segment_start = i;
            segment_location = location;
            in_code = false;
            continue;
        }
        location = location.advance(bytes[i]);
        i += 1;
    }

    if in_code {
        return Err(Error::parse(
            "unterminated template block",
            source.path(),
            segment_location,
        ));
    }
    flush(
        &mut segments,
        segment_start,
        bytes.len(),
        SegmentKind::Text,
        segment_location,
    );
    Ok(segments)
}

/// Render a template to its output string. Builds the root environment,
/// installs the builtins once, and reuses one interpreter for every
/// segment.
pub fn render(source: &Source) -> Result<String> {
    let segments = scan(source)?;
    let root = Rc::new(RefCell::new(Env::new()));
    install_builtins(&mut root.borrow_mut());
    let mut interpreter = Interpreter::new(root, source.path());

    for segment in &segments {
        match segment.kind {
            SegmentKind::Text => interpreter.write_text(&segment.content),
            SegmentKind::Code => {
                let tokens = lexer::tokenize(&segment.content, source.path())?;
                let program = parser::parse_program(tokens, source.path())?;
                interpreter.exec_program(&program)?;
            }
        }
    }
    Ok(interpreter.output().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use indoc::indoc;

    fn source(content: &str) -> Source {
        Source::new("page.pol", content)
    }

    #[test]
    fn splits_alternating_text_and_code() {
        let segments = scan(&source("a<% echo 1 %>b")).expect("scan");
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].kind, SegmentKind::Text);
        assert_eq!(segments[0].content, "a");
        assert_eq!(segments[1].kind, SegmentKind::Code);
        assert_eq!(segments[1].content, " echo 1 ");
        assert_eq!(segments[2].kind, SegmentKind::Text);
        assert_eq!(segments[2].content, "b");
    }

    #[test]
    fn markers_belong_to_neither_segment() {
        let segments = scan(&source("<%%>")).expect("scan");
        assert!(segments.is_empty());
    }

    #[test]
    fn code_segment_location_points_after_the_marker() {
        let segments = scan(&source("ab\n<% echo 1 %>")).expect("scan");
        let code = &segments[1];
        assert_eq!(code.kind, SegmentKind::Code);
        assert_eq!(code.location.line, 2);
        assert_eq!(code.location.column, 3);
    }

    #[test]
    fn unterminated_block_is_a_parse_error() {
        let error = scan(&source("text<% var x = 1")).expect_err("expected scan failure");
        assert_eq!(error.kind, ErrorKind::Parse);
        assert!(error.to_string().contains("unterminated template block"));
        assert_eq!(error.location.column, 7);
    }

    #[test]
    fn renders_text_verbatim() {
        assert_eq!(render(&source("plain text\n")).expect("render"), "plain text\n");
    }

    #[test]
    fn declarations_persist_across_code_segments() {
        let template = indoc! {"
            <% var user = 'ada' %>Hello, <% echo upper(user) %>!
        "};
        assert_eq!(render(&source(template)).expect("render"), "Hello, ADA!\n");
    }

    #[test]
    fn render_interleaves_text_and_echo_output() {
        let template = "<% for i in range(3) %>*<% echo i %><% end %>";
        // `for … end` cannot span segments; each segment parses on its own.
        let error = render(&source(template)).expect_err("expected parse failure");
        assert_eq!(error.kind, ErrorKind::Parse);

        let template = "items:<% for i in range(3) echo ' ' .. i end %>";
        assert_eq!(render(&source(template)).expect("render"), "items: 0 1 2");
    }

    #[test]
    fn runtime_errors_carry_the_template_path() {
        let error = render(&source("<% echo missing %>")).expect_err("expected failure");
        assert_eq!(error.kind, ErrorKind::Runtime);
        assert_eq!(error.path, "page.pol");
        assert!(error.to_string().starts_with("page.pol:"));
    }
}
