//! Diagnostic call chain.
//!
//! A [`StackFrame`] is a cheap-to-clone linked list of call-site spans. The
//! evaluator pushes one link per function call; runtime errors capture the
//! chain so the host can show where a failure happened. Frames carry no
//! evaluation state.

use std::fmt;
use std::rc::Rc;

use crate::ast::Span;

#[derive(Debug)]
struct FrameRecord {
    span: Span,
    parent: StackFrame,
}

/// Linked record of call sites, innermost first.
#[derive(Debug, Clone, Default)]
pub struct StackFrame(Option<Rc<FrameRecord>>);

impl StackFrame {
    /// The empty chain used at the start of an evaluation.
    pub fn root() -> Self {
        StackFrame(None)
    }

    /// Push a call site.
    pub fn with_span(&self, span: Span) -> Self {
        StackFrame(Some(Rc::new(FrameRecord {
            span,
            parent: self.clone(),
        })))
    }

    /// Innermost call-site span, if any.
    pub fn span(&self) -> Option<Span> {
        self.0.as_ref().map(|record| record.span)
    }

    pub fn parent(&self) -> Option<&StackFrame> {
        self.0.as_ref().map(|record| &record.parent)
    }

    /// All spans of the chain, innermost first.
    pub fn spans(&self) -> Vec<Span> {
        let mut spans = Vec::new();
        let mut cursor = self;

        while let Some(record) = &cursor.0 {
            spans.push(record.span);
            cursor = &record.parent;
        }

        spans
    }

    pub fn depth(&self) -> usize {
        self.spans().len()
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.spans().iter().map(ToString::to_string).collect();

        write!(f, "[{}]", rendered.join(" <- "))
    }
}
