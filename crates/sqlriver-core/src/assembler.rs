//! Listener that turns field events into one document per row

use crate::document::{Document, FieldValue};
use crate::source::RowListener;

/// Accumulates field events for the row currently being advanced.
///
/// Holds exactly one in-progress [`Document`] and one pending identifier.
/// [`take`](Self::take) hands both off and resets, so fields never bleed
/// into the next row.
#[derive(Debug, Default)]
pub struct DocumentAssembler {
    doc: Document,
    id: Option<String>,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand off the assembled row and start a fresh one.
    pub fn take(&mut self) -> (Option<String>, Document) {
        (self.id.take(), std::mem::take(&mut self.doc))
    }

    /// Fields collected so far for the current row
    pub fn pending(&self) -> &Document {
        &self.doc
    }
}

impl RowListener for DocumentAssembler {
    fn field(&mut self, name: &str, value: FieldValue) {
        self.doc.insert(name, value);
    }

    fn id(&mut self, id: Option<String>) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_returns_row_and_resets() {
        let mut asm = DocumentAssembler::new();
        asm.field("a", 1i32.into());
        asm.field("b", "two".into());
        asm.id(Some("row-1".into()));

        let (id, doc) = asm.take();
        assert_eq!(id.as_deref(), Some("row-1"));
        assert_eq!(doc.to_json().unwrap(), r#"{"a":1,"b":"two"}"#);

        assert!(asm.pending().is_empty());
        let (id, doc) = asm.take();
        assert_eq!(id, None);
        assert!(doc.is_empty());
    }

    #[test]
    fn no_field_bleed_between_rows() {
        let mut asm = DocumentAssembler::new();
        asm.field("only_first", true.into());
        asm.id(Some("1".into()));
        let _ = asm.take();

        asm.field("second", false.into());
        asm.id(None);
        let (id, doc) = asm.take();
        assert_eq!(id, None);
        assert!(doc.get("only_first").is_none());
        assert_eq!(doc.len(), 1);
    }
}
