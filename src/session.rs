//! Per-session state shared by the three pipeline stages.
//!
//! Stages are driven by separate user actions, so everything they hand to each other
//! lives here. A slot that is absent is what keeps the dependent action disabled.

use crate::types::{
    DocumentInfo, LineItemTable, MatchCandidates, PurchaseOrderField, PurchaseOrderFields,
    UploadedDocument,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Document,
    Table,
    MatchCandidates,
    PoFields,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    document: Option<UploadedDocument>,
    table: Option<LineItemTable>,
    match_candidates: Option<MatchCandidates>,
    po_fields: PurchaseOrderFields,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&UploadedDocument> {
        self.document.as_ref()
    }

    pub fn set_document(&mut self, document: UploadedDocument) {
        self.document = Some(document);
    }

    pub fn table(&self) -> Option<&LineItemTable> {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> Option<&mut LineItemTable> {
        self.table.as_mut()
    }

    pub fn set_table(&mut self, table: LineItemTable) {
        self.table = Some(table);
    }

    pub fn match_candidates(&self) -> Option<&MatchCandidates> {
        self.match_candidates.as_ref()
    }

    pub fn set_match_candidates(&mut self, candidates: MatchCandidates) {
        self.match_candidates = Some(candidates);
    }

    pub fn po_fields(&self) -> &PurchaseOrderFields {
        &self.po_fields
    }

    pub fn po_fields_mut(&mut self) -> &mut PurchaseOrderFields {
        &mut self.po_fields
    }

    pub fn is_present(&self, slot: Slot) -> bool {
        match slot {
            Slot::Document => self.document.is_some(),
            Slot::Table => self.table.is_some(),
            Slot::MatchCandidates => self.match_candidates.is_some(),
            Slot::PoFields => true,
        }
    }

    /// Empty a slot. Purchase-order fields go back to the four defaults.
    pub fn clear(&mut self, slot: Slot) {
        match slot {
            Slot::Document => self.document = None,
            Slot::Table => self.table = None,
            Slot::MatchCandidates => self.match_candidates = None,
            Slot::PoFields => self.po_fields = PurchaseOrderFields::default(),
        }
    }

    /// Serializable view of the whole session for the front end.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            document: self.document.as_ref().map(DocumentInfo::from),
            table: self.table.clone(),
            match_candidates: self.match_candidates.clone(),
            po_fields: self.po_fields.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub document: Option<DocumentInfo>,
    pub table: Option<LineItemTable>,
    pub match_candidates: Option<MatchCandidates>,
    pub po_fields: Vec<PurchaseOrderField>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PO_FIELDS;

    #[test]
    fn new_session_has_only_po_fields() {
        let session = SessionState::new();
        assert!(!session.is_present(Slot::Document));
        assert!(!session.is_present(Slot::Table));
        assert!(!session.is_present(Slot::MatchCandidates));
        assert_eq!(session.po_fields().names(), DEFAULT_PO_FIELDS);
    }

    #[test]
    fn clear_empties_only_the_named_slot() {
        let mut session = SessionState::new();
        session.set_document(UploadedDocument {
            file_name: "po.pdf".into(),
            bytes: b"%PDF-1.4".to_vec(),
        });
        session.set_table(LineItemTable::default());
        session.set_match_candidates(vec![]);

        session.clear(Slot::Table);
        assert!(session.is_present(Slot::Document));
        assert!(!session.is_present(Slot::Table));
        assert!(session.is_present(Slot::MatchCandidates));
    }

    #[test]
    fn clearing_po_fields_restores_defaults() {
        let mut session = SessionState::new();
        session.po_fields_mut().clear();
        session.clear(Slot::PoFields);
        assert_eq!(session.po_fields().len(), 4);
    }

    #[test]
    fn snapshot_hides_document_bytes() {
        let mut session = SessionState::new();
        session.set_document(UploadedDocument {
            file_name: "po.pdf".into(),
            bytes: vec![0; 42],
        });
        let json = serde_json::to_value(session.snapshot()).unwrap();
        assert_eq!(json["document"]["fileName"], "po.pdf");
        assert_eq!(json["document"]["size"], 42);
        assert!(json["document"].get("bytes").is_none());
        assert!(json["table"].is_null());
        assert_eq!(json["poFields"].as_array().unwrap().len(), 4);
    }
}
