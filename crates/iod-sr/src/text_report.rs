//! 基本文本报告

use crate::content::{ContentNode, RelationshipType};
use crate::document::{append_root_content, initiate_document, set_root_concept};
use iod_core::{CodedConcept, Result};
use iod_dicom::{Record, RecordVariant, ResolveReference};
use tracing::{debug, info};

/// 根节点为 "Final Report" 的文本报告，内容是一串文本节点
#[derive(Debug, Clone)]
pub struct BasicTextReport {
    record: Record,
}

impl Default for BasicTextReport {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicTextReport {
    pub fn new() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::BasicTextSr),
        }
    }

    pub fn root_concept() -> CodedConcept {
        CodedConcept::dcm("128005", "Final Report")
    }

    pub fn initiate<R: ResolveReference>(&mut self, references: &[R]) -> Result<()> {
        initiate_document(&mut self.record, references)?;
        set_root_concept(&mut self.record, &Self::root_concept(), None)?;
        info!("文本报告已初始化: {}", self.record.sop_instance_uid().unwrap_or_default());
        Ok(())
    }

    /// 追加一个 CONTAINS TEXT 节点
    pub fn add_text_node(&mut self, text: &str, concept: &CodedConcept) -> Result<()> {
        debug!("添加文本节点 {}", concept);
        let node = ContentNode::text(RelationshipType::Contains, concept.clone(), text);
        append_root_content(&mut self.record, &[node])
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::instance;
    use dicom::dictionary_std::tags;
    use iod_dicom::value::{read_code, read_items, read_text};

    #[test]
    fn test_text_nodes_append_in_order() {
        let mut report = BasicTextReport::new();
        report.initiate(&[instance("1.2.3", "1.2.3.1", "1.2.3.1.1")]).unwrap();
        report
            .add_text_node("No acute findings.", &CodedConcept::dcm("121071", "Finding"))
            .unwrap();
        report
            .add_text_node("Follow up in 6 months.", &CodedConcept::dcm("121075", "Recommendation"))
            .unwrap();

        let record = report.record();
        let root = read_code(record.dataset(), tags::CONCEPT_NAME_CODE_SEQUENCE).unwrap();
        assert_eq!(root.value, "128005");
        assert_eq!(record.text("PatientID").as_deref(), Some("PAT001"));

        let content = record.items("ContentSequence");
        assert_eq!(content.len(), 2);
        assert_eq!(read_text(&content[0], tags::TEXT_VALUE).as_deref(), Some("No acute findings."));
        assert_eq!(read_text(&content[1], tags::RELATIONSHIP_TYPE).as_deref(), Some("CONTAINS"));
        assert_eq!(
            read_code(&content[1], tags::CONCEPT_NAME_CODE_SEQUENCE).unwrap().value,
            "121075"
        );

        let evidence = record.items("CurrentRequestedProcedureEvidenceSequence");
        assert_eq!(evidence.len(), 1);
        assert_eq!(read_items(&evidence[0], tags::REFERENCED_SERIES_SEQUENCE).len(), 1);
    }

    #[test]
    fn test_initiate_without_references() {
        let mut report = BasicTextReport::default();
        report.initiate::<&str>(&[]).unwrap();
        assert_eq!(report.record().text("Modality").as_deref(), Some("SR"));
        assert!(report.record().items("CurrentRequestedProcedureEvidenceSequence").is_empty());
    }
}
