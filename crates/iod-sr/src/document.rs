//! 报告文档的公共部分
//!
//! 所有报告类型共用的初始化流程：先解析全部被引用实例并生成证据序列，
//! 成功后才初始化记录、继承患者与检查属性。

use crate::content::{render, ContentNode};
use iod_core::{CodedConcept, Result};
use iod_dicom::reference::{evidence_items, resolve_all};
use iod_dicom::{ItemSpec, Record, ReferencedDocument, ResolveReference};
use tracing::debug;

/// 解析引用并初始化报告记录，返回解析后的被引用实例
pub(crate) fn initiate_document<R: ResolveReference>(
    record: &mut Record,
    references: &[R],
) -> Result<Vec<ReferencedDocument>> {
    let documents = resolve_all(references)?;
    let evidence = evidence_items(&documents)?;

    record.initiate();
    if let Some(first) = documents.first() {
        record.inherit_from(first.dataset());
        record.try_set_attribute("CurrentRequestedProcedureEvidenceSequence", evidence)?;
    }
    debug!("{} 引用实例数: {}", record.variant(), documents.len());
    Ok(documents)
}

/// 设置根节点的概念名称与可选模板
pub(crate) fn set_root_concept(
    record: &mut Record,
    concept: &CodedConcept,
    template: Option<ItemSpec>,
) -> Result<()> {
    record.try_set_attribute("ConceptNameCodeSequence", ItemSpec::code(concept))?;
    if let Some(template) = template {
        record.try_set_attribute("ContentTemplateSequence", template)?;
    }
    Ok(())
}

/// 在根节点 ContentSequence 末尾追加节点
pub(crate) fn append_root_content(record: &mut Record, nodes: &[ContentNode]) -> Result<()> {
    record.append_items("ContentSequence", &render(nodes))
}
