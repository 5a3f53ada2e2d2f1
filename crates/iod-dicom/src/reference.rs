//! 被引用实例
//!
//! 报告、显示状态与关键对象都需要读取被引用实例的标识与几何信息。
//! 引用可以是文件路径，也可以是已经加载到内存的对象，构建时统一
//! 解析为 `ReferencedDocument`。

use crate::value::{read_floats, read_int, read_items, read_non_empty_text, ItemSpec};
use dicom::dictionary_std::tags;
use dicom::object::{open_file, InMemDicomObject};
use iod_core::{IodError, Result, SopReference};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// 被引用实例的元数据摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSummary {
    // === 患者信息 ===
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,

    // === 检查信息 ===
    pub study_instance_uid: Option<String>,
    pub study_id: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub accession_number: Option<String>,

    // === 序列信息 ===
    pub series_instance_uid: Option<String>,
    pub series_number: Option<String>,
    pub modality: Option<String>,

    // === 实例信息 ===
    pub sop_class_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub instance_number: Option<String>,

    // === 图像信息 ===
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    pub number_of_frames: Option<u32>,
    /// 行间距\列间距 (mm)
    pub pixel_spacing: Vec<f64>,
    pub frame_of_reference_uid: Option<String>,
    pub image_orientation_patient: Vec<f64>,
    pub image_position_patient: Vec<f64>,

    /// 分割对象的源序列 (ReferencedSeriesSequence 第一项)
    pub source_series_instance_uid: Option<String>,
}

impl DocumentSummary {
    fn extract(obj: &InMemDicomObject) -> Self {
        let text = |tag| read_non_empty_text(obj, tag);
        let unsigned = |tag| read_int(obj, tag).and_then(|v| u32::try_from(v).ok());

        Self {
            patient_id: text(tags::PATIENT_ID),
            patient_name: text(tags::PATIENT_NAME),
            patient_birth_date: text(tags::PATIENT_BIRTH_DATE),
            patient_sex: text(tags::PATIENT_SEX),
            study_instance_uid: text(tags::STUDY_INSTANCE_UID),
            study_id: text(tags::STUDY_ID),
            study_date: text(tags::STUDY_DATE),
            study_time: text(tags::STUDY_TIME),
            study_description: text(tags::STUDY_DESCRIPTION),
            accession_number: text(tags::ACCESSION_NUMBER),
            series_instance_uid: text(tags::SERIES_INSTANCE_UID),
            series_number: text(tags::SERIES_NUMBER),
            modality: text(tags::MODALITY),
            sop_class_uid: text(tags::SOP_CLASS_UID),
            sop_instance_uid: text(tags::SOP_INSTANCE_UID),
            instance_number: text(tags::INSTANCE_NUMBER),
            rows: unsigned(tags::ROWS),
            columns: unsigned(tags::COLUMNS),
            number_of_frames: unsigned(tags::NUMBER_OF_FRAMES),
            pixel_spacing: read_floats(obj, tags::PIXEL_SPACING),
            frame_of_reference_uid: text(tags::FRAME_OF_REFERENCE_UID),
            image_orientation_patient: read_floats(obj, tags::IMAGE_ORIENTATION_PATIENT),
            image_position_patient: read_floats(obj, tags::IMAGE_POSITION_PATIENT),
            source_series_instance_uid: read_items(obj, tags::REFERENCED_SERIES_SEQUENCE)
                .first()
                .and_then(|item| read_non_empty_text(item, tags::SERIES_INSTANCE_UID)),
        }
    }

    /// 是否具备引用所需的全部UID
    pub fn is_referenceable(&self) -> bool {
        [
            &self.sop_class_uid,
            &self.sop_instance_uid,
            &self.study_instance_uid,
            &self.series_instance_uid,
        ]
        .iter()
        .all(|uid| uid.is_some())
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        match (self.rows, self.columns) {
            (Some(rows), Some(columns)) => Some((rows, columns)),
            _ => None,
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "实例: 患者ID={}, 检查UID={}, 序列UID={}, 模态={}",
            self.patient_id.as_deref().unwrap_or("未知"),
            self.study_instance_uid.as_deref().unwrap_or("未知"),
            self.series_instance_uid.as_deref().unwrap_or("未知"),
            self.modality.as_deref().unwrap_or("未知")
        )
    }
}

/// 已解析的被引用实例 (只读)
#[derive(Debug, Clone)]
pub struct ReferencedDocument {
    dataset: Arc<InMemDicomObject>,
    summary: DocumentSummary,
}

impl ReferencedDocument {
    pub fn from_object(dataset: InMemDicomObject) -> Self {
        let summary = DocumentSummary::extract(&dataset);
        Self {
            dataset: Arc::new(dataset),
            summary,
        }
    }

    /// 读取DICOM文件
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("读取被引用实例: {:?}", path);
        let obj = open_file(path).map_err(|e| {
            error!("被引用实例读取失败: {:?}, 错误: {}", path, e);
            IodError::ReferenceResolution(format!("{}: {}", path.display(), e))
        })?;
        let document = Self::from_object(obj.into_inner());
        info!("{}", document.summary.summary_line());
        Ok(document)
    }

    pub fn dataset(&self) -> &InMemDicomObject {
        &self.dataset
    }

    pub fn summary(&self) -> &DocumentSummary {
        &self.summary
    }

    fn required<'a>(&self, value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| IodError::ReferenceResolution(format!("被引用实例缺少 {}", name)))
    }

    pub fn sop_class_uid(&self) -> Result<&str> {
        self.required(&self.summary.sop_class_uid, "SOPClassUID")
    }

    pub fn sop_instance_uid(&self) -> Result<&str> {
        self.required(&self.summary.sop_instance_uid, "SOPInstanceUID")
    }

    pub fn study_instance_uid(&self) -> Result<&str> {
        self.required(&self.summary.study_instance_uid, "StudyInstanceUID")
    }

    pub fn series_instance_uid(&self) -> Result<&str> {
        self.required(&self.summary.series_instance_uid, "SeriesInstanceUID")
    }

    pub fn sop_reference(&self) -> Result<SopReference> {
        Ok(SopReference::new(self.sop_class_uid()?, self.sop_instance_uid()?))
    }

    /// 引用条目 (ReferencedSOPClassUID, ReferencedSOPInstanceUID)
    pub fn reference_item(&self) -> Result<ItemSpec> {
        Ok(ItemSpec::new()
            .with("ReferencedSOPClassUID", self.sop_class_uid()?)
            .with("ReferencedSOPInstanceUID", self.sop_instance_uid()?))
    }
}

/// 可以解析为被引用实例的值
pub trait ResolveReference {
    fn resolve(&self) -> Result<ReferencedDocument>;
}

impl ResolveReference for ReferencedDocument {
    fn resolve(&self) -> Result<ReferencedDocument> {
        Ok(self.clone())
    }
}

impl ResolveReference for InMemDicomObject {
    fn resolve(&self) -> Result<ReferencedDocument> {
        Ok(ReferencedDocument::from_object(self.clone()))
    }
}

impl ResolveReference for Path {
    fn resolve(&self) -> Result<ReferencedDocument> {
        ReferencedDocument::from_file(self)
    }
}

impl ResolveReference for PathBuf {
    fn resolve(&self) -> Result<ReferencedDocument> {
        ReferencedDocument::from_file(self)
    }
}

impl ResolveReference for str {
    fn resolve(&self) -> Result<ReferencedDocument> {
        ReferencedDocument::from_file(Path::new(self))
    }
}

impl<T: ResolveReference + ?Sized> ResolveReference for &T {
    fn resolve(&self) -> Result<ReferencedDocument> {
        (**self).resolve()
    }
}

/// 解析全部引用，任一失败即返回错误
pub fn resolve_all<R: ResolveReference>(references: &[R]) -> Result<Vec<ReferencedDocument>> {
    references.iter().map(ResolveReference::resolve).collect()
}

/// 按 检查 → 序列 → 实例 分组的证据序列条目，保持首次出现的顺序
pub fn evidence_items(documents: &[ReferencedDocument]) -> Result<Vec<ItemSpec>> {
    let mut studies: Vec<(String, Vec<(String, Vec<ItemSpec>)>)> = Vec::new();

    for document in documents {
        let study_uid = document.study_instance_uid()?;
        let series_uid = document.series_instance_uid()?;
        let instance = document.reference_item()?;

        let study_index = match studies.iter().position(|(uid, _)| uid == study_uid) {
            Some(index) => index,
            None => {
                studies.push((study_uid.to_string(), Vec::new()));
                studies.len() - 1
            }
        };
        let series = &mut studies[study_index].1;
        match series.iter_mut().find(|(uid, _)| uid == series_uid) {
            Some((_, instances)) => instances.push(instance),
            None => series.push((series_uid.to_string(), vec![instance])),
        }
    }

    Ok(studies
        .into_iter()
        .map(|(study_uid, series)| {
            let series_items: Vec<ItemSpec> = series
                .into_iter()
                .map(|(series_uid, instances)| {
                    ItemSpec::new()
                        .with("SeriesInstanceUID", series_uid)
                        .with("ReferencedSOPSequence", instances)
                })
                .collect();
            ItemSpec::new()
                .with("StudyInstanceUID", study_uid)
                .with("ReferencedSeriesSequence", series_items)
        })
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    pub(crate) fn instance(study: &str, series: &str, sop: &str) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        let mut put = |tag, vr, value: &str| {
            obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
        };
        put(tags::SOP_CLASS_UID, VR::UI, "1.2.840.10008.5.1.4.1.1.1");
        put(tags::SOP_INSTANCE_UID, VR::UI, sop);
        put(tags::STUDY_INSTANCE_UID, VR::UI, study);
        put(tags::SERIES_INSTANCE_UID, VR::UI, series);
        put(tags::PATIENT_ID, VR::LO, "PAT001");
        put(tags::MODALITY, VR::CS, "CR");
        put(tags::STUDY_DATE, VR::DA, "20240101");
        put(tags::STUDY_TIME, VR::TM, "120000");
        obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(512_u16)));
        obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(256_u16)));
        obj
    }

    #[test]
    fn test_summary_extraction() {
        let document = instance("1.2.3", "1.2.3.4", "1.2.3.4.5").resolve().unwrap();
        let summary = document.summary();

        assert_eq!(summary.patient_id.as_deref(), Some("PAT001"));
        assert_eq!(summary.image_size(), Some((512, 256)));
        assert!(summary.is_referenceable());
        assert_eq!(summary.patient_name, None);
        assert_eq!(document.sop_reference().unwrap().sop_instance_uid, "1.2.3.4.5");
    }

    #[test]
    fn test_missing_uid_is_resolution_error() {
        let document = InMemDicomObject::new_empty().resolve().unwrap();
        assert!(!document.summary().is_referenceable());
        assert!(matches!(document.sop_class_uid(), Err(IodError::ReferenceResolution(_))));
    }

    #[test]
    fn test_missing_file_is_resolution_error() {
        let err = Path::new("/nonexistent/instance.dcm").resolve().unwrap_err();
        assert!(matches!(err, IodError::ReferenceResolution(_)));
    }

    #[test]
    fn test_evidence_grouping() {
        let documents = resolve_all(&[
            instance("1.1", "1.1.1", "1.1.1.1"),
            instance("1.1", "1.1.2", "1.1.2.1"),
            instance("1.1", "1.1.1", "1.1.1.2"),
            instance("2.2", "2.2.1", "2.2.1.1"),
        ])
        .unwrap();

        let items = evidence_items(&documents).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].get("StudyInstanceUID").and_then(|v| v.as_text()), Some("1.1"));

        let series = items[0].get("ReferencedSeriesSequence").and_then(|v| v.as_items()).unwrap();
        assert_eq!(series.len(), 2);
        let instances = series[0].get("ReferencedSOPSequence").and_then(|v| v.as_items()).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(
            instances[1].get("ReferencedSOPInstanceUID").and_then(|v| v.as_text()),
            Some("1.1.1.2")
        );
    }
}
