//! 记录写出
//!
//! 记录以 DICOM Part 10 文件写出，传输语法固定为显式VR小端。

use crate::record::Record;
use dicom::dictionary_std::uids;
use dicom::object::meta::FileMetaTableBuilder;
use iod_core::{IodError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 文件元信息中的实现类UID
pub const IMPLEMENTATION_CLASS_UID: &str = "1.2.752.24.16.4.1";

/// 记录写出接口，每个记录调用一次
pub trait RecordWriter {
    /// `preserve_original_layout` 为真时沿用记录创建时生成的文件元信息，
    /// 否则由数据集当前的SOP类与实例UID重新生成
    fn write(&self, record: &Record, destination: &Path, preserve_original_layout: bool) -> Result<PathBuf>;
}

/// 写入本地文件系统
#[derive(Debug, Default, Clone, Copy)]
pub struct FileWriter;

impl FileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl RecordWriter for FileWriter {
    fn write(&self, record: &Record, destination: &Path, preserve_original_layout: bool) -> Result<PathBuf> {
        let (class_uid, instance_uid) = if preserve_original_layout {
            (
                record.media_storage_sop_class_uid().to_string(),
                record.media_storage_sop_instance_uid().to_string(),
            )
        } else {
            (
                record
                    .text("SOPClassUID")
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| record.media_storage_sop_class_uid().to_string()),
                record
                    .sop_instance_uid()
                    .unwrap_or_else(|| record.media_storage_sop_instance_uid().to_string()),
            )
        };

        let meta = FileMetaTableBuilder::new()
            .media_storage_sop_class_uid(class_uid)
            .media_storage_sop_instance_uid(instance_uid)
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .implementation_class_uid(IMPLEMENTATION_CLASS_UID)
            .build()
            .map_err(|e| IodError::Write(format!("文件元信息无效: {}", e)))?;

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!("写出记录 {} 到 {:?}", record.variant(), destination);
        record
            .dataset()
            .clone()
            .with_exact_meta(meta)
            .write_to_file(destination)
            .map_err(|e| {
                error!("记录写出失败: {:?}, 错误: {}", destination, e);
                IodError::Write(format!("{}: {}", destination.display(), e))
            })?;

        info!("记录已写出: {:?}", destination);
        Ok(destination.to_path_buf())
    }
}

/// 输出目录布局: `<root>/<检查UID>/series_<NNN>/<实例:06>.dcm`
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, study_instance_uid: &str, series_index: u32, instance_index: u32) -> PathBuf {
        self.root
            .join(study_instance_uid)
            .join(format!("series_{:03}", series_index))
            .join(format!("{:06}.dcm", instance_index))
    }

    /// 按记录的检查UID计算路径
    pub fn path_for_record(&self, record: &Record, series_index: u32, instance_index: u32) -> Result<PathBuf> {
        let study_uid = record
            .study_instance_uid()
            .ok_or_else(|| IodError::Write("记录缺少 StudyInstanceUID".to_string()))?;
        Ok(self.path_for(&study_uid, series_index, instance_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordVariant;
    use crate::value::read_text;
    use dicom::dictionary_std::tags;
    use dicom::object::open_file;

    #[test]
    fn test_layout_paths() {
        let layout = OutputLayout::new("/data/out");
        assert_eq!(
            layout.path_for("1.2.3", 1, 7),
            PathBuf::from("/data/out/1.2.3/series_001/000007.dcm")
        );
    }

    #[test]
    fn test_layout_requires_study_uid() {
        let record = Record::create_empty(RecordVariant::CrImage);
        assert!(OutputLayout::new("/tmp").path_for_record(&record, 1, 1).is_err());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = Record::create_empty(RecordVariant::BasicTextSr);
        record.initiate();
        record.set_attribute("PatientName", "Doe^John");

        let layout = OutputLayout::new(dir.path());
        let path = layout.path_for_record(&record, 1, 1).unwrap();
        FileWriter::new().write(&record, &path, false).unwrap();

        let obj = open_file(&path).unwrap();
        assert_eq!(
            obj.meta().media_storage_sop_instance_uid.trim_end_matches('\0'),
            record.sop_instance_uid().unwrap()
        );
        assert_eq!(
            obj.meta().implementation_class_uid.trim_end_matches('\0'),
            IMPLEMENTATION_CLASS_UID
        );
        assert_eq!(read_text(&obj, tags::PATIENT_NAME).as_deref(), Some("Doe^John"));
        assert_eq!(read_text(&obj, tags::MODALITY).as_deref(), Some("SR"));
    }

    #[test]
    fn test_preserved_layout_uses_creation_meta() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = Record::create_empty(RecordVariant::KeyObjectSelection);
        record.initiate();
        let path = dir.path().join("kos.dcm");

        FileWriter::new().write(&record, &path, true).unwrap();

        let obj = open_file(&path).unwrap();
        assert_eq!(
            obj.meta().media_storage_sop_instance_uid.trim_end_matches('\0'),
            record.media_storage_sop_instance_uid()
        );
    }
}
