//! 关键对象选择文档
//!
//! 根节点 "Of Interest" (模板 2010) 下列出被选中的图像，可选地指定帧号。

use crate::content::{ContentNode, ImageReference, RelationshipType};
use crate::document::{append_root_content, initiate_document};
use iod_core::{IodError, Result};
use iod_dicom::reference::resolve_all;
use iod_dicom::{Record, RecordVariant, ResolveReference};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct KeyObjectDocument {
    record: Record,
}

impl Default for KeyObjectDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyObjectDocument {
    pub fn new() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::KeyObjectSelection),
        }
    }

    pub fn initiate<R: ResolveReference>(&mut self, references: &[R]) -> Result<()> {
        initiate_document(&mut self.record, references)?;
        info!(
            "关键对象选择文档已初始化: {}",
            self.record.sop_instance_uid().unwrap_or_default()
        );
        Ok(())
    }

    /// 为每个被引用实例追加一个 CONTAINS IMAGE 节点
    ///
    /// `frames` 提供时必须与引用一一对应，空列表表示不引用具体帧。
    pub fn add_key_documents<R: ResolveReference>(
        &mut self,
        references: &[R],
        frames: Option<&[Vec<u32>]>,
    ) -> Result<()> {
        if let Some(frames) = frames {
            if frames.len() != references.len() {
                warn!("帧列表数 {} 与引用数 {} 不一致", frames.len(), references.len());
                return Err(IodError::InvalidArgument(format!(
                    "帧列表数 {} 与引用数 {} 不一致",
                    frames.len(),
                    references.len()
                )));
            }
        }

        let documents = resolve_all(references)?;
        let nodes = documents
            .iter()
            .enumerate()
            .map(|(index, document)| {
                let mut reference = ImageReference::from_document(document)?;
                if let Some(frames) = frames {
                    reference = reference.with_frames(frames[index].iter().copied());
                }
                Ok(ContentNode::image(RelationshipType::Contains, reference))
            })
            .collect::<Result<Vec<_>>>()?;

        append_root_content(&mut self.record, &nodes)?;
        info!("已添加关键图像: {}", nodes.len());
        Ok(())
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}
