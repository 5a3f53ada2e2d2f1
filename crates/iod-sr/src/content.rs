//! 内容树节点
//!
//! 结构化报告的每个内容项由关系类型、值类型、概念名称、值和子节点组成。
//! 节点先构建为类型化的树，写入记录时再渲染为序列条目，交给序列构建器
//! 生成真正的数据集。

use iod_core::{CodedConcept, IodError, Result};
use iod_dicom::{GraphicType, ItemSpec, ReferencedDocument};
use serde::{Deserialize, Serialize};
use std::fmt;

/// DCMR 模板映射资源UID
pub const DCMR_MAPPING_RESOURCE_UID: &str = "1.2.840.10008.8.1.1";

/// 子节点与父节点的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipType {
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "HAS CONCEPT MOD")]
    HasConceptMod,
    #[serde(rename = "HAS OBS CONTEXT")]
    HasObsContext,
    #[serde(rename = "HAS ACQ CONTEXT")]
    HasAcqContext,
    #[serde(rename = "INFERRED FROM")]
    InferredFrom,
    #[serde(rename = "SELECTED FROM")]
    SelectedFrom,
}

impl RelationshipType {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::HasConceptMod => "HAS CONCEPT MOD",
            RelationshipType::HasObsContext => "HAS OBS CONTEXT",
            RelationshipType::HasAcqContext => "HAS ACQ CONTEXT",
            RelationshipType::InferredFrom => "INFERRED FROM",
            RelationshipType::SelectedFrom => "SELECTED FROM",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 内容项的值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Container,
    Code,
    Text,
    Num,
    UidRef,
    Image,
    Scoord,
    Date,
    Time,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Container => "CONTAINER",
            ValueType::Code => "CODE",
            ValueType::Text => "TEXT",
            ValueType::Num => "NUM",
            ValueType::UidRef => "UIDREF",
            ValueType::Image => "IMAGE",
            ValueType::Scoord => "SCOORD",
            ValueType::Date => "DATE",
            ValueType::Time => "TIME",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 对一个图像实例的引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    /// 多帧图像中被引用的帧 (从 1 开始)
    pub frame_numbers: Vec<u32>,
    /// 分割对象中被引用的段
    pub segment_numbers: Vec<u16>,
}

impl ImageReference {
    pub fn new(sop_class_uid: impl Into<String>, sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_class_uid: sop_class_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
            frame_numbers: Vec::new(),
            segment_numbers: Vec::new(),
        }
    }

    pub fn from_document(document: &ReferencedDocument) -> Result<Self> {
        Ok(Self::new(document.sop_class_uid()?, document.sop_instance_uid()?))
    }

    pub fn with_frames(mut self, frames: impl IntoIterator<Item = u32>) -> Self {
        self.frame_numbers.extend(frames);
        self
    }

    pub fn with_segment(mut self, segment_number: u16) -> Self {
        self.segment_numbers.push(segment_number);
        self
    }

    /// ReferencedSOPSequence 条目
    pub fn to_item(&self) -> ItemSpec {
        let mut item = ItemSpec::new()
            .with("ReferencedSOPClassUID", self.sop_class_uid.as_str())
            .with("ReferencedSOPInstanceUID", self.sop_instance_uid.as_str());
        if !self.frame_numbers.is_empty() {
            item.set("ReferencedFrameNumber", self.frame_numbers.clone());
        }
        if !self.segment_numbers.is_empty() {
            item.set("ReferencedSegmentNumber", self.segment_numbers.clone());
        }
        item
    }
}

/// 图像像素坐标系中的二维坐标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub graphic_type: GraphicType,
    /// 扁平的 (列, 行) 坐标列表
    pub data: Vec<f64>,
    pub frame_number: Option<u32>,
}

impl Coordinates {
    pub fn new(graphic_type: GraphicType, data: Vec<f64>) -> Self {
        Self {
            graphic_type,
            data,
            frame_number: None,
        }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::new(GraphicType::Point, vec![x, y])
    }

    pub fn polyline(data: Vec<f64>) -> Self {
        Self::new(GraphicType::Polyline, data)
    }

    /// 圆心与圆周上一点
    pub fn circle(center: [f64; 2], edge: [f64; 2]) -> Self {
        Self::new(GraphicType::Circle, vec![center[0], center[1], edge[0], edge[1]])
    }

    pub fn on_frame(mut self, frame_number: u32) -> Self {
        self.frame_number = Some(frame_number);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.graphic_type.check_coordinates(&self.data)
    }

    /// 检查图形类型与坐标个数
    pub fn ensure_graphic_type(&self, expected: GraphicType) -> Result<()> {
        if self.graphic_type != expected {
            return Err(IodError::InvalidSpatialData(format!(
                "需要 {}，实际为 {}",
                expected, self.graphic_type
            )));
        }
        self.validate()
    }
}

/// 内容项的值
#[derive(Debug, Clone, PartialEq)]
pub enum ContentValue {
    Container { template: Option<String> },
    Code(CodedConcept),
    Text(String),
    Num { value: f64, unit: CodedConcept },
    UidRef(String),
    Image(ImageReference),
    Scoord { graphic_type: GraphicType, data: Vec<f64> },
    Date(String),
    Time(String),
}

impl ContentValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            ContentValue::Container { .. } => ValueType::Container,
            ContentValue::Code(_) => ValueType::Code,
            ContentValue::Text(_) => ValueType::Text,
            ContentValue::Num { .. } => ValueType::Num,
            ContentValue::UidRef(_) => ValueType::UidRef,
            ContentValue::Image(_) => ValueType::Image,
            ContentValue::Scoord { .. } => ValueType::Scoord,
            ContentValue::Date(_) => ValueType::Date,
            ContentValue::Time(_) => ValueType::Time,
        }
    }

    fn write_into(&self, item: &mut ItemSpec) {
        match self {
            ContentValue::Container { template } => {
                item.set("ContinuityOfContent", "SEPARATE");
                if let Some(identifier) = template {
                    item.set("ContentTemplateSequence", template_item(identifier));
                }
            }
            ContentValue::Code(code) => item.set("ConceptCodeSequence", ItemSpec::code(code)),
            ContentValue::Text(text) => item.set("TextValue", text.as_str()),
            ContentValue::Num { value, unit } => item.set(
                "MeasuredValueSequence",
                ItemSpec::new()
                    .with("MeasurementUnitsCodeSequence", ItemSpec::code(unit))
                    .with("NumericValue", *value),
            ),
            ContentValue::UidRef(uid) => item.set("UID", uid.as_str()),
            ContentValue::Image(reference) => item.set("ReferencedSOPSequence", reference.to_item()),
            ContentValue::Scoord { graphic_type, data } => {
                item.set("GraphicData", data.clone());
                item.set("GraphicType", graphic_type.as_str());
            }
            ContentValue::Date(date) => item.set("Date", date.as_str()),
            ContentValue::Time(time) => item.set("Time", time.as_str()),
        }
    }
}

/// DCMR 模板条目
pub fn template_item(identifier: &str) -> ItemSpec {
    ItemSpec::new()
        .with("MappingResource", "DCMR")
        .with("MappingResourceUID", DCMR_MAPPING_RESOURCE_UID)
        .with("TemplateIdentifier", identifier)
}

/// 内容树节点
#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    pub relationship: RelationshipType,
    pub concept: Option<CodedConcept>,
    pub value: ContentValue,
    pub children: Vec<ContentNode>,
}

impl ContentNode {
    pub fn new(relationship: RelationshipType, concept: Option<CodedConcept>, value: ContentValue) -> Self {
        Self {
            relationship,
            concept,
            value,
            children: Vec::new(),
        }
    }

    pub fn container(relationship: RelationshipType, concept: CodedConcept) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Container { template: None })
    }

    pub fn code(relationship: RelationshipType, concept: CodedConcept, code: CodedConcept) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Code(code))
    }

    pub fn text(relationship: RelationshipType, concept: CodedConcept, text: impl Into<String>) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Text(text.into()))
    }

    pub fn num(relationship: RelationshipType, concept: CodedConcept, value: f64, unit: CodedConcept) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Num { value, unit })
    }

    pub fn uid_ref(relationship: RelationshipType, concept: CodedConcept, uid: impl Into<String>) -> Self {
        Self::new(relationship, Some(concept), ContentValue::UidRef(uid.into()))
    }

    pub fn image(relationship: RelationshipType, reference: ImageReference) -> Self {
        Self::new(relationship, None, ContentValue::Image(reference))
    }

    pub fn date(relationship: RelationshipType, concept: CodedConcept, date: impl Into<String>) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Date(date.into()))
    }

    pub fn time(relationship: RelationshipType, concept: CodedConcept, time: impl Into<String>) -> Self {
        Self::new(relationship, Some(concept), ContentValue::Time(time.into()))
    }

    /// 空间坐标节点，嵌套一个 SELECTED FROM 图像节点标识坐标所在的图像
    ///
    /// 坐标带帧号时，帧号写入被引用图像的 ReferencedFrameNumber。
    pub fn scoord(
        relationship: RelationshipType,
        coordinates: &Coordinates,
        source: ImageReference,
    ) -> Result<Self> {
        coordinates.validate()?;
        let source = match coordinates.frame_number {
            Some(frame) => source.with_frames([frame]),
            None => source,
        };
        let node = Self::new(
            relationship,
            None,
            ContentValue::Scoord {
                graphic_type: coordinates.graphic_type,
                data: coordinates.data.clone(),
            },
        )
        .with_child(Self::image(RelationshipType::SelectedFrom, source));
        Ok(node)
    }

    pub fn with_concept(mut self, concept: CodedConcept) -> Self {
        self.concept = Some(concept);
        self
    }

    /// 设置容器节点的模板，非容器节点忽略
    pub fn with_template(mut self, identifier: &str) -> Self {
        if let ContentValue::Container { template } = &mut self.value {
            *template = Some(identifier.to_string());
        }
        self
    }

    pub fn with_child(mut self, child: ContentNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = ContentNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn push(&mut self, child: ContentNode) {
        self.children.push(child);
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    /// 按概念名称代码值查找直接子节点
    pub fn child(&self, code_value: &str) -> Option<&ContentNode> {
        self.children
            .iter()
            .find(|c| c.concept.as_ref().map(|k| k.value.as_str()) == Some(code_value))
    }

    /// 渲染为 ContentSequence 条目
    pub fn to_item(&self) -> ItemSpec {
        let mut item = ItemSpec::new()
            .with("RelationshipType", self.relationship.as_str())
            .with("ValueType", self.value_type().as_str());
        if let Some(concept) = &self.concept {
            item.set("ConceptNameCodeSequence", ItemSpec::code(concept));
        }
        self.value.write_into(&mut item);
        if !self.children.is_empty() {
            item.set("ContentSequence", render(&self.children));
        }
        item
    }
}

/// 渲染节点列表
pub fn render(nodes: &[ContentNode]) -> Vec<ItemSpec> {
    nodes.iter().map(ContentNode::to_item).collect()
}
