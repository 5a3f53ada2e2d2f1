//! 属性字典
//!
//! 属性名称到标签、值表示 (VR) 与值多重性的查询接口。
//! 默认实现直接委托给 dicom-rs 自带的标准数据字典。

use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;
use std::fmt::Debug;
use std::sync::Arc;

/// 值多重性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    Single,
    Multiple,
}

/// 属性描述 (名称, 标签, 值表示, 多重性)
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub tag: Tag,
    pub vr: VR,
    pub multiplicity: Multiplicity,
}

/// 本系统使用到的多值属性
const MULTI_VALUED_ATTRIBUTES: &[&str] = &[
    "ImageType",
    "FrameType",
    "PatientOrientation",
    "PixelSpacing",
    "PresentationPixelSpacing",
    "ImageOrientationPatient",
    "ImagePositionPatient",
    "ImageOrientationSlide",
    "SoftwareVersions",
    "GraphicData",
    "AnchorPoint",
    "BoundingBoxTopLeftHandCorner",
    "BoundingBoxBottomRightHandCorner",
    "DisplayedAreaTopLeftHandCorner",
    "DisplayedAreaBottomRightHandCorner",
    "TextColorCIELabValue",
    "ShadowColorCIELabValue",
    "PatternOnColorCIELabValue",
    "GraphicLayerRecommendedDisplayCIELabValue",
    "ReferencedFrameNumber",
    "ReferencedSegmentNumber",
    "WindowCenter",
    "WindowWidth",
];

/// 属性字典接口
///
/// 字典是只读的进程级状态，可被多个记录并发读取。
pub trait AttributeDictionary: Debug + Send + Sync {
    /// 由属性名称查询标签，未知名称返回 `None`
    fn identifier_for(&self, name: &str) -> Option<Tag>;

    /// 查询标签声明的值表示，未知标签返回 `UN`
    fn value_type_of(&self, tag: Tag) -> VR;

    /// 由标签反查属性名称
    fn keyword_of(&self, tag: Tag) -> Option<&str>;

    /// 查询属性的值多重性
    fn multiplicity_of(&self, name: &str) -> Multiplicity {
        if MULTI_VALUED_ATTRIBUTES.contains(&name) {
            Multiplicity::Multiple
        } else {
            Multiplicity::Single
        }
    }

    /// 完整的属性描述
    fn lookup(&self, name: &str) -> Option<Attribute> {
        let tag = self.identifier_for(name)?;
        Some(Attribute {
            name: name.to_string(),
            tag,
            vr: self.value_type_of(tag),
            multiplicity: self.multiplicity_of(name),
        })
    }

    /// 标签是否为序列 (SQ)
    fn is_sequence(&self, tag: Tag) -> bool {
        self.value_type_of(tag) == VR::SQ
    }
}

/// 基于DICOM标准数据字典的实现
#[derive(Debug)]
pub struct StandardAttributeDictionary {
    inner: StandardDataDictionary,
}

impl Default for StandardAttributeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardAttributeDictionary {
    pub fn new() -> Self {
        Self {
            inner: StandardDataDictionary,
        }
    }
}

impl AttributeDictionary for StandardAttributeDictionary {
    fn identifier_for(&self, name: &str) -> Option<Tag> {
        self.inner.by_name(name).map(|entry| entry.tag_range().inner())
    }

    fn value_type_of(&self, tag: Tag) -> VR {
        self.inner
            .by_tag(tag)
            .map(|entry| entry.vr().relaxed())
            .unwrap_or(VR::UN)
    }

    fn keyword_of(&self, tag: Tag) -> Option<&str> {
        self.inner.by_tag(tag).map(|entry| entry.alias())
    }
}

/// 共享的标准属性字典
pub fn standard_dictionary() -> Arc<dyn AttributeDictionary> {
    Arc::new(StandardAttributeDictionary::new())
}
