//! 序列构建器
//!
//! 把普通键值条目转换为序列条目：先填入按序列类型定义的默认值，再叠加
//! 调用方提供的全部键，嵌套的序列键递归构建。互斥的属性组用带标签的
//! 联合体 (`TextAnchor`, `SeriesReference`) 表示，构建后的条目始终只
//! 携带其中一种表示。

use crate::dictionary::AttributeDictionary;
use crate::module::empty_element;
use crate::value::{AttributeValue, ItemSpec};
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use iod_core::utils::generate_dicom_uid;
use iod_core::{IodError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// 默认引用的SOP类 (CR图像存储)
const DEFAULT_REFERENCED_SOP_CLASS_UID: &str = "1.2.840.10008.5.1.4.1.1.1";

/// 白色与黑色 (CIELab)
const CIELAB_WHITE: [i64; 3] = [65535, 32896, 32896];
const CIELAB_BLACK: [i64; 3] = [0, 32896, 32896];

/// 具有专用默认值的序列类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    ConceptNameCode,
    ConceptCode,
    PerformedProcedureCode,
    MeasurementUnitsCode,
    Content,
    ContentTemplate,
    CurrentRequestedProcedureEvidence,
    MeasuredValue,
    ReferencedSeries,
    ReferencedImage,
    ReferencedSop,
    DisplayedAreaSelection,
    GraphicAnnotation,
    TextObject,
    TextStyle,
    GraphicObject,
    LineStyle,
    FillStyle,
    GraphicLayer,
    SoftcopyVoiLut,
    /// 通用构建器，仅透传提供的键
    General,
}

impl SequenceKind {
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "ConceptNameCodeSequence" => SequenceKind::ConceptNameCode,
            "ConceptCodeSequence" => SequenceKind::ConceptCode,
            "PerformedProcedureCodeSequence" => SequenceKind::PerformedProcedureCode,
            "MeasurementUnitsCodeSequence" => SequenceKind::MeasurementUnitsCode,
            "ContentSequence" => SequenceKind::Content,
            "ContentTemplateSequence" => SequenceKind::ContentTemplate,
            "CurrentRequestedProcedureEvidenceSequence" => {
                SequenceKind::CurrentRequestedProcedureEvidence
            }
            "MeasuredValueSequence" => SequenceKind::MeasuredValue,
            "ReferencedSeriesSequence" => SequenceKind::ReferencedSeries,
            "ReferencedImageSequence" => SequenceKind::ReferencedImage,
            "ReferencedSOPSequence" => SequenceKind::ReferencedSop,
            "DisplayedAreaSelectionSequence" => SequenceKind::DisplayedAreaSelection,
            "GraphicAnnotationSequence" => SequenceKind::GraphicAnnotation,
            "TextObjectSequence" => SequenceKind::TextObject,
            "TextStyleSequence" => SequenceKind::TextStyle,
            "GraphicObjectSequence" => SequenceKind::GraphicObject,
            "LineStyleSequence" => SequenceKind::LineStyle,
            "FillStyleSequence" => SequenceKind::FillStyle,
            "GraphicLayerSequence" => SequenceKind::GraphicLayer,
            "SoftcopyVOILUTSequence" => SequenceKind::SoftcopyVoiLut,
            _ => SequenceKind::General,
        }
    }

    /// 每个条目的默认值，每次调用都会重新生成UID
    pub fn defaults(self) -> ItemSpec {
        match self {
            SequenceKind::ConceptNameCode
            | SequenceKind::ConceptCode
            | SequenceKind::PerformedProcedureCode
            | SequenceKind::MeasurementUnitsCode => ItemSpec::new().with("CodeMeaning", ""),
            SequenceKind::ContentTemplate => ItemSpec::new()
                .with("MappingResource", "")
                .with("TemplateIdentifier", ""),
            SequenceKind::CurrentRequestedProcedureEvidence => ItemSpec::new()
                .with("StudyInstanceUID", "")
                .with("ReferencedSeriesSequence", Vec::<ItemSpec>::new()),
            SequenceKind::MeasuredValue => ItemSpec::new()
                .with("NumericValue", AttributeValue::Empty)
                .with("MeasurementUnitsCodeSequence", Vec::<ItemSpec>::new()),
            SequenceKind::ReferencedSeries => {
                ItemSpec::new().with("SeriesInstanceUID", generate_dicom_uid())
            }
            SequenceKind::ReferencedImage | SequenceKind::ReferencedSop => ItemSpec::new()
                .with("ReferencedSOPClassUID", DEFAULT_REFERENCED_SOP_CLASS_UID)
                .with("ReferencedSOPInstanceUID", generate_dicom_uid()),
            SequenceKind::DisplayedAreaSelection => ItemSpec::new()
                .with("DisplayedAreaTopLeftHandCorner", vec![1_i64, 1])
                .with("DisplayedAreaBottomRightHandCorner", vec![100_i64, 100])
                .with("PresentationSizeMode", "SCALE TO FIT")
                .with("PresentationPixelSpacing", vec!["1.0", "1.0"]),
            SequenceKind::GraphicAnnotation => ItemSpec::new().with("GraphicLayer", "DEFAULT"),
            SequenceKind::TextObject => {
                ItemSpec::new().with("UnformattedTextValue", "DEFAULT VALUE")
            }
            SequenceKind::TextStyle => ItemSpec::new()
                .with("CSSFontName", "Time New Roman")
                .with("TextColorCIELabValue", CIELAB_WHITE.to_vec())
                .with("ShadowStyle", "NORMAL")
                .with("ShadowOffsetX", 1.0)
                .with("ShadowOffsetY", 1.0)
                .with("ShadowColorCIELabValue", CIELAB_BLACK.to_vec())
                .with("ShadowOpacity", 1.0)
                .with("Underlined", "N")
                .with("Bold", "N")
                .with("Italic", "N"),
            SequenceKind::GraphicObject => ItemSpec::new()
                .with("GraphicAnnotationUnits", "PIXEL")
                .with("GraphicDimensions", 2)
                .with("NumberOfGraphicPoints", 1)
                .with("GraphicData", vec![100.0, 100.0])
                .with("GraphicType", "POINT"),
            SequenceKind::LineStyle => ItemSpec::new()
                .with("PatternOnColorCIELabValue", CIELAB_WHITE.to_vec())
                .with("PatternOnOpacity", 1.0)
                .with("LineThickness", 1.0)
                .with("LineDashingStyle", "SOLID")
                .with("ShadowStyle", "NORMAL")
                .with("ShadowOffsetX", 1.0)
                .with("ShadowOffsetY", 1.0)
                .with("ShadowColorCIELabValue", CIELAB_BLACK.to_vec())
                .with("ShadowOpacity", 1.0),
            SequenceKind::FillStyle => ItemSpec::new()
                .with("PatternOnColorCIELabValue", CIELAB_WHITE.to_vec())
                .with("PatternOnOpacity", 1.0)
                .with("FillMode", "SOLID"),
            SequenceKind::GraphicLayer => ItemSpec::new()
                .with("GraphicLayer", "DEFAULT")
                .with("GraphicLayerOrder", "1"),
            SequenceKind::SoftcopyVoiLut => ItemSpec::new()
                .with("WindowCenter", "50")
                .with("WindowWidth", "100"),
            SequenceKind::Content | SequenceKind::General => ItemSpec::new(),
        }
    }
}

fn numbers_or(item: &ItemSpec, key: &str, fallback: &[f64]) -> Vec<f64> {
    match item.get(key).map(|v| v.as_numbers(key)) {
        Some(Ok(values)) if !values.is_empty() => values,
        Some(Err(e)) => {
            warn!("{} 无法解析，使用默认值: {}", key, e);
            fallback.to_vec()
        }
        _ => fallback.to_vec(),
    }
}

fn text_or(item: &ItemSpec, key: &str, fallback: &str) -> String {
    item.get(key)
        .and_then(|v| v.as_text())
        .unwrap_or(fallback)
        .to_string()
}

/// 文本注释的定位方式：锚点或包围盒，二者互斥
#[derive(Debug, Clone, PartialEq)]
pub enum TextAnchor {
    Point {
        point: Vec<f64>,
        units: String,
        visible: bool,
    },
    BoundingBox {
        top_left: Vec<f64>,
        bottom_right: Vec<f64>,
        units: String,
        justification: String,
    },
}

impl Default for TextAnchor {
    fn default() -> Self {
        TextAnchor::Point {
            point: vec![100.0, 100.0],
            units: "PIXEL".to_string(),
            visible: false,
        }
    }
}

impl TextAnchor {
    pub const POINT_KEYS: [&'static str; 3] =
        ["AnchorPoint", "AnchorPointAnnotationUnits", "AnchorPointVisibility"];
    pub const BOUNDING_BOX_KEYS: [&'static str; 4] = [
        "BoundingBoxTopLeftHandCorner",
        "BoundingBoxBottomRightHandCorner",
        "BoundingBoxAnnotationUnits",
        "BoundingBoxTextHorizontalJustification",
    ];

    /// 从条目解析定位方式；同时提供锚点与包围盒时锚点优先
    pub fn from_item(item: &ItemSpec) -> Self {
        if item.contains("AnchorPoint") {
            return TextAnchor::Point {
                point: numbers_or(item, "AnchorPoint", &[100.0, 100.0]),
                units: text_or(item, "AnchorPointAnnotationUnits", "PIXEL"),
                visible: text_or(item, "AnchorPointVisibility", "N") == "Y",
            };
        }
        if item.contains("BoundingBoxTopLeftHandCorner")
            || item.contains("BoundingBoxBottomRightHandCorner")
        {
            return TextAnchor::BoundingBox {
                top_left: numbers_or(item, "BoundingBoxTopLeftHandCorner", &[0.0, 0.0]),
                bottom_right: numbers_or(item, "BoundingBoxBottomRightHandCorner", &[0.0, 0.0]),
                units: text_or(item, "BoundingBoxAnnotationUnits", "PIXEL"),
                justification: text_or(item, "BoundingBoxTextHorizontalJustification", "LEFT"),
            };
        }
        TextAnchor::default()
    }

    pub fn to_item(&self) -> ItemSpec {
        match self {
            TextAnchor::Point { point, units, visible } => ItemSpec::new()
                .with("AnchorPoint", point.clone())
                .with("AnchorPointAnnotationUnits", units.as_str())
                .with("AnchorPointVisibility", if *visible { "Y" } else { "N" }),
            TextAnchor::BoundingBox {
                top_left,
                bottom_right,
                units,
                justification,
            } => ItemSpec::new()
                .with("BoundingBoxTopLeftHandCorner", top_left.clone())
                .with("BoundingBoxBottomRightHandCorner", bottom_right.clone())
                .with("BoundingBoxAnnotationUnits", units.as_str())
                .with("BoundingBoxTextHorizontalJustification", justification.as_str()),
        }
    }
}

/// 引用序列中实例列表的形式：SOP 引用或图像引用，二者互斥
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesReference {
    Sops(Vec<ItemSpec>),
    Images(Vec<ItemSpec>),
}

impl Default for SeriesReference {
    fn default() -> Self {
        SeriesReference::Sops(Vec::new())
    }
}

impl SeriesReference {
    /// SOP 引用优先
    pub fn from_item(item: &ItemSpec) -> Self {
        if let Some(value) = item.get("ReferencedSOPSequence") {
            return SeriesReference::Sops(value.as_items().map(<[_]>::to_vec).unwrap_or_default());
        }
        if let Some(value) = item.get("ReferencedImageSequence") {
            return SeriesReference::Images(value.as_items().map(<[_]>::to_vec).unwrap_or_default());
        }
        SeriesReference::default()
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SeriesReference::Sops(_) => "ReferencedSOPSequence",
            SeriesReference::Images(_) => "ReferencedImageSequence",
        }
    }

    pub fn items(&self) -> &[ItemSpec] {
        match self {
            SeriesReference::Sops(items) | SeriesReference::Images(items) => items,
        }
    }
}

/// 序列构建器
#[derive(Debug, Clone)]
pub struct SequenceBuilder {
    dictionary: Arc<dyn AttributeDictionary>,
}

impl SequenceBuilder {
    pub fn new(dictionary: Arc<dyn AttributeDictionary>) -> Self {
        Self { dictionary }
    }

    pub fn dictionary(&self) -> &dyn AttributeDictionary {
        self.dictionary.as_ref()
    }

    /// 构建序列条目，输出顺序与输入顺序一致
    pub fn build(&self, sequence_name: &str, items: &[ItemSpec]) -> Vec<InMemDicomObject> {
        let kind = SequenceKind::from_keyword(sequence_name);
        debug!("构建序列 {} ({:?})，条目数: {}", sequence_name, kind, items.len());
        items.iter().map(|item| self.build_item(kind, item)).collect()
    }

    /// 构建单个条目
    pub fn build_item(&self, kind: SequenceKind, item: &ItemSpec) -> InMemDicomObject {
        let resolved = self.resolve_item(kind, item);
        let mut obj = InMemDicomObject::new_empty();
        for (key, value) in resolved.iter() {
            if let Err(e) = self.put_value(&mut obj, key, value) {
                warn!("序列条目属性 {} 被跳过: {}", key, e);
            }
        }
        obj
    }

    /// 计算条目的最终键值：默认值、叠加、互斥解析
    pub fn resolve_item(&self, kind: SequenceKind, item: &ItemSpec) -> ItemSpec {
        let mut resolved = kind.defaults().overlaid_with(item);

        match kind {
            SequenceKind::TextObject => {
                let anchor = TextAnchor::from_item(item);
                for key in TextAnchor::POINT_KEYS.iter().chain(TextAnchor::BOUNDING_BOX_KEYS.iter()) {
                    resolved.remove(key);
                }
                resolved = resolved.overlaid_with(&anchor.to_item());
            }
            SequenceKind::ReferencedSeries => {
                let reference = SeriesReference::from_item(item);
                resolved.remove("ReferencedSOPSequence");
                resolved.remove("ReferencedImageSequence");
                resolved.set(reference.keyword(), reference.items().to_vec());
            }
            SequenceKind::GraphicObject => {
                if item.contains("GraphicData") && !item.contains("NumberOfGraphicPoints") {
                    let dimensions = resolved
                        .get("GraphicDimensions")
                        .and_then(|v| v.as_numbers("GraphicDimensions").ok())
                        .and_then(|v| v.first().copied())
                        .filter(|d| *d >= 1.0)
                        .unwrap_or(2.0) as usize;
                    let points = resolved
                        .get("GraphicData")
                        .and_then(|v| v.as_numbers("GraphicData").ok())
                        .map(|v| v.len() / dimensions)
                        .unwrap_or(1);
                    resolved.set("NumberOfGraphicPoints", points as i64);
                }
            }
            _ => {}
        }

        resolved
    }

    /// 写入单个属性，序列值递归构建
    pub fn put_value(
        &self,
        target: &mut InMemDicomObject,
        name: &str,
        value: &AttributeValue,
    ) -> Result<()> {
        let tag = self
            .dictionary
            .identifier_for(name)
            .ok_or_else(|| IodError::UnknownAttribute(name.to_string()))?;
        let vr = self.dictionary.value_type_of(tag);

        if vr == VR::SQ {
            let items = match value {
                AttributeValue::Items(items) => self.build(name, items),
                other if other.is_empty() => Vec::new(),
                _ => {
                    return Err(IodError::InvalidValue {
                        attribute: name.to_string(),
                        reason: "序列属性需要条目列表".to_string(),
                    })
                }
            };
            target.put(sequence_element(tag, items));
            return Ok(());
        }

        let primitive = value.to_primitive(name, vr)?;
        target.put(DataElement::new(tag, vr, primitive));
        Ok(())
    }
}

/// 由已构建的条目组成序列元素
pub fn sequence_element(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    if items.is_empty() {
        return empty_element(tag, VR::SQ);
    }
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::standard_dictionary;
    use crate::value::{read_floats, read_items, read_text};
    use dicom::dictionary_std::tags;

    fn builder() -> SequenceBuilder {
        SequenceBuilder::new(standard_dictionary())
    }

    #[test]
    fn test_build_preserves_order() {
        let items: Vec<ItemSpec> = ["a", "b", "c"]
            .iter()
            .map(|v| ItemSpec::new().with("CodeValue", *v).with("CodingSchemeDesignator", "99TEST"))
            .collect();

        let built = builder().build("ConceptCodeSequence", &items);

        assert_eq!(built.len(), 3);
        let values: Vec<String> = built
            .iter()
            .map(|item| read_text(item, tags::CODE_VALUE).unwrap())
            .collect();
        assert_eq!(values, vec!["a", "b", "c"]);
        // 默认值仍然存在
        assert_eq!(read_text(&built[0], tags::CODE_MEANING).as_deref(), Some(""));
    }

    #[test]
    fn test_graphic_object_defaults() {
        let built = builder().build("GraphicObjectSequence", &[ItemSpec::new()]);
        let item = &built[0];

        assert_eq!(read_text(item, tags::GRAPHIC_TYPE).as_deref(), Some("POINT"));
        assert_eq!(read_floats(item, tags::GRAPHIC_DATA), vec![100.0, 100.0]);
        assert_eq!(read_text(item, tags::GRAPHIC_ANNOTATION_UNITS).as_deref(), Some("PIXEL"));
    }

    #[test]
    fn test_graphic_object_point_count_is_derived() {
        let item = ItemSpec::new()
            .with("GraphicData", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .with("GraphicType", "POLYLINE");
        let resolved = builder().resolve_item(SequenceKind::GraphicObject, &item);

        assert_eq!(resolved.get("NumberOfGraphicPoints"), Some(&AttributeValue::Int(3)));
        assert_eq!(resolved.get("GraphicType"), Some(&AttributeValue::from("POLYLINE")));
    }

    #[test]
    fn test_text_object_anchor_wins_over_bounding_box() {
        let item = ItemSpec::new()
            .with("UnformattedTextValue", "lesion")
            .with("AnchorPoint", vec![10.0, 20.0])
            .with("BoundingBoxTopLeftHandCorner", vec![1.0, 1.0])
            .with("BoundingBoxBottomRightHandCorner", vec![5.0, 5.0]);
        let resolved = builder().resolve_item(SequenceKind::TextObject, &item);

        assert!(resolved.contains("AnchorPoint"));
        assert!(TextAnchor::BOUNDING_BOX_KEYS.iter().all(|k| !resolved.contains(k)));
    }

    #[test]
    fn test_text_object_bounding_box_replaces_default_anchor() {
        let item = ItemSpec::new()
            .with("BoundingBoxTopLeftHandCorner", vec![1.0, 1.0])
            .with("BoundingBoxBottomRightHandCorner", vec![50.0, 20.0]);
        let built = builder().build("TextObjectSequence", &[item]);
        let obj = &built[0];

        assert!(obj.element(tags::ANCHOR_POINT).is_err());
        assert!(obj.element(tags::ANCHOR_POINT_VISIBILITY).is_err());
        assert_eq!(read_floats(obj, tags::BOUNDING_BOX_BOTTOM_RIGHT_HAND_CORNER), vec![50.0, 20.0]);
        assert_eq!(read_text(obj, tags::UNFORMATTED_TEXT_VALUE).as_deref(), Some("DEFAULT VALUE"));
    }

    #[test]
    fn test_text_object_without_location_gets_default_anchor() {
        let resolved = builder().resolve_item(SequenceKind::TextObject, &ItemSpec::new());
        assert_eq!(resolved.get("AnchorPoint"), Some(&AttributeValue::Floats(vec![100.0, 100.0])));
        assert_eq!(resolved.get("AnchorPointVisibility"), Some(&AttributeValue::from("N")));
    }

    #[test]
    fn test_referenced_series_image_list_excludes_sop_list() {
        let item = ItemSpec::new().with("SeriesInstanceUID", "1.2.3").with(
            "ReferencedImageSequence",
            vec![ItemSpec::new().with("ReferencedSOPInstanceUID", "1.2.3.4")],
        );
        let built = builder().build("ReferencedSeriesSequence", &[item]);
        let obj = &built[0];

        assert!(obj.element(tags::REFERENCED_SOP_SEQUENCE).is_err());
        let images = read_items(obj, tags::REFERENCED_IMAGE_SEQUENCE);
        assert_eq!(images.len(), 1);
        assert_eq!(read_text(&images[0], tags::REFERENCED_SOP_INSTANCE_UID).as_deref(), Some("1.2.3.4"));
        // 未提供的SOP类取默认值
        assert_eq!(
            read_text(&images[0], tags::REFERENCED_SOP_CLASS_UID).as_deref(),
            Some(DEFAULT_REFERENCED_SOP_CLASS_UID)
        );
    }

    #[test]
    fn test_referenced_series_defaults_to_sop_list() {
        let built = builder().build("ReferencedSeriesSequence", &[ItemSpec::new()]);
        let obj = &built[0];
        assert!(obj.element(tags::REFERENCED_SOP_SEQUENCE).is_ok());
        assert!(obj.element(tags::REFERENCED_IMAGE_SEQUENCE).is_err());
        assert!(read_text(obj, tags::SERIES_INSTANCE_UID).unwrap().starts_with("2.25."));
    }

    #[test]
    fn test_unknown_sequence_passes_keys_through() {
        let item = ItemSpec::new().with("OpticalPathIdentifier", "1");
        let built = builder().build("OpticalPathSequence", &[item]);
        assert_eq!((&built[0]).into_iter().count(), 1);
        assert_eq!(read_text(&built[0], tags::OPTICAL_PATH_IDENTIFIER).as_deref(), Some("1"));
    }

    #[test]
    fn test_unknown_item_keys_are_skipped() {
        let item = ItemSpec::new().with("NotAKeyword", "x").with("GraphicLayer", "L1");
        let built = builder().build("GraphicAnnotationSequence", &[item]);
        assert_eq!((&built[0]).into_iter().count(), 1);
        assert_eq!(read_text(&built[0], tags::GRAPHIC_LAYER).as_deref(), Some("L1"));
    }

    #[test]
    fn test_nested_sequences_are_built_recursively() {
        let item = ItemSpec::new()
            .with("NumericValue", 32.2)
            .with(
                "MeasurementUnitsCodeSequence",
                vec![ItemSpec::new().with("CodeValue", "mm").with("CodingSchemeDesignator", "UCUM")],
            );
        let built = builder().build("MeasuredValueSequence", &[item]);
        let units = read_items(&built[0], tags::MEASUREMENT_UNITS_CODE_SEQUENCE);

        assert_eq!(read_text(&built[0], tags::NUMERIC_VALUE).as_deref(), Some("32.2"));
        assert_eq!(units.len(), 1);
        assert_eq!(read_text(&units[0], tags::CODE_VALUE).as_deref(), Some("mm"));
        assert_eq!(read_text(&units[0], tags::CODE_MEANING).as_deref(), Some(""));
    }

    #[test]
    fn test_put_value_unknown_attribute() {
        let mut obj = InMemDicomObject::new_empty();
        let err = builder().put_value(&mut obj, "Bogus", &AttributeValue::from("x")).unwrap_err();
        assert!(matches!(err, IodError::UnknownAttribute(_)));
    }
}
