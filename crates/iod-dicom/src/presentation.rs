//! 显示状态 (灰度 GSPS 与彩色 CSPS)
//!
//! 显示状态引用一组图像，在其上叠加图层、图形对象和文本对象。

use crate::record::{Record, RecordVariant};
use crate::reference::{resolve_all, ReferencedDocument, ResolveReference};
use crate::sequence::TextAnchor;
use crate::value::{AttributeValue, ItemSpec};
use iod_core::{IodError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// 图形类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GraphicType {
    Point,
    Polyline,
    Interpolated,
    Circle,
    Ellipse,
}

impl GraphicType {
    pub fn as_str(self) -> &'static str {
        match self {
            GraphicType::Point => "POINT",
            GraphicType::Polyline => "POLYLINE",
            GraphicType::Interpolated => "INTERPOLATED",
            GraphicType::Circle => "CIRCLE",
            GraphicType::Ellipse => "ELLIPSE",
        }
    }

    /// 检查二维坐标列表的长度
    ///
    /// POINT 为 2 个数，POLYLINE 与 INTERPOLATED 为不少于 4 的偶数，
    /// CIRCLE 为 4 个数 (圆心与圆周上一点)，ELLIPSE 为 8 个数 (长轴与短轴端点)。
    pub fn check_coordinates(self, data: &[f64]) -> Result<()> {
        let n = data.len();
        let valid = match self {
            GraphicType::Point => n == 2,
            GraphicType::Polyline | GraphicType::Interpolated => n >= 4 && n % 2 == 0,
            GraphicType::Circle => n == 4,
            GraphicType::Ellipse => n == 8,
        };
        if valid {
            Ok(())
        } else {
            Err(IodError::InvalidSpatialData(format!(
                "{} 的坐标个数不正确: {}",
                self, n
            )))
        }
    }
}

impl fmt::Display for GraphicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CIELab 颜色 (DICOM 编码的 L*, a*, b*)
pub type CieLab = [u16; 3];

fn cielab_value(color: CieLab) -> AttributeValue {
    AttributeValue::Ints(color.iter().map(|v| i64::from(*v)).collect())
}

/// 图层
#[derive(Debug, Clone, Default)]
pub struct GraphicLayer {
    pub name: String,
    pub order: u32,
    pub recommended_grayscale_value: Option<u16>,
    pub recommended_cielab_value: Option<CieLab>,
    pub description: Option<String>,
}

impl GraphicLayer {
    pub fn new(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
            ..Self::default()
        }
    }

    fn to_item(&self) -> ItemSpec {
        let mut item = ItemSpec::new()
            .with("GraphicLayer", self.name.as_str())
            .with("GraphicLayerOrder", i64::from(self.order));
        if let Some(gray) = self.recommended_grayscale_value {
            item.set("GraphicLayerRecommendedDisplayGrayscaleValue", gray);
        }
        if let Some(color) = self.recommended_cielab_value {
            item.set("GraphicLayerRecommendedDisplayCIELabValue", cielab_value(color));
        }
        if let Some(description) = &self.description {
            item.set("GraphicLayerDescription", description.as_str());
        }
        item
    }
}

/// 图形对象，坐标单位为像素
#[derive(Debug, Clone)]
pub struct GraphicObject {
    pub graphic_type: GraphicType,
    pub data: Vec<f64>,
    pub filled: bool,
    pub cielab_value: Option<CieLab>,
    pub shadow_style: Option<String>,
    pub line_thickness: Option<f64>,
}

impl GraphicObject {
    pub fn new(graphic_type: GraphicType, data: Vec<f64>) -> Self {
        Self {
            graphic_type,
            data,
            filled: false,
            cielab_value: None,
            shadow_style: None,
            line_thickness: None,
        }
    }

    fn to_item(&self) -> ItemSpec {
        let mut item = ItemSpec::new()
            .with("GraphicAnnotationUnits", "PIXEL")
            .with("GraphicDimensions", 2)
            .with("NumberOfGraphicPoints", (self.data.len() / 2) as i64)
            .with("GraphicData", self.data.clone())
            .with("GraphicType", self.graphic_type.as_str());
        if self.filled {
            item.set("GraphicFilled", "Y");
        }

        if self.cielab_value.is_some() || self.shadow_style.is_some() || self.line_thickness.is_some() {
            let mut line_style = ItemSpec::new();
            if let Some(color) = self.cielab_value {
                line_style.set("PatternOnColorCIELabValue", cielab_value(color));
            }
            if let Some(style) = &self.shadow_style {
                line_style.set("ShadowStyle", style.as_str());
            }
            if let Some(thickness) = self.line_thickness {
                line_style.set("LineThickness", thickness);
            }
            item.set("LineStyleSequence", line_style);
        }
        if let (true, Some(color)) = (self.filled, self.cielab_value) {
            item.set(
                "FillStyleSequence",
                ItemSpec::new().with("PatternOnColorCIELabValue", cielab_value(color)),
            );
        }
        item
    }
}

/// 文本对象
#[derive(Debug, Clone)]
pub struct TextObject {
    pub text: String,
    pub anchor: TextAnchor,
    pub cielab_value: Option<CieLab>,
    pub shadow_style: Option<String>,
}

impl TextObject {
    /// 以像素锚点定位的不可见锚点文本
    pub fn at(text: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            text: text.into(),
            anchor: TextAnchor::Point {
                point: vec![x, y],
                units: "PIXEL".to_string(),
                visible: false,
            },
            cielab_value: None,
            shadow_style: None,
        }
    }

    fn to_item(&self) -> ItemSpec {
        let mut item = self
            .anchor
            .to_item()
            .with("UnformattedTextValue", self.text.as_str());
        if self.cielab_value.is_some() || self.shadow_style.is_some() {
            let mut style = ItemSpec::new();
            if let Some(color) = self.cielab_value {
                style.set("TextColorCIELabValue", cielab_value(color));
            }
            if let Some(shadow) = &self.shadow_style {
                style.set("ShadowStyle", shadow.as_str());
            }
            item.set("TextStyleSequence", style);
        }
        item
    }
}

/// 引用序列：按序列分组的图像引用，保持首次出现的顺序
fn referenced_series_items(documents: &[ReferencedDocument]) -> Result<Vec<ItemSpec>> {
    let mut series: Vec<(String, Vec<ItemSpec>)> = Vec::new();
    for document in documents {
        let series_uid = document.series_instance_uid()?;
        let image = document.reference_item()?;
        match series.iter_mut().find(|(uid, _)| uid == series_uid) {
            Some((_, images)) => images.push(image),
            None => series.push((series_uid.to_string(), vec![image])),
        }
    }
    Ok(series
        .into_iter()
        .map(|(uid, images)| {
            ItemSpec::new()
                .with("SeriesInstanceUID", uid)
                .with("ReferencedImageSequence", images)
        })
        .collect())
}

/// 每个被引用图像一个显示区域，右下角为 [列数, 行数]
fn displayed_area_items(documents: &[ReferencedDocument]) -> Result<Vec<ItemSpec>> {
    documents
        .iter()
        .map(|document| {
            let (rows, columns) = document.summary().image_size().ok_or_else(|| {
                IodError::ReferenceResolution("被引用图像缺少 Rows/Columns".to_string())
            })?;
            Ok(ItemSpec::new()
                .with("ReferencedImageSequence", document.reference_item()?)
                .with("DisplayedAreaTopLeftHandCorner", vec![1_i64, 1])
                .with(
                    "DisplayedAreaBottomRightHandCorner",
                    vec![i64::from(columns), i64::from(rows)],
                )
                .with("PresentationSizeMode", "SCALE TO FIT"))
        })
        .collect()
}

/// 显示状态构建器
#[derive(Debug, Clone)]
pub struct PresentationState {
    record: Record,
}

impl PresentationState {
    pub fn grayscale() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::GrayscalePresentationState),
        }
    }

    pub fn color() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::ColorPresentationState),
        }
    }

    /// 初始化并引用给定图像；患者与检查属性继承自第一个引用
    pub fn initiate<R: ResolveReference>(&mut self, references: &[R]) -> Result<()> {
        let documents = resolve_all(references)?;
        // 先完成全部解析与检查，再修改记录
        let series = referenced_series_items(&documents)?;
        let areas = displayed_area_items(&documents)?;

        self.record.initiate();
        if let Some(first) = documents.first() {
            self.record.inherit_from(first.dataset());
            self.record.try_set_attribute("ReferencedSeriesSequence", series)?;
            self.record.try_set_attribute("DisplayedAreaSelectionSequence", areas)?;
        }
        info!(
            "{} 已初始化，引用图像数: {}",
            self.record.variant(),
            documents.len()
        );
        Ok(())
    }

    /// 彩色显示状态的ICC配置
    pub fn set_icc_profile(&mut self, profile: &[u8]) -> Result<()> {
        let mut bytes = profile.to_vec();
        if bytes.len() % 2 != 0 {
            bytes.push(0);
        }
        self.record.try_set_attribute("ICCProfile", AttributeValue::Bytes(bytes))
    }

    pub fn add_graphical_layer(&mut self, layer: &GraphicLayer) -> Result<()> {
        debug!("添加图层 {} (顺序 {})", layer.name, layer.order);
        self.record.append_items("GraphicLayerSequence", &[layer.to_item()])
    }

    pub fn add_graphic_object<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        layer_name: &str,
        object: &GraphicObject,
    ) -> Result<()> {
        object.graphic_type.check_coordinates(&object.data)?;
        let document = reference.resolve()?;
        let annotation = ItemSpec::new()
            .with("ReferencedImageSequence", document.reference_item()?)
            .with("GraphicLayer", layer_name)
            .with("GraphicObjectSequence", object.to_item());
        self.record.append_items("GraphicAnnotationSequence", &[annotation])
    }

    pub fn add_text_object<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        layer_name: &str,
        object: &TextObject,
    ) -> Result<()> {
        let document = reference.resolve()?;
        let annotation = ItemSpec::new()
            .with("ReferencedImageSequence", document.reference_item()?)
            .with("GraphicLayer", layer_name)
            .with("TextObjectSequence", object.to_item());
        self.record.append_items("GraphicAnnotationSequence", &[annotation])
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::tests::instance;
    use crate::value::{read_int, read_ints, read_items, read_text};
    use dicom::dictionary_std::tags;

    fn references() -> Vec<ReferencedDocument> {
        vec![
            ReferencedDocument::from_object(instance("1.2.3", "1.2.3.1", "1.2.3.1.1")),
            ReferencedDocument::from_object(instance("1.2.3", "1.2.3.1", "1.2.3.1.2")),
            ReferencedDocument::from_object(instance("1.2.3", "1.2.3.2", "1.2.3.2.1")),
        ]
    }

    #[test]
    fn test_graphic_type_coordinates() {
        assert!(GraphicType::Point.check_coordinates(&[1.0, 2.0]).is_ok());
        assert!(GraphicType::Polyline.check_coordinates(&[1.0, 2.0, 3.0, 4.0]).is_ok());
        assert!(GraphicType::Polyline.check_coordinates(&[1.0, 2.0]).is_err());
        assert!(GraphicType::Polyline.check_coordinates(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_err());
        assert!(GraphicType::Circle.check_coordinates(&[0.0; 4]).is_ok());
        assert!(matches!(
            GraphicType::Ellipse.check_coordinates(&[0.0; 6]),
            Err(IodError::InvalidSpatialData(_))
        ));
    }

    #[test]
    fn test_initiate_groups_references_by_series() {
        let mut state = PresentationState::grayscale();
        state.initiate(&references()).unwrap();
        let record = state.record();

        assert_eq!(record.text("PatientID").as_deref(), Some("PAT001"));
        assert_eq!(record.study_instance_uid().as_deref(), Some("1.2.3"));
        assert_eq!(record.text("PresentationLUTShape").as_deref(), Some("IDENTITY"));

        let series = record.items("ReferencedSeriesSequence");
        assert_eq!(series.len(), 2);
        assert_eq!(read_items(&series[0], tags::REFERENCED_IMAGE_SEQUENCE).len(), 2);
        assert!(series[0].element(tags::REFERENCED_SOP_SEQUENCE).is_err());

        let areas = record.items("DisplayedAreaSelectionSequence");
        assert_eq!(areas.len(), 3);
        assert_eq!(
            read_ints(&areas[0], tags::DISPLAYED_AREA_BOTTOM_RIGHT_HAND_CORNER),
            vec![256, 512]
        );
    }

    #[test]
    fn test_initiate_rejects_unresolvable_reference_without_mutation() {
        let mut state = PresentationState::grayscale();
        let before = state.record().dataset().clone();
        let err = state.initiate(&["/nonexistent/image.dcm"]).unwrap_err();
        assert!(matches!(err, IodError::ReferenceResolution(_)));
        assert_eq!(state.record().dataset(), &before);
    }

    #[test]
    fn test_layers_and_graphic_objects() {
        let refs = references();
        let mut state = PresentationState::grayscale();
        state.initiate(&refs).unwrap();

        state.add_graphical_layer(&GraphicLayer::new("LAYER0", 1)).unwrap();
        let mut object = GraphicObject::new(GraphicType::Polyline, vec![10.0, 10.0, 20.0, 20.0, 30.0, 10.0]);
        object.filled = true;
        object.cielab_value = Some([65535, 0, 0]);
        state.add_graphic_object(&refs[0], "LAYER0", &object).unwrap();

        let record = state.record();
        assert_eq!(record.items("GraphicLayerSequence").len(), 1);

        let annotation = &record.items("GraphicAnnotationSequence")[0];
        assert_eq!(read_text(annotation, tags::GRAPHIC_LAYER).as_deref(), Some("LAYER0"));
        let reference = &read_items(annotation, tags::REFERENCED_IMAGE_SEQUENCE)[0];
        assert_eq!(
            read_text(reference, tags::REFERENCED_SOP_INSTANCE_UID).as_deref(),
            Some("1.2.3.1.1")
        );

        let graphic = &read_items(annotation, tags::GRAPHIC_OBJECT_SEQUENCE)[0];
        assert_eq!(read_int(graphic, tags::NUMBER_OF_GRAPHIC_POINTS), Some(3));
        assert_eq!(read_text(graphic, tags::GRAPHIC_FILLED).as_deref(), Some("Y"));
        let line = &read_items(graphic, tags::LINE_STYLE_SEQUENCE)[0];
        assert_eq!(read_ints(line, tags::PATTERN_ON_COLOR_CIE_LAB_VALUE), vec![65535, 0, 0]);
        // 未指定的线型属性取默认值
        assert_eq!(read_text(line, tags::LINE_DASHING_STYLE).as_deref(), Some("SOLID"));
        assert_eq!(read_items(graphic, tags::FILL_STYLE_SEQUENCE).len(), 1);
    }

    #[test]
    fn test_invalid_graphic_data_is_rejected() {
        let refs = references();
        let mut state = PresentationState::grayscale();
        state.initiate(&refs).unwrap();
        let object = GraphicObject::new(GraphicType::Circle, vec![1.0, 2.0]);
        assert!(state.add_graphic_object(&refs[0], "LAYER0", &object).is_err());
        assert!(state.record().items("GraphicAnnotationSequence").is_empty());
    }

    #[test]
    fn test_text_object() {
        let refs = references();
        let mut state = PresentationState::color();
        state.initiate(&refs).unwrap();
        state.set_icc_profile(&[1, 2, 3]).unwrap();

        let mut text = TextObject::at("Lesion", 50.0, 60.0);
        text.shadow_style = Some("OUTLINED".to_string());
        state.add_text_object(&refs[1], "LAYER0", &text).unwrap();

        let record = state.record();
        assert!(record.dataset().element(tags::ICC_PROFILE).is_ok());
        assert!(record.dataset().element(tags::PRESENTATION_LUT_SHAPE).is_err());

        let annotation = &record.items("GraphicAnnotationSequence")[0];
        let object = &read_items(annotation, tags::TEXT_OBJECT_SEQUENCE)[0];
        assert_eq!(read_text(object, tags::UNFORMATTED_TEXT_VALUE).as_deref(), Some("Lesion"));
        assert_eq!(read_text(object, tags::ANCHOR_POINT_VISIBILITY).as_deref(), Some("N"));
        assert!(object.element(tags::BOUNDING_BOX_TOP_LEFT_HAND_CORNER).is_err());
        let style = &read_items(object, tags::TEXT_STYLE_SEQUENCE)[0];
        assert_eq!(read_text(style, tags::SHADOW_STYLE).as_deref(), Some("OUTLINED"));
    }
}
