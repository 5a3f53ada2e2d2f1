//! 记录 (IOD)
//!
//! 记录由类型决定其模块列表，属性集合是这些模块属性的并集，创建后
//! 不再变化。创建时每个模块的必需属性和可选属性都会写入 (缺失时为显式
//! 空值)，此后通过 `set_attribute` / `unset_attribute` 修改。

use crate::defaults::{defaults_for, DefaultContext};
use crate::dictionary::{standard_dictionary, AttributeDictionary};
use crate::module::{self, empty_element, Module};
use crate::sequence::{sequence_element, SequenceBuilder};
use crate::value::{read_items, read_text, AttributeValue, ItemSpec};
use dicom::core::header::Header;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use iod_core::utils::generate_dicom_uid;
use iod_core::{IodError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordVariant {
    CrImage,
    CtImage,
    SecondaryCapture,
    GrayscalePresentationState,
    ColorPresentationState,
    BasicTextSr,
    EnhancedSr,
    ComprehensiveSr,
    Comprehensive3dSr,
    KeyObjectSelection,
    WholeSlideMicroscopy,
}

impl RecordVariant {
    pub const ALL: [RecordVariant; 11] = [
        RecordVariant::CrImage,
        RecordVariant::CtImage,
        RecordVariant::SecondaryCapture,
        RecordVariant::GrayscalePresentationState,
        RecordVariant::ColorPresentationState,
        RecordVariant::BasicTextSr,
        RecordVariant::EnhancedSr,
        RecordVariant::ComprehensiveSr,
        RecordVariant::Comprehensive3dSr,
        RecordVariant::KeyObjectSelection,
        RecordVariant::WholeSlideMicroscopy,
    ];

    pub fn sop_class_uid(self) -> &'static str {
        match self {
            RecordVariant::CrImage => "1.2.840.10008.5.1.4.1.1.1",
            RecordVariant::CtImage => "1.2.840.10008.5.1.4.1.1.2",
            RecordVariant::SecondaryCapture => "1.2.840.10008.5.1.4.1.1.7",
            RecordVariant::GrayscalePresentationState => "1.2.840.10008.5.1.4.1.1.11.1",
            RecordVariant::ColorPresentationState => "1.2.840.10008.5.1.4.1.1.11.2",
            RecordVariant::BasicTextSr => "1.2.840.10008.5.1.4.1.1.88.11",
            RecordVariant::EnhancedSr => "1.2.840.10008.5.1.4.1.1.88.22",
            RecordVariant::ComprehensiveSr => "1.2.840.10008.5.1.4.1.1.88.33",
            RecordVariant::Comprehensive3dSr => "1.2.840.10008.5.1.4.1.1.88.34",
            RecordVariant::KeyObjectSelection => "1.2.840.10008.5.1.4.1.1.88.59",
            RecordVariant::WholeSlideMicroscopy => "1.2.840.10008.5.1.4.1.1.77.1.6",
        }
    }

    pub fn modality(self) -> &'static str {
        match self {
            RecordVariant::CrImage => "CR",
            RecordVariant::CtImage => "CT",
            RecordVariant::SecondaryCapture => "SC",
            RecordVariant::GrayscalePresentationState | RecordVariant::ColorPresentationState => "PR",
            RecordVariant::BasicTextSr
            | RecordVariant::EnhancedSr
            | RecordVariant::ComprehensiveSr
            | RecordVariant::Comprehensive3dSr => "SR",
            RecordVariant::KeyObjectSelection => "KO",
            RecordVariant::WholeSlideMicroscopy => "SM",
        }
    }

    pub fn from_sop_class_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches('\0');
        Self::ALL.into_iter().find(|v| v.sop_class_uid() == uid)
    }

    pub fn is_image(self) -> bool {
        matches!(
            self,
            RecordVariant::CrImage
                | RecordVariant::CtImage
                | RecordVariant::SecondaryCapture
                | RecordVariant::WholeSlideMicroscopy
        )
    }

    pub fn is_presentation_state(self) -> bool {
        matches!(
            self,
            RecordVariant::GrayscalePresentationState | RecordVariant::ColorPresentationState
        )
    }

    pub fn is_structured_report(self) -> bool {
        matches!(
            self,
            RecordVariant::BasicTextSr
                | RecordVariant::EnhancedSr
                | RecordVariant::ComprehensiveSr
                | RecordVariant::Comprehensive3dSr
                | RecordVariant::KeyObjectSelection
        )
    }

    /// 有序模块列表：通用模块在前，类型专用模块在后
    pub fn modules(self) -> Vec<Module> {
        let mut modules = vec![
            module::PATIENT,
            module::GENERAL_STUDY,
            module::GENERAL_EQUIPMENT,
            module::SOP_COMMON,
        ];
        if self == RecordVariant::WholeSlideMicroscopy {
            modules.push(module::ENHANCED_GENERAL_EQUIPMENT);
        }
        if self.is_image() {
            modules.extend([module::GENERAL_IMAGE, module::GENERAL_SERIES, module::IMAGE_PIXEL]);
        }
        if self.is_presentation_state() {
            modules.push(module::GENERAL_SERIES);
        }

        let specific: &[Module] = match self {
            RecordVariant::CrImage => &[module::CR_SERIES, module::CR_IMAGE],
            RecordVariant::CtImage => &[
                module::FRAME_OF_REFERENCE,
                module::IMAGE_PLANE,
                module::CT_IMAGE,
            ],
            RecordVariant::SecondaryCapture => &[module::SC_EQUIPMENT, module::SC_IMAGE],
            RecordVariant::GrayscalePresentationState => &[
                module::PRESENTATION_SERIES,
                module::PRESENTATION_STATE_IDENTIFICATION,
                module::PRESENTATION_STATE_RELATIONSHIP,
                module::DISPLAYED_AREA,
                module::GRAPHIC_ANNOTATION,
                module::GRAPHIC_LAYER,
                module::SOFTCOPY_VOI_LUT,
                module::SOFTCOPY_PRESENTATION_LUT,
            ],
            RecordVariant::ColorPresentationState => &[
                module::PRESENTATION_SERIES,
                module::PRESENTATION_STATE_IDENTIFICATION,
                module::PRESENTATION_STATE_RELATIONSHIP,
                module::DISPLAYED_AREA,
                module::GRAPHIC_ANNOTATION,
                module::GRAPHIC_LAYER,
                module::ICC_PROFILE,
            ],
            RecordVariant::BasicTextSr
            | RecordVariant::EnhancedSr
            | RecordVariant::ComprehensiveSr
            | RecordVariant::Comprehensive3dSr => &[
                module::SR_DOCUMENT_SERIES,
                module::SR_DOCUMENT_GENERAL,
                module::SR_DOCUMENT_CONTENT,
            ],
            RecordVariant::KeyObjectSelection => &[
                module::KEY_OBJECT_DOCUMENT_SERIES,
                module::KEY_OBJECT_DOCUMENT,
                module::SR_DOCUMENT_CONTENT,
            ],
            RecordVariant::WholeSlideMicroscopy => &[
                module::WHOLE_SLIDE_MICROSCOPY_SERIES,
                module::FRAME_OF_REFERENCE,
                module::ACQUISITION_CONTEXT,
                module::MULTI_FRAME_FUNCTIONAL_GROUPS,
                module::MULTI_FRAME_DIMENSION,
                module::SPECIMEN,
                module::WHOLE_SLIDE_MICROSCOPY_IMAGE,
                module::OPTICAL_PATH,
            ],
        };
        modules.extend_from_slice(specific);
        modules
    }

    /// 通用模块中对本类型不适用的属性：初始化时删除，不计入必需属性
    pub fn omitted_attributes(self) -> &'static [&'static str] {
        match self {
            RecordVariant::WholeSlideMicroscopy => &["Laterality"],
            _ => &[],
        }
    }
}

impl fmt::Display for RecordVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordVariant::CrImage => "CR Image",
            RecordVariant::CtImage => "CT Image",
            RecordVariant::SecondaryCapture => "Secondary Capture Image",
            RecordVariant::GrayscalePresentationState => "Grayscale Softcopy Presentation State",
            RecordVariant::ColorPresentationState => "Color Softcopy Presentation State",
            RecordVariant::BasicTextSr => "Basic Text SR",
            RecordVariant::EnhancedSr => "Enhanced SR",
            RecordVariant::ComprehensiveSr => "Comprehensive SR",
            RecordVariant::Comprehensive3dSr => "Comprehensive 3D SR",
            RecordVariant::KeyObjectSelection => "Key Object Selection Document",
            RecordVariant::WholeSlideMicroscopy => "VL Whole Slide Microscopy Image",
        };
        f.write_str(name)
    }
}

/// 从被引用实例继承的患者与检查属性
const INHERITED_ATTRIBUTES: &[&str] = &[
    "PatientID",
    "PatientName",
    "PatientSex",
    "PatientBirthDate",
    "StudyInstanceUID",
    "StudyID",
    "AccessionNumber",
    "StudyDescription",
    "StudyDate",
    "StudyTime",
];

/// 组合记录
#[derive(Debug, Clone)]
pub struct Record {
    variant: RecordVariant,
    modules: Vec<Module>,
    dataset: InMemDicomObject,
    builder: SequenceBuilder,
    media_storage_sop_instance_uid: String,
}

impl Record {
    /// 创建空记录，全部模块属性以显式空值存在
    pub fn create_empty(variant: RecordVariant) -> Self {
        Self::from_source(variant, &InMemDicomObject::new_empty())
    }

    /// 使用自定义字典创建空记录
    pub fn create_empty_with(variant: RecordVariant, dictionary: Arc<dyn AttributeDictionary>) -> Self {
        Self::compose(variant, &InMemDicomObject::new_empty(), dictionary)
    }

    /// 从已有数据集复制模块属性创建记录
    pub fn from_source(variant: RecordVariant, source: &InMemDicomObject) -> Self {
        Self::compose(variant, source, standard_dictionary())
    }

    fn compose(
        variant: RecordVariant,
        source: &InMemDicomObject,
        dictionary: Arc<dyn AttributeDictionary>,
    ) -> Self {
        let modules = variant.modules();
        let mut dataset = InMemDicomObject::new_empty();
        for module in &modules {
            module.copy_required(source, &mut dataset, dictionary.as_ref());
            module.copy_optional(source, &mut dataset, dictionary.as_ref());
        }
        debug!("创建记录 {}，模块数: {}", variant, modules.len());

        Self {
            variant,
            modules,
            dataset,
            builder: SequenceBuilder::new(dictionary),
            media_storage_sop_instance_uid: generate_dicom_uid(),
        }
    }

    /// 按类型的默认值表初始化必需属性
    pub fn initiate(&mut self) {
        let mut context = DefaultContext::new(self.variant);
        for entry in defaults_for(self.variant) {
            let value = {
                let dataset = &self.dataset;
                let dictionary = self.builder.dictionary();
                let lookup = |name: &str| {
                    dictionary
                        .identifier_for(name)
                        .and_then(|tag| read_text(dataset, tag))
                };
                entry.rule.resolve(&mut context, &lookup)
            };
            self.set_attribute(entry.attribute, value);
        }

        let dictionary = self.builder.dictionary();
        for name in self.variant.omitted_attributes() {
            if let Some(tag) = dictionary.identifier_for(name) {
                self.dataset.remove_element(tag);
            }
        }
        info!(
            "记录 {} 已初始化，SOP实例UID: {}",
            self.variant,
            self.text("SOPInstanceUID").unwrap_or_default()
        );
    }

    /// 从被引用实例继承患者与检查属性
    pub fn inherit_from(&mut self, source: &InMemDicomObject) {
        let dictionary = self.builder.dictionary();
        for name in INHERITED_ATTRIBUTES {
            let Some(tag) = dictionary.identifier_for(name) else {
                continue;
            };
            if let Ok(element) = source.element(tag) {
                self.dataset.put(element.clone());
            } else if *name == "PatientBirthDate" {
                self.dataset.put(empty_element(tag, dictionary.value_type_of(tag)));
            }
        }
    }

    /// 设置属性，错误记录日志后忽略
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        if let Err(e) = self.try_set_attribute(name, value) {
            if e.is_recoverable() {
                warn!("属性 {} 未设置: {}", name, e);
            } else {
                warn!("属性 {} 的值无效: {}", name, e);
            }
        }
    }

    /// 设置属性并返回错误
    pub fn try_set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) -> Result<()> {
        self.check_attribute(name)?;
        self.builder.put_value(&mut self.dataset, name, &value.into())
    }

    /// 移除可选属性；必需属性重置为显式空值
    pub fn unset_attribute(&mut self, name: &str) {
        let dictionary = self.builder.dictionary();
        let Some(tag) = dictionary.identifier_for(name) else {
            warn!("未知属性，忽略移除: {}", name);
            return;
        };
        if self.is_required(name) {
            debug!("必需属性 {} 重置为空值", name);
            self.dataset.put(empty_element(tag, dictionary.value_type_of(tag)));
        } else if self.contains_attribute(name) {
            self.dataset.remove_element(tag);
        } else {
            warn!("属性 {} 不属于记录 {}", name, self.variant);
        }
    }

    /// 用已构建的条目替换序列属性
    pub fn put_sequence(&mut self, name: &str, items: Vec<InMemDicomObject>) -> Result<()> {
        let tag = self.check_attribute(name)?;
        if !self.builder.dictionary().is_sequence(tag) {
            return Err(IodError::InvalidValue {
                attribute: name.to_string(),
                reason: "不是序列属性".to_string(),
            });
        }
        self.dataset.put(sequence_element(tag, items));
        Ok(())
    }

    /// 直接写入已构造的元素，用于值表示需要由调用方决定的属性
    pub fn put_element(&mut self, element: InMemElement) -> Result<()> {
        let tag = element.tag();
        let name = self
            .builder
            .dictionary()
            .keyword_of(tag)
            .map(str::to_string)
            .ok_or_else(|| IodError::UnknownAttribute(format!("{}", tag)))?;
        self.check_attribute(&name)?;
        self.dataset.put(element);
        Ok(())
    }

    /// 在序列属性末尾追加条目
    pub fn append_items(&mut self, name: &str, items: &[ItemSpec]) -> Result<()> {
        let tag = self.check_attribute(name)?;
        let mut current = read_items(&self.dataset, tag).to_vec();
        current.extend(self.builder.build(name, items));
        self.put_sequence(name, current)
    }

    fn check_attribute(&self, name: &str) -> Result<dicom::core::Tag> {
        let tag = self
            .builder
            .dictionary()
            .identifier_for(name)
            .ok_or_else(|| IodError::UnknownAttribute(name.to_string()))?;
        if !self.contains_attribute(name) {
            return Err(IodError::AttributeNotInRecord {
                attribute: name.to_string(),
                variant: self.variant.to_string(),
            });
        }
        Ok(tag)
    }

    pub fn variant(&self) -> RecordVariant {
        self.variant
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// 属性是否属于记录的属性集合
    pub fn contains_attribute(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.contains(name))
    }

    pub fn is_required(&self, name: &str) -> bool {
        !self.variant.omitted_attributes().contains(&name) && self.modules.iter().any(|m| m.is_required(name))
    }

    /// 属性集合中的全部名称，按模块顺序去重
    pub fn attribute_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = Vec::new();
        for name in self.modules.iter().flat_map(|m| m.attributes()) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// 缺失的必需属性 (不含显式空值)
    pub fn missing_required(&self) -> Vec<&'static str> {
        let dictionary = self.builder.dictionary();
        self.modules
            .iter()
            .flat_map(|m| m.required.iter().copied())
            .filter(|name| !self.variant.omitted_attributes().contains(name))
            .filter(|name| {
                dictionary
                    .identifier_for(name)
                    .map(|tag| self.dataset.element(tag).is_err())
                    .unwrap_or(false)
            })
            .collect()
    }

    pub fn dataset(&self) -> &InMemDicomObject {
        &self.dataset
    }

    pub fn into_dataset(self) -> InMemDicomObject {
        self.dataset
    }

    pub fn sequence_builder(&self) -> &SequenceBuilder {
        &self.builder
    }

    pub fn dictionary(&self) -> &dyn AttributeDictionary {
        self.builder.dictionary()
    }

    /// 属性的文本值
    pub fn text(&self, name: &str) -> Option<String> {
        let tag = self.builder.dictionary().identifier_for(name)?;
        read_text(&self.dataset, tag)
    }

    /// 序列属性的条目
    pub fn items(&self, name: &str) -> &[InMemDicomObject] {
        match self.builder.dictionary().identifier_for(name) {
            Some(tag) => read_items(&self.dataset, tag),
            None => &[],
        }
    }

    /// 文件元信息中的SOP类UID
    pub fn media_storage_sop_class_uid(&self) -> &'static str {
        self.variant.sop_class_uid()
    }

    /// 创建时生成的文件元信息SOP实例UID
    pub fn media_storage_sop_instance_uid(&self) -> &str {
        &self.media_storage_sop_instance_uid
    }

    pub fn sop_instance_uid(&self) -> Option<String> {
        read_text(&self.dataset, tags::SOP_INSTANCE_UID).filter(|s| !s.is_empty())
    }

    pub fn series_instance_uid(&self) -> Option<String> {
        read_text(&self.dataset, tags::SERIES_INSTANCE_UID).filter(|s| !s.is_empty())
    }

    pub fn study_instance_uid(&self) -> Option<String> {
        read_text(&self.dataset, tags::STUDY_INSTANCE_UID).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::read_int;
    use dicom::core::{DataElement, PrimitiveValue, VR};

    #[test]
    fn test_every_variant_is_complete_after_creation() {
        for variant in RecordVariant::ALL {
            let record = Record::create_empty(variant);
            assert!(record.missing_required().is_empty(), "{} 缺少必需属性", variant);

            let mut record = record;
            record.initiate();
            assert!(record.missing_required().is_empty(), "{} 初始化后缺少必需属性", variant);
        }
    }

    #[test]
    fn test_initiate_sets_identity_attributes() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        record.initiate();

        assert_eq!(record.text("SOPClassUID").as_deref(), Some("1.2.840.10008.5.1.4.1.1.1"));
        assert_eq!(record.text("Modality").as_deref(), Some("CR"));
        assert_eq!(record.text("PhotometricInterpretation").as_deref(), Some("MONOCHROME2"));
        assert_eq!(record.text("SeriesNumber").as_deref(), Some("100"));
        assert_eq!(record.text("PatientID").map(|s| s.len()), Some(16));
        assert_eq!(record.text("AccessionNumber"), record.text("StudyID"));
        assert!(record.sop_instance_uid().unwrap().starts_with("2.25."));
    }

    #[test]
    fn test_key_object_root_concept() {
        let mut record = Record::create_empty(RecordVariant::KeyObjectSelection);
        record.initiate();

        assert_eq!(record.text("SeriesNumber").as_deref(), Some("600"));
        let concept = &record.items("ConceptNameCodeSequence")[0];
        assert_eq!(read_text(concept, tags::CODE_VALUE).as_deref(), Some("113000"));
        let template = &record.items("ContentTemplateSequence")[0];
        assert_eq!(read_text(template, tags::TEMPLATE_IDENTIFIER).as_deref(), Some("2010"));
    }

    #[test]
    fn test_whole_slide_initiate() {
        let mut record = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        record.initiate();

        assert_eq!(read_int(record.dataset(), tags::ROWS), Some(256));
        assert_eq!(record.text("DimensionOrganizationType").as_deref(), Some("TILED_SPARSE"));
        // 玻片图像不含侧别
        assert!(record.dataset().element(tags::LATERALITY).is_err());
        assert!(!record.is_required("Laterality"));
        assert!(record.missing_required().is_empty());

        let organization = &record.items("DimensionOrganizationSequence")[0];
        let index = &record.items("DimensionIndexSequence")[0];
        assert_eq!(
            read_text(organization, tags::DIMENSION_ORGANIZATION_UID),
            read_text(index, tags::DIMENSION_ORGANIZATION_UID)
        );
        let path = &record.items("OpticalPathSequence")[0];
        assert_eq!(read_text(path, tags::OPTICAL_PATH_IDENTIFIER).as_deref(), Some("1"));
    }

    #[test]
    fn test_laterality_only_dropped_for_whole_slide() {
        let mut cr = Record::create_empty(RecordVariant::CrImage);
        cr.initiate();
        assert!(cr.dataset().element(tags::LATERALITY).is_ok());
        cr.unset_attribute("Laterality");
        assert_eq!(cr.text("Laterality").as_deref(), Some(""));

        let mut slide = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        slide.initiate();
        slide.set_attribute("Laterality", "L");
        assert_eq!(slide.text("Laterality").as_deref(), Some("L"));
        slide.unset_attribute("Laterality");
        assert!(slide.dataset().element(tags::LATERALITY).is_err());

        let result = crate::validator::RecordValidator::strict().validate_dataset(slide.dataset());
        assert!(result.errors.iter().all(|e| !e.contains("Laterality")), "{:?}", result.errors);
    }

    #[test]
    fn test_set_unknown_attribute_is_noop() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        let before = record.dataset().clone();

        record.set_attribute("NotARealKeyword", "x");
        assert_eq!(record.dataset(), &before);

        let err = record.try_set_attribute("NotARealKeyword", "x").unwrap_err();
        assert!(matches!(err, IodError::UnknownAttribute(_)));
    }

    #[test]
    fn test_set_attribute_outside_union() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        let err = record.try_set_attribute("ContentSequence", Vec::<ItemSpec>::new()).unwrap_err();
        assert!(matches!(err, IodError::AttributeNotInRecord { .. }));

        record.set_attribute("ContentSequence", Vec::<ItemSpec>::new());
        assert!(record.dataset().element(tags::CONTENT_SEQUENCE).is_err());
    }

    #[test]
    fn test_set_sequence_attribute_from_items() {
        let mut record = Record::create_empty(RecordVariant::EnhancedSr);
        record.set_attribute(
            "ConceptNameCodeSequence",
            vec![ItemSpec::new()
                .with("CodeValue", "126000")
                .with("CodingSchemeDesignator", "DCM")
                .with("CodeMeaning", "Imaging Measurement Report")],
        );
        let items = record.items("ConceptNameCodeSequence");
        assert_eq!(items.len(), 1);
        assert_eq!(read_text(&items[0], tags::CODE_VALUE).as_deref(), Some("126000"));
    }

    #[test]
    fn test_unset_attribute() {
        let mut record = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        record.initiate();

        record.unset_attribute("PresentationLUTShape");
        assert!(record.dataset().element(tags::PRESENTATION_LUT_SHAPE).is_err());

        // 必需属性保持存在
        record.unset_attribute("Modality");
        assert_eq!(record.text("Modality").as_deref(), Some(""));
        assert!(record.missing_required().is_empty());
    }

    #[test]
    fn test_from_source_copies_module_attributes() {
        let mut source = InMemDicomObject::new_empty();
        source.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^Jane")));
        source.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(64_u16)));

        let record = Record::from_source(RecordVariant::BasicTextSr, &source);
        assert_eq!(record.text("PatientName").as_deref(), Some("Doe^Jane"));
        // 不属于记录的属性不会被复制
        assert!(record.dataset().element(tags::ROWS).is_err());
    }

    #[test]
    fn test_append_items_keeps_existing() {
        let mut record = Record::create_empty(RecordVariant::GrayscalePresentationState);
        record
            .append_items("GraphicLayerSequence", &[ItemSpec::new().with("GraphicLayer", "A")])
            .unwrap();
        record
            .append_items("GraphicLayerSequence", &[ItemSpec::new().with("GraphicLayer", "B")])
            .unwrap();

        let layers: Vec<String> = record
            .items("GraphicLayerSequence")
            .iter()
            .map(|item| read_text(item, tags::GRAPHIC_LAYER).unwrap())
            .collect();
        assert_eq!(layers, vec!["A", "B"]);
    }

    #[test]
    fn test_variant_lookup() {
        assert_eq!(
            RecordVariant::from_sop_class_uid("1.2.840.10008.5.1.4.1.1.88.34\0"),
            Some(RecordVariant::Comprehensive3dSr)
        );
        assert_eq!(RecordVariant::from_sop_class_uid("1.2.3"), None);
        assert!(RecordVariant::WholeSlideMicroscopy.is_image());
        assert!(RecordVariant::KeyObjectSelection.is_structured_report());
    }

    #[test]
    fn test_module_order() {
        let names: Vec<&str> = RecordVariant::WholeSlideMicroscopy
            .modules()
            .iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(&names[..5], &["Patient", "GeneralStudy", "GeneralEquipment", "SOPCommon", "EnhancedGeneralEquipment"]);
        assert_eq!(names.last(), Some(&"OpticalPath"));
    }
}
