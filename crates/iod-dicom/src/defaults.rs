//! 初始化默认值表
//!
//! 每个记录类型的初始化由一张声明式规则表驱动，按表中顺序求值。
//! `SameAs` 读取的是已经写入记录的值，因此被引用的属性必须排在前面。

use crate::record::RecordVariant;
use crate::value::{AttributeValue, ItemSpec};
use iod_core::utils::{
    current_date, current_datetime, current_time, generate_dicom_uid, random_identifier,
};
use iod_core::CodedConcept;
use std::collections::HashMap;

/// 单个属性的默认值规则
#[derive(Debug, Clone, Copy)]
pub enum DefaultRule {
    Text(&'static str),
    Texts(&'static [&'static str]),
    Int(i64),
    Float(f64),
    Floats(&'static [f64]),
    /// 条目列表，由生成函数构造
    Items(fn(&mut DefaultContext) -> Vec<ItemSpec>),
    /// 16位大写十六进制随机标识符
    RandomIdentifier,
    GeneratedUid,
    CurrentDate,
    CurrentTime,
    CurrentDateTime,
    SopClassUid,
    Modality,
    /// 复制另一个属性的当前值
    SameAs(&'static str),
}

/// 规则表条目
#[derive(Debug, Clone, Copy)]
pub struct DefaultEntry {
    pub attribute: &'static str,
    pub rule: DefaultRule,
}

const fn entry(attribute: &'static str, rule: DefaultRule) -> DefaultEntry {
    DefaultEntry { attribute, rule }
}

/// 一次初始化过程中的求值上下文
///
/// 同一个键的共享UID在一次初始化内只生成一次，用于需要互相引用的条目。
#[derive(Debug)]
pub struct DefaultContext {
    variant: RecordVariant,
    shared_uids: HashMap<&'static str, String>,
}

impl DefaultContext {
    pub fn new(variant: RecordVariant) -> Self {
        Self {
            variant,
            shared_uids: HashMap::new(),
        }
    }

    pub fn variant(&self) -> RecordVariant {
        self.variant
    }

    pub fn shared_uid(&mut self, key: &'static str) -> String {
        self.shared_uids
            .entry(key)
            .or_insert_with(generate_dicom_uid)
            .clone()
    }
}

impl DefaultRule {
    /// 求值；`lookup` 返回记录中已有属性的文本值
    pub fn resolve(
        &self,
        context: &mut DefaultContext,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> AttributeValue {
        match self {
            DefaultRule::Text(s) => AttributeValue::from(*s),
            DefaultRule::Texts(v) => AttributeValue::from(v.to_vec()),
            DefaultRule::Int(i) => AttributeValue::Int(*i),
            DefaultRule::Float(f) => AttributeValue::Float(*f),
            DefaultRule::Floats(v) => AttributeValue::Floats(v.to_vec()),
            DefaultRule::Items(build) => AttributeValue::Items(build(context)),
            DefaultRule::RandomIdentifier => AttributeValue::Text(random_identifier()),
            DefaultRule::GeneratedUid => AttributeValue::Text(generate_dicom_uid()),
            DefaultRule::CurrentDate => AttributeValue::Text(current_date()),
            DefaultRule::CurrentTime => AttributeValue::Text(current_time()),
            DefaultRule::CurrentDateTime => AttributeValue::Text(current_datetime()),
            DefaultRule::SopClassUid => AttributeValue::from(context.variant().sop_class_uid()),
            DefaultRule::Modality => AttributeValue::from(context.variant().modality()),
            DefaultRule::SameAs(other) => lookup(other)
                .map(AttributeValue::Text)
                .unwrap_or(AttributeValue::Empty),
        }
    }
}

// 所有记录类型: 患者、检查与SOP通用模块
const COMMON: &[DefaultEntry] = &[
    entry("PatientID", DefaultRule::RandomIdentifier),
    entry("StudyInstanceUID", DefaultRule::GeneratedUid),
    entry("StudyDate", DefaultRule::CurrentDate),
    entry("StudyTime", DefaultRule::CurrentTime),
    entry("StudyID", DefaultRule::RandomIdentifier),
    entry("AccessionNumber", DefaultRule::SameAs("StudyID")),
    entry("SOPClassUID", DefaultRule::SopClassUid),
    entry("SOPInstanceUID", DefaultRule::GeneratedUid),
];

const IMAGE: &[DefaultEntry] = &[
    entry("Modality", DefaultRule::Modality),
    entry("SeriesInstanceUID", DefaultRule::GeneratedUid),
    entry("SeriesNumber", DefaultRule::Text("100")),
    entry("InstanceNumber", DefaultRule::Text("1")),
    entry("ContentDate", DefaultRule::CurrentDate),
    entry("ContentTime", DefaultRule::CurrentTime),
];

const CR: &[DefaultEntry] = &[
    entry("PhotometricInterpretation", DefaultRule::Text("MONOCHROME2")),
    entry("PixelSpacing", DefaultRule::Texts(&["1.0", "1.0"])),
];

const CT: &[DefaultEntry] = &[
    entry("FrameOfReferenceUID", DefaultRule::GeneratedUid),
    entry("ImageType", DefaultRule::Texts(&["ORIGINAL", "PRIMARY", "AXIAL"])),
    entry("SamplesPerPixel", DefaultRule::Int(1)),
    entry("PhotometricInterpretation", DefaultRule::Text("MONOCHROME2")),
    entry("RescaleIntercept", DefaultRule::Text("0")),
    entry("RescaleSlope", DefaultRule::Text("1")),
    entry("PixelSpacing", DefaultRule::Texts(&["1.0", "1.0"])),
    entry("SliceThickness", DefaultRule::Text("1.0")),
    entry("ImageOrientationPatient", DefaultRule::Floats(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0])),
    entry("ImagePositionPatient", DefaultRule::Floats(&[0.0, 0.0, 0.0])),
];

const SC: &[DefaultEntry] = &[entry("ConversionType", DefaultRule::Text("SYN"))];

const PRESENTATION: &[DefaultEntry] = &[
    entry("Modality", DefaultRule::Modality),
    entry("SeriesInstanceUID", DefaultRule::GeneratedUid),
    entry("SeriesNumber", DefaultRule::Text("100")),
    entry("PresentationCreationDate", DefaultRule::CurrentDate),
    entry("PresentationCreationTime", DefaultRule::CurrentTime),
    entry("InstanceNumber", DefaultRule::Text("1")),
    entry("ContentLabel", DefaultRule::Text("PRESENTATION_STATE")),
];

const GRAYSCALE_PRESENTATION: &[DefaultEntry] =
    &[entry("PresentationLUTShape", DefaultRule::Text("IDENTITY"))];

const SR_DOCUMENT: &[DefaultEntry] = &[
    entry("Modality", DefaultRule::Modality),
    entry("SeriesInstanceUID", DefaultRule::GeneratedUid),
    entry("InstanceNumber", DefaultRule::Text("1")),
    entry("CompletionFlag", DefaultRule::Text("COMPLETE")),
    entry("VerificationFlag", DefaultRule::Text("UNVERIFIED")),
    entry("ContentDate", DefaultRule::CurrentDate),
    entry("ContentTime", DefaultRule::CurrentTime),
    entry("PreliminaryFlag", DefaultRule::Text("FINAL")),
    entry("ValueType", DefaultRule::Text("CONTAINER")),
    entry("ContinuityOfContent", DefaultRule::Text("SEPARATE")),
];

const KEY_OBJECT: &[DefaultEntry] = &[
    entry("Modality", DefaultRule::Modality),
    entry("SeriesInstanceUID", DefaultRule::GeneratedUid),
    entry("SeriesNumber", DefaultRule::Text("600")),
    entry("InstanceNumber", DefaultRule::Text("1")),
    entry("ContentDate", DefaultRule::CurrentDate),
    entry("ContentTime", DefaultRule::CurrentTime),
    entry("ValueType", DefaultRule::Text("CONTAINER")),
    entry("ConceptNameCodeSequence", DefaultRule::Items(of_interest)),
    entry("ContinuityOfContent", DefaultRule::Text("SEPARATE")),
    entry("ContentTemplateSequence", DefaultRule::Items(key_object_template)),
];

const WHOLE_SLIDE: &[DefaultEntry] = &[
    entry("FrameOfReferenceUID", DefaultRule::GeneratedUid),
    entry("Manufacturer", DefaultRule::Text("UNKNOWN")),
    entry("ManufacturerModelName", DefaultRule::Text("UNKNOWN")),
    entry("DeviceSerialNumber", DefaultRule::Text("00000001")),
    entry("SoftwareVersions", DefaultRule::Text("0.0.1")),
    entry("SamplesPerPixel", DefaultRule::Int(1)),
    entry("PhotometricInterpretation", DefaultRule::Text("MONOCHROME2")),
    entry("Rows", DefaultRule::Int(256)),
    entry("Columns", DefaultRule::Int(256)),
    entry("BitsAllocated", DefaultRule::Int(8)),
    entry("BitsStored", DefaultRule::Int(8)),
    entry("HighBit", DefaultRule::Int(7)),
    entry("PixelRepresentation", DefaultRule::Int(0)),
    entry("SharedFunctionalGroupsSequence", DefaultRule::Items(slide_shared_groups)),
    entry("PerFrameFunctionalGroupsSequence", DefaultRule::Items(slide_single_frame)),
    entry("DimensionOrganizationSequence", DefaultRule::Items(dimension_organization)),
    entry("DimensionOrganizationType", DefaultRule::Text("TILED_SPARSE")),
    entry("DimensionIndexSequence", DefaultRule::Items(dimension_index)),
    entry("ContainerIdentifier", DefaultRule::RandomIdentifier),
    entry("SpecimenDescriptionSequence", DefaultRule::Items(specimen_description)),
    entry("ImageType", DefaultRule::Texts(&["DERIVED", "PRIMARY", "VOLUME", "NONE"])),
    entry("ImagedVolumeWidth", DefaultRule::Float(0.256)),
    entry("ImagedVolumeHeight", DefaultRule::Float(0.256)),
    entry("ImagedVolumeDepth", DefaultRule::Float(1.0)),
    entry("TotalPixelMatrixColumns", DefaultRule::Int(256)),
    entry("TotalPixelMatrixRows", DefaultRule::Int(256)),
    entry("TotalPixelMatrixFocalPlanes", DefaultRule::Int(1)),
    entry("TotalPixelMatrixOriginSequence", DefaultRule::Items(total_pixel_matrix_origin)),
    entry(
        "ImageOrientationSlide",
        DefaultRule::Texts(&["1.0", "0.0", "0.0", "0.0", "1.0", "0.0"]),
    ),
    entry("NumberOfFrames", DefaultRule::Int(1)),
    entry("AcquisitionDateTime", DefaultRule::CurrentDateTime),
    entry("AcquisitionDuration", DefaultRule::Float(1.0)),
    entry("LossyImageCompression", DefaultRule::Text("00")),
    entry("PresentationLUTShape", DefaultRule::Text("IDENTITY")),
    entry("RescaleIntercept", DefaultRule::Text("0.0")),
    entry("RescaleSlope", DefaultRule::Text("1.0")),
    entry("VolumetricProperties", DefaultRule::Text("VOLUME")),
    entry("SpecimenLabelInImage", DefaultRule::Text("NO")),
    entry("BurnedInAnnotation", DefaultRule::Text("NO")),
    entry("FocusMethod", DefaultRule::Text("AUTO")),
    entry("ExtendedDepthOfField", DefaultRule::Text("NO")),
    entry("NumberOfOpticalPaths", DefaultRule::Int(1)),
    entry("OpticalPathSequence", DefaultRule::Items(optical_path)),
];

/// 记录类型的完整规则表，按求值顺序排列
pub fn defaults_for(variant: RecordVariant) -> Vec<&'static DefaultEntry> {
    let groups: &[&'static [DefaultEntry]] = match variant {
        RecordVariant::CrImage => &[COMMON, IMAGE, CR],
        RecordVariant::CtImage => &[COMMON, IMAGE, CT],
        RecordVariant::SecondaryCapture => &[COMMON, IMAGE, SC],
        RecordVariant::GrayscalePresentationState => {
            &[COMMON, PRESENTATION, GRAYSCALE_PRESENTATION]
        }
        RecordVariant::ColorPresentationState => &[COMMON, PRESENTATION],
        RecordVariant::BasicTextSr
        | RecordVariant::EnhancedSr
        | RecordVariant::ComprehensiveSr
        | RecordVariant::Comprehensive3dSr => &[COMMON, SR_DOCUMENT],
        RecordVariant::KeyObjectSelection => &[COMMON, KEY_OBJECT],
        RecordVariant::WholeSlideMicroscopy => &[COMMON, IMAGE, WHOLE_SLIDE],
    };
    groups.iter().flat_map(|group| group.iter()).collect()
}

fn of_interest(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::code(&CodedConcept::dcm("113000", "Of Interest"))]
}

fn key_object_template(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::new()
        .with("MappingResource", "DCMR")
        .with("TemplateIdentifier", "2010")]
}

const FRAME_TYPE: [&str; 4] = ["DERIVED", "PRIMARY", "VOLUME", "NONE"];

/// 共享功能组：像素尺寸、光路标识与帧类型
pub fn slide_shared_groups_with(slice_thickness: f64, pixel_spacing: [f64; 2]) -> Vec<ItemSpec> {
    vec![ItemSpec::new()
        .with(
            "PixelMeasuresSequence",
            ItemSpec::new()
                .with("SliceThickness", slice_thickness)
                .with("PixelSpacing", pixel_spacing.to_vec()),
        )
        .with(
            "OpticalPathIdentificationSequence",
            ItemSpec::new().with("OpticalPathIdentifier", "1"),
        )
        .with(
            "WholeSlideMicroscopyImageFrameTypeSequence",
            ItemSpec::new().with("FrameType", FRAME_TYPE.to_vec()),
        )]
}

fn slide_shared_groups(_: &mut DefaultContext) -> Vec<ItemSpec> {
    slide_shared_groups_with(1.0, [0.001, 0.001])
}

/// 单帧在玻片坐标系中的位置
pub fn plane_position(x: f64, y: f64, column: i64, row: i64) -> ItemSpec {
    ItemSpec::new().with(
        "PlanePositionSlideSequence",
        ItemSpec::new()
            .with("XOffsetInSlideCoordinateSystem", x)
            .with("YOffsetInSlideCoordinateSystem", y)
            .with("ZOffsetInSlideCoordinateSystem", 0.0)
            .with("ColumnPositionInTotalImagePixelMatrix", column)
            .with("RowPositionInTotalImagePixelMatrix", row),
    )
}

fn slide_single_frame(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![plane_position(0.0, 0.0, 1, 1)]
}

fn dimension_organization(context: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::new().with("DimensionOrganizationUID", context.shared_uid("dimension-organization"))]
}

fn dimension_index(context: &mut DefaultContext) -> Vec<ItemSpec> {
    // 光路序列 (0048,0105) 中的光路标识 (0048,0106)
    vec![ItemSpec::new()
        .with("DimensionIndexPointer", 0x0048_0106_i64)
        .with("FunctionalGroupPointer", 0x0048_0105_i64)
        .with("DimensionOrganizationUID", context.shared_uid("dimension-organization"))]
}

fn specimen_description(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::new()
        .with("SpecimenIdentifier", random_identifier())
        .with("SpecimenUID", generate_dicom_uid())
        .with("IssuerOfTheSpecimenIdentifierSequence", Vec::<ItemSpec>::new())
        .with("SpecimenPreparationSequence", Vec::<ItemSpec>::new())]
}

fn total_pixel_matrix_origin(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::new()
        .with("XOffsetInSlideCoordinateSystem", "0.0")
        .with("YOffsetInSlideCoordinateSystem", "0.0")]
}

fn optical_path(_: &mut DefaultContext) -> Vec<ItemSpec> {
    vec![ItemSpec::new()
        .with("OpticalPathIdentifier", "1")
        .with(
            "IlluminationColorCodeSequence",
            ItemSpec::code(&CodedConcept::new("R-102CO", "SRT", "Full Spectrum")),
        )
        .with(
            "IlluminationTypeCodeSequence",
            ItemSpec::code(&CodedConcept::dcm("111741", "Transmission illumination")),
        )]
}
