//! 模块描述
//!
//! 模块是一组固定的必需属性与可选属性名称。多个记录类型共享同一组
//! 模块描述，记录按类型持有有序的模块列表。

use crate::dictionary::AttributeDictionary;
use dicom::core::value::{DataSetSequence, PrimitiveValue};
use dicom::core::{DataElement, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use tracing::{debug, warn};

/// 模块描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Module {
    pub name: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl Module {
    /// 模块内全部属性名称，必需属性在前
    pub fn attributes(&self) -> impl Iterator<Item = &'static str> {
        self.required.iter().chain(self.optional.iter()).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes().any(|a| a == name)
    }

    pub fn is_required(&self, name: &str) -> bool {
        self.required.contains(&name)
    }

    /// 从源数据集复制必需属性到目标数据集
    ///
    /// 源中存在则复制，目标已存在则保留，否则写入字典声明类型的显式空值。
    /// 该操作从不失败。
    pub fn copy_required(
        &self,
        source: &InMemDicomObject,
        target: &mut InMemDicomObject,
        dictionary: &dyn AttributeDictionary,
    ) {
        copy_attributes(self.name, self.required, source, target, dictionary);
    }

    /// 从源数据集复制可选属性到目标数据集，语义与 `copy_required` 相同
    pub fn copy_optional(
        &self,
        source: &InMemDicomObject,
        target: &mut InMemDicomObject,
        dictionary: &dyn AttributeDictionary,
    ) {
        copy_attributes(self.name, self.optional, source, target, dictionary);
    }
}

fn copy_attributes(
    module: &str,
    names: &[&str],
    source: &InMemDicomObject,
    target: &mut InMemDicomObject,
    dictionary: &dyn AttributeDictionary,
) {
    for name in names {
        let Some(tag) = dictionary.identifier_for(name) else {
            warn!("模块 {} 包含字典中不存在的属性: {}", module, name);
            continue;
        };

        if let Ok(element) = source.element(tag) {
            target.put(element.clone());
        } else if target.element(tag).is_err() {
            debug!("属性 {} 缺失，写入空值", name);
            target.put(empty_element(tag, dictionary.value_type_of(tag)));
        }
    }
}

/// 构造指定类型的显式空元素
pub fn empty_element(tag: Tag, vr: VR) -> InMemElement {
    if vr == VR::SQ {
        DataElement::new(tag, VR::SQ, DataSetSequence::from(Vec::<InMemDicomObject>::new()))
    } else {
        DataElement::new(tag, vr, PrimitiveValue::Empty)
    }
}

// === 通用模块 ===

pub const PATIENT: Module = Module {
    name: "Patient",
    required: &["PatientName", "PatientID", "PatientBirthDate", "PatientSex"],
    optional: &[],
};

pub const GENERAL_STUDY: Module = Module {
    name: "GeneralStudy",
    required: &[
        "StudyInstanceUID",
        "StudyDate",
        "StudyTime",
        "ReferringPhysicianName",
        "StudyID",
        "AccessionNumber",
    ],
    optional: &["StudyDescription"],
};

pub const GENERAL_EQUIPMENT: Module = Module {
    name: "GeneralEquipment",
    required: &["Manufacturer"],
    optional: &[],
};

pub const ENHANCED_GENERAL_EQUIPMENT: Module = Module {
    name: "EnhancedGeneralEquipment",
    required: &[
        "Manufacturer",
        "ManufacturerModelName",
        "DeviceSerialNumber",
        "SoftwareVersions",
    ],
    optional: &[],
};

pub const SOP_COMMON: Module = Module {
    name: "SOPCommon",
    required: &["SOPClassUID", "SOPInstanceUID"],
    optional: &["InstanceNumber"],
};

pub const GENERAL_SERIES: Module = Module {
    name: "GeneralSeries",
    required: &["Modality", "SeriesInstanceUID", "SeriesNumber", "Laterality"],
    optional: &["SeriesDate", "SeriesTime", "SeriesDescription", "BodyPartExamined"],
};

pub const GENERAL_IMAGE: Module = Module {
    name: "GeneralImage",
    required: &["InstanceNumber", "PatientOrientation", "ContentDate", "ContentTime"],
    optional: &[
        "ImageType",
        "AcquisitionNumber",
        "AcquisitionDate",
        "AcquisitionTime",
        "ImagesInAcquisition",
        "ImageComments",
    ],
};

pub const IMAGE_PIXEL: Module = Module {
    name: "ImagePixel",
    required: &[
        "SamplesPerPixel",
        "PhotometricInterpretation",
        "Rows",
        "Columns",
        "BitsAllocated",
        "BitsStored",
        "HighBit",
        "PixelRepresentation",
        "PixelData",
    ],
    optional: &["PlanarConfiguration"],
};

pub const FRAME_OF_REFERENCE: Module = Module {
    name: "FrameOfReference",
    required: &["FrameOfReferenceUID", "PositionReferenceIndicator"],
    optional: &[],
};

pub const IMAGE_PLANE: Module = Module {
    name: "ImagePlane",
    required: &[
        "PixelSpacing",
        "ImageOrientationPatient",
        "ImagePositionPatient",
        "SliceThickness",
    ],
    optional: &[],
};

pub const ACQUISITION_CONTEXT: Module = Module {
    name: "AcquisitionContext",
    required: &["AcquisitionContextSequence"],
    optional: &[],
};

pub const MULTI_FRAME_FUNCTIONAL_GROUPS: Module = Module {
    name: "MultiFrameFunctionalGroups",
    required: &[
        "SharedFunctionalGroupsSequence",
        "InstanceNumber",
        "ContentDate",
        "ContentTime",
        "NumberOfFrames",
    ],
    optional: &["PerFrameFunctionalGroupsSequence"],
};

pub const MULTI_FRAME_DIMENSION: Module = Module {
    name: "MultiFrameDimension",
    required: &["DimensionOrganizationSequence", "DimensionIndexSequence"],
    optional: &["DimensionOrganizationType"],
};

pub const SPECIMEN: Module = Module {
    name: "Specimen",
    required: &[
        "ContainerIdentifier",
        "IssuerOfTheContainerIdentifierSequence",
        "ContainerTypeCodeSequence",
        "SpecimenDescriptionSequence",
    ],
    optional: &[],
};

// === 图像专用模块 ===

pub const SC_EQUIPMENT: Module = Module {
    name: "SCEquipment",
    required: &["ConversionType"],
    optional: &[],
};

pub const SC_IMAGE: Module = Module {
    name: "SCImage",
    required: &[],
    optional: &["PixelSpacing"],
};

pub const CR_SERIES: Module = Module {
    name: "CRSeries",
    required: &["BodyPartExamined", "ViewPosition"],
    optional: &[],
};

pub const CR_IMAGE: Module = Module {
    name: "CRImage",
    required: &["PhotometricInterpretation"],
    optional: &["PixelSpacing"],
};

pub const CT_IMAGE: Module = Module {
    name: "CTImage",
    required: &[
        "ImageType",
        "SamplesPerPixel",
        "PhotometricInterpretation",
        "BitsAllocated",
        "BitsStored",
        "HighBit",
        "RescaleIntercept",
        "RescaleSlope",
        "KVP",
        "AcquisitionNumber",
    ],
    optional: &["RescaleType"],
};

pub const WHOLE_SLIDE_MICROSCOPY_SERIES: Module = Module {
    name: "WholeSlideMicroscopySeries",
    required: &[],
    optional: &[],
};

pub const WHOLE_SLIDE_MICROSCOPY_IMAGE: Module = Module {
    name: "WholeSlideMicroscopyImage",
    required: &[
        "ImageType",
        "ImagedVolumeWidth",
        "ImagedVolumeHeight",
        "ImagedVolumeDepth",
        "TotalPixelMatrixColumns",
        "TotalPixelMatrixRows",
        "TotalPixelMatrixOriginSequence",
        "ImageOrientationSlide",
        "SamplesPerPixel",
        "PhotometricInterpretation",
        "NumberOfFrames",
        "BitsAllocated",
        "BitsStored",
        "HighBit",
        "AcquisitionDateTime",
        "AcquisitionDuration",
        "LossyImageCompression",
        "VolumetricProperties",
        "SpecimenLabelInImage",
        "BurnedInAnnotation",
        "FocusMethod",
        "ExtendedDepthOfField",
    ],
    optional: &[
        "TotalPixelMatrixFocalPlanes",
        "PresentationLUTShape",
        "RescaleIntercept",
        "RescaleSlope",
    ],
};

pub const OPTICAL_PATH: Module = Module {
    name: "OpticalPath",
    required: &["OpticalPathSequence"],
    optional: &["NumberOfOpticalPaths"],
};

// === 显示状态模块 ===

pub const PRESENTATION_SERIES: Module = Module {
    name: "PresentationSeries",
    required: &["Modality"],
    optional: &[],
};

pub const PRESENTATION_STATE_IDENTIFICATION: Module = Module {
    name: "PresentationStateIdentification",
    required: &[
        "PresentationCreationDate",
        "PresentationCreationTime",
        "InstanceNumber",
        "ContentLabel",
        "ContentDescription",
        "ContentCreatorName",
    ],
    optional: &[],
};

pub const PRESENTATION_STATE_RELATIONSHIP: Module = Module {
    name: "PresentationStateRelationship",
    required: &["ReferencedSeriesSequence"],
    optional: &[],
};

pub const DISPLAYED_AREA: Module = Module {
    name: "DisplayedArea",
    required: &["DisplayedAreaSelectionSequence"],
    optional: &[],
};

pub const GRAPHIC_ANNOTATION: Module = Module {
    name: "GraphicAnnotation",
    required: &["GraphicAnnotationSequence"],
    optional: &[],
};

pub const GRAPHIC_LAYER: Module = Module {
    name: "GraphicLayer",
    required: &["GraphicLayerSequence"],
    optional: &[],
};

pub const SOFTCOPY_PRESENTATION_LUT: Module = Module {
    name: "SoftcopyPresentationLUT",
    required: &["PresentationLUTShape"],
    optional: &[],
};

pub const SOFTCOPY_VOI_LUT: Module = Module {
    name: "SoftcopyVOILUT",
    required: &[],
    optional: &["SoftcopyVOILUTSequence"],
};

pub const ICC_PROFILE: Module = Module {
    name: "ICCProfile",
    required: &["ICCProfile"],
    optional: &[],
};

// === 结构化报告模块 ===

pub const SR_DOCUMENT_SERIES: Module = Module {
    name: "SRDocumentSeries",
    required: &[
        "Modality",
        "SeriesInstanceUID",
        "SeriesNumber",
        "ReferencedPerformedProcedureStepSequence",
    ],
    optional: &["SeriesDate", "SeriesTime", "SeriesDescription"],
};

pub const SR_DOCUMENT_GENERAL: Module = Module {
    name: "SRDocumentGeneral",
    required: &[
        "InstanceNumber",
        "CompletionFlag",
        "VerificationFlag",
        "ContentDate",
        "ContentTime",
        "PerformedProcedureCodeSequence",
        "CurrentRequestedProcedureEvidenceSequence",
    ],
    optional: &["PreliminaryFlag"],
};

pub const SR_DOCUMENT_CONTENT: Module = Module {
    name: "SRDocumentContent",
    required: &[
        "ValueType",
        "ConceptNameCodeSequence",
        "ContinuityOfContent",
        "ContentSequence",
    ],
    optional: &["ContentTemplateSequence"],
};

pub const KEY_OBJECT_DOCUMENT_SERIES: Module = Module {
    name: "KeyObjectDocumentSeries",
    required: &[
        "Modality",
        "SeriesInstanceUID",
        "SeriesNumber",
        "ReferencedPerformedProcedureStepSequence",
    ],
    optional: &["SeriesDate", "SeriesTime", "SeriesDescription"],
};

pub const KEY_OBJECT_DOCUMENT: Module = Module {
    name: "KeyObjectDocument",
    required: &[
        "InstanceNumber",
        "ContentDate",
        "ContentTime",
        "CurrentRequestedProcedureEvidenceSequence",
    ],
    optional: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::StandardAttributeDictionary;
    use dicom::dictionary_std::tags;

    fn source() -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^John")));
        obj.put(DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("12345")));
        obj
    }

    #[test]
    fn test_copy_required_fills_missing_with_empty() {
        let dict = StandardAttributeDictionary::new();
        let mut target = InMemDicomObject::new_empty();

        PATIENT.copy_required(&source(), &mut target, &dict);

        assert_eq!(target.element(tags::PATIENT_NAME).unwrap().to_str().unwrap(), "Doe^John");
        assert_eq!(target.element(tags::PATIENT_ID).unwrap().to_str().unwrap(), "12345");
        // 源中没有的属性写入显式空值
        let sex = target.element(tags::PATIENT_SEX).unwrap();
        assert_eq!(sex.vr(), VR::CS);
        assert!(sex.value().primitive().map(|p| p.multiplicity() == 0).unwrap_or(false));
    }

    #[test]
    fn test_copy_required_keeps_existing_target_values() {
        let dict = StandardAttributeDictionary::new();
        let mut target = InMemDicomObject::new_empty();
        target.put(DataElement::new(tags::PATIENT_SEX, VR::CS, PrimitiveValue::from("F")));

        PATIENT.copy_required(&source(), &mut target, &dict);

        assert_eq!(target.element(tags::PATIENT_SEX).unwrap().to_str().unwrap(), "F");
    }

    #[test]
    fn test_copy_required_is_idempotent() {
        let dict = StandardAttributeDictionary::new();
        let src = source();
        let mut once = InMemDicomObject::new_empty();
        GENERAL_STUDY.copy_required(&src, &mut once, &dict);
        PATIENT.copy_required(&src, &mut once, &dict);

        let mut twice = once.clone();
        GENERAL_STUDY.copy_required(&src, &mut twice, &dict);
        PATIENT.copy_required(&src, &mut twice, &dict);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_sequence_attributes_default_to_empty_sequence() {
        let dict = StandardAttributeDictionary::new();
        let mut target = InMemDicomObject::new_empty();

        SR_DOCUMENT_CONTENT.copy_required(&InMemDicomObject::new_empty(), &mut target, &dict);

        let content = target.element(tags::CONTENT_SEQUENCE).unwrap();
        assert_eq!(content.vr(), VR::SQ);
        assert_eq!(content.value().items().map(|items| items.len()), Some(0));
    }

    #[test]
    fn test_copy_optional() {
        let dict = StandardAttributeDictionary::new();
        let mut src = InMemDicomObject::new_empty();
        src.put(DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("Chest")));
        let mut target = InMemDicomObject::new_empty();

        GENERAL_STUDY.copy_optional(&src, &mut target, &dict);

        assert_eq!(target.element(tags::STUDY_DESCRIPTION).unwrap().to_str().unwrap(), "Chest");
        assert!(target.element(tags::STUDY_INSTANCE_UID).is_err());
    }

    #[test]
    fn test_module_membership() {
        assert!(GENERAL_SERIES.contains("Laterality"));
        assert!(GENERAL_SERIES.is_required("Laterality"));
        assert!(!GENERAL_SERIES.is_required("SeriesDescription"));
        assert!(!PATIENT.contains("Rows"));
    }
}
