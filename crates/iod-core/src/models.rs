//! 核心数据模型定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 编码概念 (Code Value, Coding Scheme Designator, Code Meaning)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodedConcept {
    pub value: String,             // 代码值
    pub scheme: String,            // 编码方案
    pub meaning: String,           // 代码含义
}

impl CodedConcept {
    /// 创建新的编码概念
    pub fn new(value: impl Into<String>, scheme: impl Into<String>, meaning: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            scheme: scheme.into(),
            meaning: meaning.into(),
        }
    }

    /// DICOM 控制术语 (DCM)
    pub fn dcm(value: &str, meaning: &str) -> Self {
        Self::new(value, "DCM", meaning)
    }

    /// SNOMED CT (SCT)
    pub fn sct(value: &str, meaning: &str) -> Self {
        Self::new(value, "SCT", meaning)
    }

    /// UCUM 计量单位
    pub fn ucum(value: &str, meaning: &str) -> Self {
        Self::new(value, "UCUM", meaning)
    }

    /// UMLS
    pub fn umls(value: &str, meaning: &str) -> Self {
        Self::new(value, "UMLS", meaning)
    }
}

impl fmt::Display for CodedConcept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, \"{}\")", self.value, self.scheme, self.meaning)
    }
}

impl From<(&str, &str, &str)> for CodedConcept {
    fn from((value, scheme, meaning): (&str, &str, &str)) -> Self {
        Self::new(value, scheme, meaning)
    }
}

/// 对单个SOP实例的引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SopReference {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
}

impl SopReference {
    pub fn new(sop_class_uid: impl Into<String>, sop_instance_uid: impl Into<String>) -> Self {
        Self {
            sop_class_uid: sop_class_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
        }
    }
}

/// 模态代码对应的描述
pub fn modality_description(code: &str) -> Option<&'static str> {
    let description = match code {
        "AR" => "Autorefraction",
        "ASMT" => "Content Assessment Results",
        "AU" => "Audio",
        "BDUS" => "Bone Densitometry (ultrasound)",
        "BI" => "Biomagnetic imaging",
        "BMD" => "Bone Densitometry (X-Ray)",
        "CR" => "Computed Radiography",
        "CT" => "Computed Tomography",
        "DG" => "Diaphanography",
        "DOC" => "Document",
        "DX" => "Digital Radiography",
        "ECG" => "Electrocardiography",
        "EPS" => "Cardiac Electrophysiology",
        "ES" => "Endoscopy",
        "FID" => "Fiducials",
        "GM" => "General Microscopy",
        "HC" => "Hard Copy",
        "HD" => "Hemodynamic Waveform",
        "IO" => "Intra-Oral Radiography",
        "IOL" => "Intraocular Lens Data",
        "IVOCT" => "Intravascular Optical Coherence Tomography",
        "IVUS" => "Intravascular Ultrasound",
        "KER" => "Keratometry",
        "KO" => "Key Object Selection",
        "LEN" => "Lensometry",
        "LS" => "Laser surface scan",
        "MG" => "Mammography",
        "MR" => "Magnetic Resonance",
        "NM" => "Nuclear Medicine",
        "OAM" => "Ophthalmic Axial Measurements",
        "OCT" => "Optical Coherence Tomography (non-Ophthalmic)",
        "OP" => "Ophthalmic Photography",
        "OPM" => "Ophthalmic Mapping",
        "OPT" => "Ophthalmic Tomography",
        "OPV" => "Ophthalmic Visual Field",
        "OSS" => "Optical Surface Scan",
        "OT" => "Other",
        "PLAN" => "Plan",
        "PR" => "Presentation State",
        "PT" => "Positron emission tomography (PET)",
        "PX" => "Panoramic X-Ray",
        "REG" => "Registration",
        "RESP" => "Respiratory Waveform",
        "RF" => "Radio Fluoroscopy",
        "RG" => "Radiographic imaging (conventional film/screen)",
        "RTDOSE" => "Radiotherapy Dose",
        "RTIMAGE" => "Radiotherapy Image",
        "RTPLAN" => "Radiotherapy Plan",
        "RTRECORD" => "RT Treatment Record",
        "RTSTRUCT" => "Radiotherapy Structure Set",
        "RWV" => "Real World Value Map",
        "SC" => "Secondary Capture",
        "SEG" => "Segmentation",
        "SM" => "Slide Microscopy",
        "SMR" => "Stereometric Relationship",
        "SR" => "SR Document",
        "SRF" => "Subjective Refraction",
        "STAIN" => "Automated Slide Stainer",
        "TG" => "Thermography",
        "US" => "Ultrasound",
        "VA" => "Visual Acuity",
        "XA" => "X-Ray Angiography",
        "XC" => "External-camera Photography",
        _ => return None,
    };
    Some(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coded_concept_display() {
        let code = CodedConcept::dcm("121071", "Finding");
        assert_eq!(code.to_string(), "(121071, DCM, \"Finding\")");
    }

    #[test]
    fn test_coded_concept_from_tuple() {
        let code: CodedConcept = ("mm", "UCUM", "millimeter").into();
        assert_eq!(code, CodedConcept::ucum("mm", "millimeter"));
    }

    #[test]
    fn test_coded_concept_json() {
        let code = CodedConcept::sct("39607008", "Lung");
        let json = serde_json::to_string(&code).unwrap();
        let back: CodedConcept = serde_json::from_str(&json).unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn test_modality_description() {
        assert_eq!(modality_description("CT"), Some("Computed Tomography"));
        assert_eq!(modality_description("XYZ"), None);
    }
}
