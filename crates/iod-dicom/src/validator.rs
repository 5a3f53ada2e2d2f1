//! 记录验证器
//!
//! 组装不会失败，但组装出的记录可能仍然缺值。验证器在写出前或读取
//! 外部文件后检查必需属性、UID 与日期时间格式，给出错误与警告。

use crate::dictionary::{standard_dictionary, AttributeDictionary};
use crate::record::{Record, RecordVariant};
use crate::value::{read_int, read_text};
use dicom::core::value::Value;
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use dicom::object::InMemDicomObject;
use iod_core::models::modality_description;
use iod_core::utils::is_valid_dicom_uid;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const UID_ATTRIBUTES: &[&str] = &[
    "SOPClassUID",
    "SOPInstanceUID",
    "StudyInstanceUID",
    "SeriesInstanceUID",
    "FrameOfReferenceUID",
];

const DATE_ATTRIBUTES: &[&str] = &[
    "PatientBirthDate",
    "StudyDate",
    "SeriesDate",
    "ContentDate",
    "PresentationCreationDate",
];

const TIME_ATTRIBUTES: &[&str] = &[
    "StudyTime",
    "SeriesTime",
    "ContentTime",
    "PresentationCreationTime",
];

/// 记录验证器
#[derive(Debug, Clone)]
pub struct RecordValidator {
    dictionary: Arc<dyn AttributeDictionary>,
    /// 为真时必需属性为空值也视为错误
    strict: bool,
}

impl RecordValidator {
    pub fn new() -> Self {
        Self {
            dictionary: standard_dictionary(),
            strict: false,
        }
    }

    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    /// 验证组装好的记录
    pub fn validate_record(&self, record: &Record) -> ValidationResult {
        self.validate(record.dataset(), Some(record.variant()))
    }

    /// 验证任意数据集，记录类型由 SOPClassUID 推断
    pub fn validate_dataset(&self, obj: &InMemDicomObject) -> ValidationResult {
        let variant = read_text(obj, tags::SOP_CLASS_UID)
            .and_then(|uid| RecordVariant::from_sop_class_uid(&uid));
        self.validate(obj, variant)
    }

    fn validate(&self, obj: &InMemDicomObject, variant: Option<RecordVariant>) -> ValidationResult {
        let mut result = ValidationResult::new();

        match variant {
            Some(variant) => {
                debug!("按记录类型 {} 验证", variant);
                self.validate_required_attributes(obj, variant, &mut result);
            }
            None => result.add_warning("无法识别的SOP类，跳过必需属性检查".to_string()),
        }
        self.validate_uid_format(obj, &mut result);
        self.validate_datetime_format(obj, &mut result);
        self.validate_patient_info(obj, &mut result);
        self.validate_modality(obj, &mut result);
        self.validate_image_info(obj, &mut result);

        if result.is_valid {
            info!("记录验证通过，警告数: {}", result.warning_count());
        } else {
            warn!("记录验证失败: {}", result.get_summary());
        }
        result
    }

    /// 必需属性必须存在；空值视为警告 (严格模式下为错误)
    fn validate_required_attributes(
        &self,
        obj: &InMemDicomObject,
        variant: RecordVariant,
        result: &mut ValidationResult,
    ) {
        let mut checked: Vec<&str> = variant.omitted_attributes().to_vec();
        for module in variant.modules() {
            for &name in module.required {
                if checked.contains(&name) {
                    continue;
                }
                checked.push(name);

                let Some(tag) = self.dictionary.identifier_for(name) else {
                    continue;
                };
                match obj.element(tag) {
                    Err(_) => result.add_error(format!("缺少必需属性 {} ({})", name, module.name)),
                    Ok(element) if is_empty_element(element) => {
                        let message = format!("必需属性 {} 为空", name);
                        if self.strict {
                            result.add_error(message);
                        } else {
                            result.add_warning(message);
                        }
                    }
                    Ok(_) => {}
                }
            }
        }
    }

    fn text(&self, obj: &InMemDicomObject, name: &str) -> Option<String> {
        let tag = self.dictionary.identifier_for(name)?;
        read_text(obj, tag).filter(|s| !s.is_empty())
    }

    fn validate_uid_format(&self, obj: &InMemDicomObject, result: &mut ValidationResult) {
        for name in UID_ATTRIBUTES {
            if let Some(uid) = self.text(obj, name) {
                if !is_valid_dicom_uid(&uid) {
                    result.add_error(format!("{}格式无效: {}", name, uid));
                }
            }
        }
    }

    fn validate_datetime_format(&self, obj: &InMemDicomObject, result: &mut ValidationResult) {
        for name in DATE_ATTRIBUTES {
            if let Some(date) = self.text(obj, name) {
                if !is_valid_dicom_date(&date) {
                    result.add_error(format!("{}格式无效: {}", name, date));
                }
            }
        }
        for name in TIME_ATTRIBUTES {
            if let Some(time) = self.text(obj, name) {
                if !is_valid_dicom_time(&time) {
                    result.add_error(format!("{}格式无效: {}", name, time));
                }
            }
        }
    }

    fn validate_patient_info(&self, obj: &InMemDicomObject, result: &mut ValidationResult) {
        if let Some(sex) = self.text(obj, "PatientSex") {
            if !matches!(sex.as_str(), "M" | "F" | "O") {
                result.add_warning(format!("患者性别值不规范: {}", sex));
            }
        }
        if self.text(obj, "PatientID").is_none() {
            result.add_warning("患者ID为空".to_string());
        }
    }

    fn validate_modality(&self, obj: &InMemDicomObject, result: &mut ValidationResult) {
        if let Some(modality) = self.text(obj, "Modality") {
            if modality_description(&modality).is_none() {
                result.add_warning(format!("未知的模态代码: {}", modality));
            }
        }
    }

    fn validate_image_info(&self, obj: &InMemDicomObject, result: &mut ValidationResult) {
        match (read_int(obj, tags::ROWS), read_int(obj, tags::COLUMNS)) {
            (Some(rows), Some(columns)) => {
                if rows <= 0 || columns <= 0 {
                    result.add_error("图像尺寸必须为正数".to_string());
                }
            }
            (Some(_), None) | (None, Some(_)) => {
                result.add_error("图像尺寸信息不完整，缺少行数或列数".to_string());
            }
            (None, None) => {}
        }

        if let (Some(allocated), Some(stored), Some(high_bit)) = (
            read_int(obj, tags::BITS_ALLOCATED),
            read_int(obj, tags::BITS_STORED),
            read_int(obj, tags::HIGH_BIT),
        ) {
            if stored > allocated {
                result.add_error("存储位数不能大于分配位数".to_string());
            }
            if high_bit + 1 != stored {
                result.add_warning("最高位与存储位数不匹配".to_string());
            }
        }
    }
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn is_empty_element(element: &InMemElement) -> bool {
    match element.value() {
        Value::Primitive(primitive) => {
            primitive.multiplicity() == 0
                || primitive.to_str().trim_matches(|c: char| c == '\0' || c == ' ').is_empty()
        }
        Value::Sequence(sequence) => sequence.items().is_empty(),
        Value::PixelSequence(_) => false,
    }
}

/// 检查是否为有效的DICOM日期 (YYYYMMDD)
pub fn is_valid_dicom_date(date: &str) -> bool {
    if date.len() != 8 || !date.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let (Ok(year), Ok(month), Ok(day)) = (
        date[0..4].parse::<u32>(),
        date[4..6].parse::<u32>(),
        date[6..8].parse::<u32>(),
    ) else {
        return false;
    };

    let last_day = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 400 == 0) || (year % 100 != 0 && year % 4 == 0) => 29,
        2 => 28,
        _ => return false,
    };
    (1..=last_day).contains(&day)
}

/// 检查是否为有效的DICOM时间 (HHMMSS.FFFFFF)
pub fn is_valid_dicom_time(time: &str) -> bool {
    let whole = time.split('.').next().unwrap_or_default();
    if whole.len() < 2 || whole.len() > 6 || whole.len() % 2 != 0 {
        return false;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    // 时、分、秒 (允许闰秒)
    let limits = [23, 59, 60];
    whole
        .as_bytes()
        .chunks(2)
        .zip(limits)
        .all(|(pair, limit)| {
            let value = u32::from(pair[0] - b'0') * 10 + u32::from(pair[1] - b'0');
            value <= limit
        })
}

/// 验证结果
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// 验证错误列表
    pub errors: Vec<String>,
    /// 验证警告列表
    pub warnings: Vec<String>,
    /// 是否通过验证
    pub is_valid: bool,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// 获取验证报告摘要
    pub fn get_summary(&self) -> String {
        if self.is_valid {
            if self.has_warnings() {
                format!("验证通过，但有 {} 个警告", self.warning_count())
            } else {
                "验证完全通过".to_string()
            }
        } else {
            format!("验证失败：{} 个错误，{} 个警告", self.error_count(), self.warning_count())
        }
    }

    /// 获取详细的验证报告
    pub fn get_detailed_report(&self) -> String {
        let mut report = String::new();

        if self.has_errors() {
            report.push_str("=== 验证错误 ===\n");
            for (i, error) in self.errors.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, error));
            }
            report.push('\n');
        }

        if self.has_warnings() {
            report.push_str("=== 验证警告 ===\n");
            for (i, warning) in self.warnings.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, warning));
            }
            report.push('\n');
        }

        report.push_str(&format!("=== 验证结果 ===\n{}\n", self.get_summary()));
        report
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}
