//! 通用工具函数

use chrono::Local;
use uuid::Uuid;

/// 基于UUID派生的UID根 (ISO/IEC 9834-8)
const UUID_DERIVED_ROOT: &str = "2.25";

/// DS (Decimal String) 最大长度
const DECIMAL_STRING_MAX_LEN: usize = 16;

/// 生成唯一的DICOM标识符
pub fn generate_dicom_uid() -> String {
    format!("{}.{}", UUID_DERIVED_ROOT, Uuid::new_v4().as_u128())
}

/// 生成16位大写十六进制随机标识符
pub fn random_identifier() -> String {
    let value = Uuid::new_v4().as_u128();
    format!("{:016X}", ((value >> 64) as u64) ^ (value as u64))
}

/// 验证DICOM UID格式
pub fn is_valid_dicom_uid(uid: &str) -> bool {
    if uid.is_empty() || uid.len() > 64 {
        return false;
    }

    uid.split('.').all(|component| {
        !component.is_empty()
            && component.chars().all(|c| c.is_ascii_digit())
            && (component == "0" || !component.starts_with('0'))
    })
}

/// 当前日期 (DA, YYYYMMDD)
pub fn current_date() -> String {
    Local::now().format("%Y%m%d").to_string()
}

/// 当前时间 (TM, HHMMSS)
pub fn current_time() -> String {
    Local::now().format("%H%M%S").to_string()
}

/// 当前日期时间 (DT, YYYYMMDDHHMMSS)
pub fn current_datetime() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// 把浮点数格式化为不超过16个字符的DS值
pub fn format_decimal(value: f64) -> String {
    let plain = format!("{}", value);
    if plain.len() <= DECIMAL_STRING_MAX_LEN {
        return plain;
    }

    for precision in (1..DECIMAL_STRING_MAX_LEN).rev() {
        let candidate = format!("{:.*}", precision, value);
        if candidate.len() <= DECIMAL_STRING_MAX_LEN {
            return candidate;
        }
    }

    format!("{:.6e}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_dicom_uid() {
        let uid = generate_dicom_uid();
        assert!(uid.starts_with("2.25."));
        assert!(is_valid_dicom_uid(&uid));
        assert_ne!(uid, generate_dicom_uid());
    }

    #[test]
    fn test_is_valid_dicom_uid() {
        assert!(is_valid_dicom_uid("1.2.840.10008.5.1.4.1.1.4"));
        assert!(is_valid_dicom_uid("1.2.0.3"));
        assert!(!is_valid_dicom_uid(""));
        assert!(!is_valid_dicom_uid("invalid.uid.with.letters"));
        assert!(!is_valid_dicom_uid("1..2"));
        assert!(!is_valid_dicom_uid("1.2."));
        assert!(!is_valid_dicom_uid("1.02.3"));
    }

    #[test]
    fn test_random_identifier() {
        let id = random_identifier();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_current_date_time_formats() {
        assert_eq!(current_date().len(), 8);
        assert_eq!(current_time().len(), 6);
        assert_eq!(current_datetime().len(), 14);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(32.2), "32.2");
        assert_eq!(format_decimal(1.0), "1");
        assert!(format_decimal(1.0 / 3.0).len() <= 16);
        assert!(format_decimal(123456789.123456789).len() <= 16);
    }
}
