//! 属性值模型
//!
//! `AttributeValue` 是调用方提供的普通值，写入数据集时按字典声明的
//! 值表示 (VR) 转换为 dicom-rs 的 `PrimitiveValue`。`ItemSpec` 是
//! 序列条目的普通键值描述，交给序列构建器生成真正的条目。

use dicom::core::value::PrimitiveValue;
use dicom::core::{Tag, VR};
use dicom::object::InMemDicomObject;
use iod_core::utils::format_decimal;
use iod_core::{CodedConcept, IodError, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 属性值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// 显式空值
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Texts(Vec<String>),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    /// 序列条目，写入时经由序列构建器
    Items(Vec<ItemSpec>),
    #[serde(skip)]
    Bytes(Vec<u8>),
}

impl AttributeValue {
    /// 是否为列表形式的值
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            AttributeValue::Texts(_)
                | AttributeValue::Ints(_)
                | AttributeValue::Floats(_)
                | AttributeValue::Items(_)
        )
    }

    /// 是否为空列表或空值
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Empty => true,
            AttributeValue::Texts(v) => v.is_empty(),
            AttributeValue::Ints(v) => v.is_empty(),
            AttributeValue::Floats(v) => v.is_empty(),
            AttributeValue::Items(v) => v.is_empty(),
            AttributeValue::Bytes(v) => v.is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_items(&self) -> Option<&[ItemSpec]> {
        match self {
            AttributeValue::Items(items) => Some(items),
            _ => None,
        }
    }

    /// 数值列表视图，文本会被解析
    pub fn as_numbers(&self, attribute: &str) -> Result<Vec<f64>> {
        let parse = |s: &str| {
            s.trim().parse::<f64>().map_err(|_| IodError::InvalidValue {
                attribute: attribute.to_string(),
                reason: format!("无法解析为数值: {}", s),
            })
        };
        match self {
            AttributeValue::Empty => Ok(Vec::new()),
            AttributeValue::Int(i) => Ok(vec![*i as f64]),
            AttributeValue::Float(f) => Ok(vec![*f]),
            AttributeValue::Ints(v) => Ok(v.iter().map(|i| *i as f64).collect()),
            AttributeValue::Floats(v) => Ok(v.clone()),
            AttributeValue::Text(s) => Ok(vec![parse(s)?]),
            AttributeValue::Texts(v) => v.iter().map(|s| parse(s)).collect(),
            AttributeValue::Bytes(v) => Ok(v.iter().map(|b| *b as f64).collect()),
            AttributeValue::Items(_) => Err(IodError::InvalidValue {
                attribute: attribute.to_string(),
                reason: "序列值不能转换为数值".to_string(),
            }),
        }
    }

    /// 文本列表视图，数值按VR格式化
    fn as_strings(&self, vr: VR) -> Vec<String> {
        let float_text = |f: f64| {
            if vr == VR::IS {
                format!("{:.0}", f)
            } else {
                format_decimal(f)
            }
        };
        match self {
            AttributeValue::Empty | AttributeValue::Items(_) | AttributeValue::Bytes(_) => Vec::new(),
            AttributeValue::Text(s) => vec![s.clone()],
            AttributeValue::Texts(v) => v.clone(),
            AttributeValue::Int(i) => vec![i.to_string()],
            AttributeValue::Ints(v) => v.iter().map(|i| i.to_string()).collect(),
            AttributeValue::Float(f) => vec![float_text(*f)],
            AttributeValue::Floats(v) => v.iter().map(|f| float_text(*f)).collect(),
        }
    }

    /// 按值表示转换为原始值
    pub fn to_primitive(&self, attribute: &str, vr: VR) -> Result<PrimitiveValue> {
        let invalid = |reason: String| IodError::InvalidValue {
            attribute: attribute.to_string(),
            reason,
        };

        match self {
            AttributeValue::Empty => Ok(PrimitiveValue::Empty),
            AttributeValue::Items(_) => Err(invalid(format!("序列值不能写入 {:?} 属性", vr))),
            AttributeValue::Bytes(bytes) => match vr {
                VR::OB | VR::UN | VR::OW => Ok(PrimitiveValue::U8(bytes.iter().copied().collect())),
                _ => Err(invalid(format!("字节值不能写入 {:?} 属性", vr))),
            },
            _ if is_textual(vr) => {
                let mut texts = self.as_strings(vr);
                if texts.len() == 1 {
                    Ok(PrimitiveValue::Str(texts.remove(0)))
                } else {
                    Ok(PrimitiveValue::Strs(texts.into_iter().collect()))
                }
            }
            _ => {
                let numbers = self.as_numbers(attribute)?;
                numeric_primitive(vr, &numbers).map_err(invalid)
            }
        }
    }
}

/// 文本类值表示
pub fn is_textual(vr: VR) -> bool {
    matches!(
        vr,
        VR::AE
            | VR::AS
            | VR::CS
            | VR::DA
            | VR::DS
            | VR::DT
            | VR::IS
            | VR::LO
            | VR::LT
            | VR::PN
            | VR::SH
            | VR::ST
            | VR::TM
            | VR::UC
            | VR::UI
            | VR::UR
            | VR::UT
    )
}

fn integers<T: TryFrom<i64>>(numbers: &[f64]) -> std::result::Result<Vec<T>, String> {
    numbers
        .iter()
        .map(|n| {
            if n.fract() != 0.0 {
                return Err(format!("需要整数: {}", n));
            }
            T::try_from(*n as i64).map_err(|_| format!("整数越界: {}", n))
        })
        .collect()
}

fn numeric_primitive(vr: VR, numbers: &[f64]) -> std::result::Result<PrimitiveValue, String> {
    let value = match vr {
        VR::US | VR::OW => PrimitiveValue::U16(integers::<u16>(numbers)?.into_iter().collect()),
        VR::SS => PrimitiveValue::I16(integers::<i16>(numbers)?.into_iter().collect()),
        VR::UL | VR::OL => PrimitiveValue::U32(integers::<u32>(numbers)?.into_iter().collect()),
        VR::SL => PrimitiveValue::I32(integers::<i32>(numbers)?.into_iter().collect()),
        VR::UV => PrimitiveValue::U64(integers::<u64>(numbers)?.into_iter().collect()),
        VR::SV => PrimitiveValue::I64(integers::<i64>(numbers)?.into_iter().collect()),
        VR::OB | VR::UN => PrimitiveValue::U8(integers::<u8>(numbers)?.into_iter().collect()),
        VR::FL | VR::OF => PrimitiveValue::F32(numbers.iter().map(|n| *n as f32).collect()),
        VR::FD | VR::OD => PrimitiveValue::F64(numbers.iter().copied().collect()),
        VR::AT => PrimitiveValue::Tags(
            integers::<u32>(numbers)?
                .into_iter()
                .map(|v| Tag((v >> 16) as u16, (v & 0xFFFF) as u16))
                .collect(),
        ),
        other => return Err(format!("不支持的值表示: {:?}", other)),
    };
    Ok(value)
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<&String> for AttributeValue {
    fn from(value: &String) -> Self {
        AttributeValue::Text(value.clone())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Int(value as i64)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::Float(value as f64)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        AttributeValue::Texts(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        AttributeValue::Texts(value.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        AttributeValue::Ints(value)
    }
}

impl From<Vec<u32>> for AttributeValue {
    fn from(value: Vec<u32>) -> Self {
        AttributeValue::Ints(value.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<u16>> for AttributeValue {
    fn from(value: Vec<u16>) -> Self {
        AttributeValue::Ints(value.into_iter().map(i64::from).collect())
    }
}

impl From<Vec<f64>> for AttributeValue {
    fn from(value: Vec<f64>) -> Self {
        AttributeValue::Floats(value)
    }
}

impl From<Vec<f32>> for AttributeValue {
    fn from(value: Vec<f32>) -> Self {
        AttributeValue::Floats(value.into_iter().map(f64::from).collect())
    }
}

impl From<Vec<ItemSpec>> for AttributeValue {
    fn from(value: Vec<ItemSpec>) -> Self {
        AttributeValue::Items(value)
    }
}

impl From<ItemSpec> for AttributeValue {
    fn from(value: ItemSpec) -> Self {
        AttributeValue::Items(vec![value])
    }
}

/// 序列条目的普通键值描述，保持插入顺序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSpec {
    entries: Vec<(String, AttributeValue)>,
}

impl ItemSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// 编码概念条目 (CodeValue, CodingSchemeDesignator, CodeMeaning)
    pub fn code(concept: &CodedConcept) -> Self {
        Self::new()
            .with("CodeValue", concept.value.as_str())
            .with("CodingSchemeDesignator", concept.scheme.as_str())
            .with("CodeMeaning", concept.meaning.as_str())
    }

    /// 链式设置
    pub fn with(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(key, value);
        self
    }

    /// 设置键值，已存在时就地替换
    pub fn set(&mut self, key: &str, value: impl Into<AttributeValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 以当前条目为默认值，叠加 `overlay` 中的全部键
    pub fn overlaid_with(mut self, overlay: &ItemSpec) -> Self {
        for (key, value) in overlay.iter() {
            self.set(key, value.clone());
        }
        self
    }
}

impl Serialize for ItemSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct ItemSpecVisitor;

impl<'de> Visitor<'de> for ItemSpecVisitor {
    type Value = ItemSpec;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of attribute keywords to values")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> std::result::Result<ItemSpec, M::Error> {
        let mut item = ItemSpec::new();
        while let Some((key, value)) = access.next_entry::<String, AttributeValue>()? {
            item.set(&key, value);
        }
        Ok(item)
    }
}

impl<'de> Deserialize<'de> for ItemSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(ItemSpecVisitor)
    }
}

/// 读取文本值，去除尾部填充
pub fn read_text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = obj.element(tag).ok()?;
    let text = element.to_str().ok()?;
    Some(text.trim_end_matches(|c: char| c == '\0' || c == ' ').to_string())
}

/// 读取非空文本值
pub fn read_non_empty_text(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    read_text(obj, tag).filter(|s| !s.trim().is_empty())
}

/// 读取整数值
pub fn read_int(obj: &InMemDicomObject, tag: Tag) -> Option<i64> {
    obj.element(tag).ok()?.to_int::<i64>().ok()
}

/// 读取多值浮点数
pub fn read_floats(obj: &InMemDicomObject, tag: Tag) -> Vec<f64> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_multi_float64().ok())
        .unwrap_or_default()
}

/// 读取多值整数
pub fn read_ints(obj: &InMemDicomObject, tag: Tag) -> Vec<i64> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_multi_int::<i64>().ok())
        .unwrap_or_default()
}

/// 读取序列条目
pub fn read_items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag).ok().and_then(|e| e.value().items()).unwrap_or(&[])
}

/// 读取编码概念序列中的第一个条目
pub fn read_code(obj: &InMemDicomObject, tag: Tag) -> Option<CodedConcept> {
    use dicom::dictionary_std::tags;

    let item = read_items(obj, tag).first()?;
    Some(CodedConcept::new(
        read_text(item, tags::CODE_VALUE).unwrap_or_default(),
        read_text(item, tags::CODING_SCHEME_DESIGNATOR).unwrap_or_default(),
        read_text(item, tags::CODE_MEANING).unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_conversion() {
        let value = AttributeValue::from("CT");
        assert_eq!(
            value.to_primitive("Modality", VR::CS).unwrap(),
            PrimitiveValue::Str("CT".to_string())
        );

        let value = AttributeValue::from(vec!["ORIGINAL", "PRIMARY"]);
        let primitive = value.to_primitive("ImageType", VR::CS).unwrap();
        assert_eq!(primitive.multiplicity(), 2);
    }

    #[test]
    fn test_numeric_conversion_by_vr() {
        let value = AttributeValue::from(512);
        assert_eq!(value.to_primitive("Rows", VR::US).unwrap(), PrimitiveValue::from(512_u16));

        let value = AttributeValue::from(vec![100.0, 100.0]);
        let primitive = value.to_primitive("GraphicData", VR::FL).unwrap();
        assert_eq!(primitive.multiplicity(), 2);

        // 数值写入 DS 属性时格式化为文本
        let value = AttributeValue::from(32.2);
        assert_eq!(
            value.to_primitive("NumericValue", VR::DS).unwrap(),
            PrimitiveValue::Str("32.2".to_string())
        );

        // 文本写入二进制数值属性时被解析
        let value = AttributeValue::from("2");
        assert_eq!(
            value.to_primitive("GraphicDimensions", VR::US).unwrap(),
            PrimitiveValue::from(2_u16)
        );
    }

    #[test]
    fn test_invalid_numeric_conversion() {
        let value = AttributeValue::from(-1);
        assert!(value.to_primitive("Rows", VR::US).is_err());

        let value = AttributeValue::from("abc");
        assert!(value.to_primitive("Rows", VR::US).is_err());

        let value = AttributeValue::Items(vec![ItemSpec::new()]);
        assert!(value.to_primitive("Rows", VR::US).is_err());
    }

    #[test]
    fn test_tag_conversion() {
        let value = AttributeValue::from(0x0048_0106_i64);
        assert_eq!(
            value.to_primitive("DimensionIndexPointer", VR::AT).unwrap(),
            PrimitiveValue::Tags([Tag(0x0048, 0x0106)].into_iter().collect())
        );
    }

    #[test]
    fn test_item_spec_overlay_keeps_order() {
        let defaults = ItemSpec::new().with("GraphicLayer", "DEFAULT").with("GraphicLayerOrder", "1");
        let overlay = ItemSpec::new().with("GraphicLayerOrder", "2").with("GraphicLayerDescription", "x");
        let merged = defaults.overlaid_with(&overlay);

        let keys: Vec<&str> = merged.keys().collect();
        assert_eq!(keys, vec!["GraphicLayer", "GraphicLayerOrder", "GraphicLayerDescription"]);
        assert_eq!(merged.get("GraphicLayerOrder"), Some(&AttributeValue::from("2")));
    }

    #[test]
    fn test_item_spec_json() {
        let json = r#"{
            "ValueType": "SCOORD",
            "GraphicData": [1.5, 2.5],
            "GraphicType": "POINT",
            "ContentSequence": [{"ValueType": "IMAGE"}]
        }"#;
        let item: ItemSpec = serde_json::from_str(json).unwrap();
        let keys: Vec<&str> = item.keys().collect();
        assert_eq!(keys, vec!["ValueType", "GraphicData", "GraphicType", "ContentSequence"]);
        assert_eq!(item.get("GraphicData"), Some(&AttributeValue::Floats(vec![1.5, 2.5])));
        assert!(item.get("ContentSequence").unwrap().as_items().is_some());

        let back = serde_json::to_string(&item).unwrap();
        let again: ItemSpec = serde_json::from_str(&back).unwrap();
        assert_eq!(again, item);
    }
}
