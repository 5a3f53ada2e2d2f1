//! # 结构化报告
//!
//! 在记录与序列构建器之上构建结构化报告的内容树：TID 1500 测量报告、
//! 基本文本报告与关键对象选择文档。

pub mod content;
pub mod document;
pub mod key_object;
pub mod measurement;
pub mod text_report;

pub use content::{
    ContentNode, ContentValue, Coordinates, ImageReference, RelationshipType, ValueType,
};
pub use key_object::KeyObjectDocument;
pub use measurement::{
    CodedValue, Finding, LinearMeasurement, MeasurementReport, QualitativeEvaluation, TextValue,
    TrackingIdentity, VolumeMeasurement,
};
pub use text_report::BasicTextReport;
