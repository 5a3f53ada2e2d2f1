//! # 记录组装模块
//!
//! 由模块目录组装 DICOM 信息对象 (IOD)：属性字典、模块、序列构建器、
//! 记录、被引用实例、像素数据、显示状态、验证与写出。

pub mod defaults;
pub mod dictionary;
pub mod module;
pub mod pixel;
pub mod presentation;
pub mod record;
pub mod reference;
pub mod sequence;
pub mod validator;
pub mod value;
pub mod writer;

pub use dictionary::{standard_dictionary, AttributeDictionary, StandardAttributeDictionary};
pub use module::Module;
pub use pixel::{add_pixel_data, PixelArray, PixelOptions, PixelSamples};
pub use presentation::{GraphicLayer, GraphicObject, GraphicType, PresentationState, TextObject};
pub use record::{Record, RecordVariant};
pub use reference::{DocumentSummary, ReferencedDocument, ResolveReference};
pub use sequence::{SequenceBuilder, SequenceKind, SeriesReference, TextAnchor};
pub use validator::{RecordValidator, ValidationResult};
pub use value::{AttributeValue, ItemSpec};
pub use writer::{FileWriter, OutputLayout, RecordWriter};
