//! 演示数据生成
//!
//! 每个检查生成若干CR参考图像，再基于这些图像生成测量报告、关键对象选择、
//! 文本报告与灰度表示状态，全部按输出布局写出。

use crate::config::{ComposerConfig, DemoConfig};
use anyhow::{Context, Result};
use iod_core::CodedConcept;
use iod_dicom::{
    add_pixel_data, FileWriter, GraphicLayer, GraphicObject, GraphicType, OutputLayout, PixelArray, PixelOptions,
    PresentationState, Record, RecordVariant, RecordWriter, ReferencedDocument, TextObject,
};
use iod_sr::{BasicTextReport, Coordinates, Finding, KeyObjectDocument, LinearMeasurement, MeasurementReport};
use std::path::PathBuf;
use tracing::{debug, info};

const IMAGE_SERIES: u32 = 1;
const MEASUREMENT_SERIES: u32 = 2;
const KEY_OBJECT_SERIES: u32 = 3;
const TEXT_REPORT_SERIES: u32 = 4;
const PRESENTATION_SERIES: u32 = 5;

const ANNOTATION_LAYER: &str = "MEASUREMENTS";

/// 单个检查写出的文件
#[derive(Debug, Clone)]
pub struct StudyOutput {
    pub study_instance_uid: String,
    pub files: Vec<PathBuf>,
}

/// 生成一个检查并写出
pub fn build_study(index: usize, config: &ComposerConfig) -> Result<StudyOutput> {
    let layout = OutputLayout::new(&config.output.root);
    let writer = FileWriter::new();
    let preserve = config.output.preserve;
    let mut files = Vec::new();

    let images = reference_images(index, &config.demo)?;
    for (position, image) in images.iter().enumerate() {
        let path = layout.path_for_record(image, IMAGE_SERIES, position as u32 + 1)?;
        files.push(writer.write(image, &path, preserve)?);
    }
    let references: Vec<ReferencedDocument> = images
        .iter()
        .map(|image| ReferencedDocument::from_object(image.dataset().clone()))
        .collect();

    let derived = [
        (MEASUREMENT_SERIES, measurement_report(&references, &config.demo)?),
        (KEY_OBJECT_SERIES, key_objects(&references)?),
        (TEXT_REPORT_SERIES, text_report(&references)?),
        (PRESENTATION_SERIES, presentation_state(&references, &config.demo)?),
    ];
    for (series, record) in &derived {
        let path = layout.path_for_record(record, *series, 1)?;
        files.push(writer.write(record, &path, preserve)?);
    }

    let study_instance_uid = images
        .first()
        .and_then(Record::study_instance_uid)
        .context("参考图像缺少 StudyInstanceUID")?;
    info!("检查 {} 已生成: {}，文件数: {}", index, study_instance_uid, files.len());
    Ok(StudyOutput {
        study_instance_uid,
        files,
    })
}

/// 同一检查、同一序列中的CR图像
fn reference_images(index: usize, demo: &DemoConfig) -> Result<Vec<Record>> {
    let mut images: Vec<Record> = Vec::with_capacity(demo.images);

    for position in 0..demo.images {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        record.initiate();
        match images.first() {
            Some(first) => {
                record.inherit_from(first.dataset());
                if let Some(series) = first.series_instance_uid() {
                    record.try_set_attribute("SeriesInstanceUID", series)?;
                }
            }
            None => {
                record.try_set_attribute("PatientName", format!("Demo^Patient{}", index + 1))?;
                record.try_set_attribute("PatientSex", "O")?;
                record.try_set_attribute("StudyDescription", "IOD composer demo")?;
            }
        }
        record.try_set_attribute("InstanceNumber", (position + 1).to_string())?;

        let pixels = gradient(demo.rows, demo.columns, position as u32)?;
        add_pixel_data(&mut record, &pixels, &PixelOptions::default())?;
        debug!("参考图像 {}/{} 已生成", position + 1, demo.images);
        images.push(record);
    }
    Ok(images)
}

/// 12位灰度斜坡，按图像序号错开
fn gradient(rows: u32, columns: u32, offset: u32) -> Result<PixelArray> {
    let data = (0..rows * columns)
        .map(|i| ((i + offset * 97) % 4096) as u16)
        .collect();
    Ok(PixelArray::from_u16(rows, columns, 1, data)?)
}

fn lesion(demo: &DemoConfig) -> (Finding, LinearMeasurement, LinearMeasurement) {
    let (x, y) = (demo.columns as f64 / 2.0, demo.rows as f64 / 2.0);
    let (long, short) = (demo.columns as f64 / 8.0, demo.rows as f64 / 12.0);

    let finding = Finding::new(CodedConcept::sct("52988006", "Lesion"))
        .at_site(CodedConcept::sct("39607008", "Lung structure"));
    let long_axis = LinearMeasurement::new(
        CodedConcept::dcm("G-A193", "Long Axis"),
        long * 2.0,
        Coordinates::polyline(vec![x - long, y, x + long, y]),
    );
    let short_axis = LinearMeasurement::new(
        CodedConcept::dcm("G-A186", "Short Axis"),
        short * 2.0,
        Coordinates::polyline(vec![x, y - short, x, y + short]),
    );
    (finding, long_axis, short_axis)
}

fn measurement_report(references: &[ReferencedDocument], demo: &DemoConfig) -> Result<Record> {
    let mut report = MeasurementReport::enhanced();
    report.initiate(references)?;
    let first = references.first().context("没有参考图像")?;

    let (finding, long_axis, short_axis) = lesion(demo);
    report.add_qualitative_finding(first, &finding, None, None)?;
    report.add_linear_measurement_double_axis(first, &long_axis, &short_axis, &finding)?;
    Ok(report.into_record())
}

fn key_objects(references: &[ReferencedDocument]) -> Result<Record> {
    let mut document = KeyObjectDocument::new();
    document.initiate(references)?;
    document.add_key_documents(references, None)?;
    Ok(document.into_record())
}

fn text_report(references: &[ReferencedDocument]) -> Result<Record> {
    let mut report = BasicTextReport::new();
    report.initiate(references)?;
    report.add_text_node(
        "Solitary pulmonary lesion, see measurement report.",
        &CodedConcept::dcm("121071", "Finding"),
    )?;
    report.add_text_node("Follow-up imaging in 3 months.", &CodedConcept::dcm("121075", "Recommendation"))?;
    Ok(report.into_record())
}

fn presentation_state(references: &[ReferencedDocument], demo: &DemoConfig) -> Result<Record> {
    let mut state = PresentationState::grayscale();
    state.initiate(references)?;
    state.add_graphical_layer(&GraphicLayer::new(ANNOTATION_LAYER, 1))?;

    let first = references.first().context("没有参考图像")?;
    let (_, long_axis, _) = lesion(demo);
    state.add_graphic_object(
        first,
        ANNOTATION_LAYER,
        &GraphicObject::new(GraphicType::Polyline, long_axis.polyline.data.clone()),
    )?;
    let anchor = &long_axis.polyline.data;
    state.add_text_object(
        first,
        ANNOTATION_LAYER,
        &TextObject::at(format!("{:.1} mm", long_axis.value), anchor[0], anchor[1]),
    )?;
    Ok(state.into_record())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(root: &std::path::Path) -> ComposerConfig {
        let mut config = ComposerConfig::default();
        config.output.root = root.to_string_lossy().into_owned();
        config.demo.rows = 32;
        config.demo.columns = 48;
        config
    }

    #[test]
    fn test_build_study_writes_all_records() {
        let dir = tempfile::tempdir().unwrap();
        let config = small_config(dir.path());

        let output = build_study(0, &config).unwrap();
        assert_eq!(output.files.len(), 6);
        for file in &output.files {
            assert!(file.exists(), "{:?}", file);
            assert!(file.starts_with(dir.path().join(&output.study_instance_uid)));
        }

        let report = ReferencedDocument::from_file(&output.files[2]).unwrap();
        assert_eq!(report.summary().modality.as_deref(), Some("SR"));
        assert_eq!(
            report.summary().study_instance_uid.as_deref(),
            Some(output.study_instance_uid.as_str())
        );
        assert_eq!(report.summary().patient_name.as_deref(), Some("Demo^Patient1"));
    }

    #[test]
    fn test_reference_images_share_series() {
        let images = reference_images(1, &DemoConfig::default()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].series_instance_uid(), images[1].series_instance_uid());
        assert_eq!(images[0].study_instance_uid(), images[1].study_instance_uid());
        assert_ne!(images[0].sop_instance_uid(), images[1].sop_instance_uid());
        assert_eq!(images[1].text("InstanceNumber").as_deref(), Some("2"));
    }
}
