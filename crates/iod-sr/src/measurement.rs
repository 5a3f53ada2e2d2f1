//! TID 1500 测量报告
//!
//! 根节点在初始化时固定为四个子节点：内容语言、报告的检查过程、图像库与
//! 成像测量。之后所有操作都只向第四个子节点 (成像测量) 追加一个测量组，
//! 并返回该测量组使用的跟踪标识与跟踪UID。
//!
//! 测量组内子节点的顺序：跟踪标识、跟踪UID、发现类别、发现、发现部位、
//! 编码值、证据节点 (图像、坐标、数值)、文本值、定性评估。

use crate::content::{render, template_item, ContentNode, Coordinates, ImageReference, RelationshipType};
use crate::document::{initiate_document, set_root_concept};
use dicom::dictionary_std::tags;
use dicom::object::InMemDicomObject;
use iod_core::utils::{generate_dicom_uid, random_identifier};
use iod_core::{modality_description, CodedConcept, IodError, Result};
use iod_dicom::sequence::sequence_element;
use iod_dicom::value::read_items;
use iod_dicom::{GraphicType, Record, RecordVariant, ReferencedDocument, ResolveReference};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// 根节点中成像测量容器的位置
const IMAGING_MEASUREMENTS_INDEX: usize = 3;

/// 定性发现 (无轮廓)
pub const TEMPLATE_QUALITATIVE_FINDING: &str = "1501";
/// 区域定性发现 (有轮廓)
pub const TEMPLATE_REGION_FINDING: &str = "1410";

mod concepts {
    use iod_core::CodedConcept;

    pub fn report() -> CodedConcept {
        CodedConcept::dcm("126000", "Imaging Measurement Report")
    }
    pub fn language() -> CodedConcept {
        CodedConcept::dcm("121049", "Language of Content Item and Descendants")
    }
    pub fn english() -> CodedConcept {
        CodedConcept::new("eng", "RFC5646", "English")
    }
    pub fn country() -> CodedConcept {
        CodedConcept::dcm("121046", "Country of Language")
    }
    pub fn united_states() -> CodedConcept {
        CodedConcept::new("US", "ISO3166_1", "United States")
    }
    pub fn procedure_reported() -> CodedConcept {
        CodedConcept::dcm("121058", "Procedure Reported")
    }
    pub fn imaging_procedure() -> CodedConcept {
        CodedConcept::sct("363679005", "Imaging Procedure")
    }
    pub fn image_library() -> CodedConcept {
        CodedConcept::dcm("111028", "Image Library")
    }
    pub fn image_library_group() -> CodedConcept {
        CodedConcept::dcm("126200", "Image Library Group")
    }
    pub fn imaging_measurements() -> CodedConcept {
        CodedConcept::dcm("126010", "Imaging Measurements")
    }
    pub fn modality() -> CodedConcept {
        CodedConcept::dcm("121139", "Modality")
    }
    pub fn study_date() -> CodedConcept {
        CodedConcept::dcm("111060", "Study Date")
    }
    pub fn study_time() -> CodedConcept {
        CodedConcept::dcm("111061", "Study Time")
    }
    pub fn measurement_group() -> CodedConcept {
        CodedConcept::dcm("125007", "Measurement Group")
    }
    pub fn tracking_identifier() -> CodedConcept {
        CodedConcept::dcm("112039", "Tracking Identifier")
    }
    pub fn tracking_uid() -> CodedConcept {
        CodedConcept::dcm("112040", "Tracking Unique Identifier")
    }
    pub fn finding_category() -> CodedConcept {
        CodedConcept::sct("276214006", "Finding category")
    }
    pub fn finding() -> CodedConcept {
        CodedConcept::dcm("121071", "Finding")
    }
    pub fn finding_site() -> CodedConcept {
        CodedConcept::sct("363698007", "Finding Site")
    }
    pub fn qualitative_evaluations() -> CodedConcept {
        CodedConcept::umls("C00034375", "Qualitative Evaluations")
    }
    pub fn anatomical_locations() -> CodedConcept {
        CodedConcept::sct("758637006", "Anatomical locations")
    }
    pub fn center_location() -> CodedConcept {
        CodedConcept::sct("26216008", "Center")
    }
    pub fn center() -> CodedConcept {
        CodedConcept::dcm("111010", "Center")
    }
    pub fn referenced_segment() -> CodedConcept {
        CodedConcept::dcm("121191", "Referenced Segment")
    }
    pub fn source_series() -> CodedConcept {
        CodedConcept::dcm("121232", "Source series for segmentation")
    }
    pub fn volume() -> CodedConcept {
        CodedConcept::sct("118565006", "Volume")
    }
    pub fn millimeter() -> CodedConcept {
        CodedConcept::ucum("mm", "millimeter")
    }
    pub fn cubic_millimeter() -> CodedConcept {
        CodedConcept::ucum("mm3", "cubic millimeter")
    }
}

/// 概念修饰的编码值 (HAS CONCEPT MOD CODE)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedValue {
    pub name: CodedConcept,
    pub value: CodedConcept,
}

/// 概念修饰的文本值 (HAS CONCEPT MOD TEXT)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextValue {
    pub name: CodedConcept,
    pub value: String,
}

/// 定性评估，编码或自由文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitativeEvaluation {
    Code(CodedConcept),
    Text(String),
}

/// 测量组的发现描述与附加内容
///
/// 发现代码不做术语校验，按原样写入。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub finding_type: CodedConcept,
    pub finding_site: Option<CodedConcept>,
    pub finding_category: Option<CodedConcept>,
    pub tracking_id: Option<String>,
    pub tracking_uid: Option<String>,
    #[serde(default)]
    pub coded_values: Vec<CodedValue>,
    #[serde(default)]
    pub text_values: Vec<TextValue>,
    #[serde(default)]
    pub qualitative_evaluations: Vec<QualitativeEvaluation>,
}

impl Finding {
    pub fn new(finding_type: CodedConcept) -> Self {
        Self {
            finding_type,
            finding_site: None,
            finding_category: None,
            tracking_id: None,
            tracking_uid: None,
            coded_values: Vec::new(),
            text_values: Vec::new(),
            qualitative_evaluations: Vec::new(),
        }
    }

    pub fn at_site(mut self, site: CodedConcept) -> Self {
        self.finding_site = Some(site);
        self
    }

    pub fn in_category(mut self, category: CodedConcept) -> Self {
        self.finding_category = Some(category);
        self
    }

    pub fn tracked_as(mut self, tracking_id: impl Into<String>, tracking_uid: impl Into<String>) -> Self {
        self.tracking_id = Some(tracking_id.into());
        self.tracking_uid = Some(tracking_uid.into());
        self
    }

    pub fn with_coded_value(mut self, name: CodedConcept, value: CodedConcept) -> Self {
        self.coded_values.push(CodedValue { name, value });
        self
    }

    pub fn with_text_value(mut self, name: CodedConcept, value: impl Into<String>) -> Self {
        self.text_values.push(TextValue {
            name,
            value: value.into(),
        });
        self
    }

    pub fn with_qualitative_evaluation(mut self, evaluation: QualitativeEvaluation) -> Self {
        self.qualitative_evaluations.push(evaluation);
        self
    }

    /// 调用方未提供时生成跟踪标识与UID
    fn tracking(&self) -> TrackingIdentity {
        TrackingIdentity {
            tracking_id: self
                .tracking_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(random_identifier),
            tracking_uid: self
                .tracking_uid
                .clone()
                .filter(|uid| !uid.is_empty())
                .unwrap_or_else(generate_dicom_uid),
        }
    }
}

/// 测量组的跟踪标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingIdentity {
    pub tracking_id: String,
    pub tracking_uid: String,
}

/// 单轴长度测量，单位 mm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMeasurement {
    /// 测量类型，例如长轴、短轴
    pub measurement_type: CodedConcept,
    pub value: f64,
    pub polyline: Coordinates,
}

impl LinearMeasurement {
    pub fn new(measurement_type: CodedConcept, value: f64, polyline: Coordinates) -> Self {
        Self {
            measurement_type,
            value,
            polyline,
        }
    }

    fn node(&self, source: &ImageReference) -> Result<ContentNode> {
        self.polyline.ensure_graphic_type(GraphicType::Polyline)?;
        let anchor = ContentNode::scoord(RelationshipType::InferredFrom, &self.polyline, source.clone())?;
        Ok(ContentNode::num(
            RelationshipType::Contains,
            self.measurement_type.clone(),
            self.value,
            concepts::millimeter(),
        )
        .with_child(anchor))
    }
}

/// 基于分割对象的体积测量，单位 mm3
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeMeasurement {
    pub value: f64,
    pub segment_number: u16,
}

impl VolumeMeasurement {
    pub fn new(value: f64, segment_number: u16) -> Self {
        Self { value, segment_number }
    }

    /// 被引用段、源序列与体积数值三个节点
    fn nodes(&self, segmentation: &ReferencedDocument) -> Result<Vec<ContentNode>> {
        let source_series = segmentation
            .summary()
            .source_series_instance_uid
            .clone()
            .ok_or_else(|| {
                IodError::ReferenceResolution("分割对象缺少源序列 (ReferencedSeriesSequence)".to_string())
            })?;
        let segment = ImageReference::from_document(segmentation)?.with_segment(self.segment_number);

        Ok(vec![
            ContentNode::image(RelationshipType::Contains, segment)
                .with_concept(concepts::referenced_segment()),
            ContentNode::uid_ref(RelationshipType::Contains, concepts::source_series(), source_series),
            ContentNode::num(
                RelationshipType::Contains,
                concepts::volume(),
                self.value,
                concepts::cubic_millimeter(),
            ),
        ])
    }
}

fn center_node(coordinates: &Coordinates, source: ImageReference) -> Result<ContentNode> {
    coordinates.ensure_graphic_type(GraphicType::Point)?;
    Ok(ContentNode::scoord(RelationshipType::Contains, coordinates, source)?.with_concept(concepts::center()))
}

/// 编码修饰相对证据节点的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodedPlacement {
    BeforeEvidence,
    AfterEvidence,
}

/// 测量报告 (增强型、综合型或三维综合型 SR)
#[derive(Debug, Clone)]
pub struct MeasurementReport {
    record: Record,
}

impl MeasurementReport {
    /// 仅接受可以承载 TID 1500 的 SR 类型
    pub fn new(variant: RecordVariant) -> Result<Self> {
        match variant {
            RecordVariant::EnhancedSr | RecordVariant::ComprehensiveSr | RecordVariant::Comprehensive3dSr => {
                Ok(Self {
                    record: Record::create_empty(variant),
                })
            }
            other => Err(IodError::InvalidArgument(format!("{} 不能承载测量报告", other))),
        }
    }

    pub fn enhanced() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::EnhancedSr),
        }
    }

    pub fn comprehensive_3d() -> Self {
        Self {
            record: Record::create_empty(RecordVariant::Comprehensive3dSr),
        }
    }

    /// 初始化报告并建立固定的根节点结构
    ///
    /// 每个被引用实例在图像库中对应一个 IMAGE 条目，带模态、检查日期与
    /// 检查时间三个采集上下文。
    pub fn initiate<R: ResolveReference>(&mut self, references: &[R]) -> Result<()> {
        let documents = initiate_document(&mut self.record, references)?;
        let library_entries = documents
            .iter()
            .map(library_entry)
            .collect::<Result<Vec<_>>>()?;

        set_root_concept(&mut self.record, &concepts::report(), Some(template_item("1500")))?;

        let root = vec![
            ContentNode::code(RelationshipType::HasConceptMod, concepts::language(), concepts::english())
                .with_child(ContentNode::code(
                    RelationshipType::HasConceptMod,
                    concepts::country(),
                    concepts::united_states(),
                )),
            ContentNode::code(
                RelationshipType::HasConceptMod,
                concepts::procedure_reported(),
                concepts::imaging_procedure(),
            ),
            ContentNode::container(RelationshipType::Contains, concepts::image_library()).with_child(
                ContentNode::container(RelationshipType::Contains, concepts::image_library_group())
                    .with_children(library_entries),
            ),
            ContentNode::container(RelationshipType::Contains, concepts::imaging_measurements()),
        ];
        self.record
            .try_set_attribute("ContentSequence", render(&root))?;

        info!(
            "测量报告已初始化: {}，图像库条目数: {}",
            self.record.sop_instance_uid().unwrap_or_default(),
            documents.len()
        );
        Ok(())
    }

    /// 定性发现
    ///
    /// 空间锚点三选一：不提供坐标时为普通图像引用，提供位置时为坐标节点，
    /// 提供轮廓时为区域坐标节点并使用区域模板。位置与轮廓同时提供时返回
    /// `ConflictingSpatialData`。
    pub fn add_qualitative_finding<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        finding: &Finding,
        location: Option<&Coordinates>,
        contour: Option<&Coordinates>,
    ) -> Result<TrackingIdentity> {
        let (anchor_coordinates, template) = match (location, contour) {
            (Some(_), Some(_)) => {
                warn!("定性发现同时提供了位置与轮廓");
                return Err(IodError::ConflictingSpatialData(
                    "位置数据与轮廓数据只能提供其一".to_string(),
                ));
            }
            (Some(location), None) => (Some(location), TEMPLATE_QUALITATIVE_FINDING),
            (None, Some(contour)) => (Some(contour), TEMPLATE_REGION_FINDING),
            (None, None) => (None, TEMPLATE_QUALITATIVE_FINDING),
        };

        let source = ImageReference::from_document(&reference.resolve()?)?;
        let anchor = match anchor_coordinates {
            Some(coordinates) => ContentNode::scoord(RelationshipType::Contains, coordinates, source)?,
            None => ContentNode::image(RelationshipType::Contains, source),
        };

        // 三维综合型报告中编码修饰位于锚点之后
        let placement = if self.record.variant() == RecordVariant::Comprehensive3dSr {
            CodedPlacement::AfterEvidence
        } else {
            CodedPlacement::BeforeEvidence
        };
        self.append_group_with(finding, Some(template), vec![anchor], placement)
    }

    /// 解剖标志点：由单个 POINT 坐标推断的 "Center" 位置
    pub fn add_landmark<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        point: &Coordinates,
        finding: &Finding,
    ) -> Result<TrackingIdentity> {
        point.ensure_graphic_type(GraphicType::Point)?;
        let source = ImageReference::from_document(&reference.resolve()?)?;
        let landmark = ContentNode::code(
            RelationshipType::Contains,
            concepts::anatomical_locations(),
            concepts::center_location(),
        )
        .with_child(ContentNode::scoord(RelationshipType::InferredFrom, point, source)?);

        self.append_group(finding, None, vec![landmark])
    }

    pub fn add_linear_measurement_single_axis<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        measurement: &LinearMeasurement,
        finding: &Finding,
    ) -> Result<TrackingIdentity> {
        let source = ImageReference::from_document(&reference.resolve()?)?;
        let node = measurement.node(&source)?;
        self.append_group(finding, None, vec![node])
    }

    /// 双轴长度测量 (例如病灶长轴与短轴)，两个 NUM 节点位于同一测量组
    pub fn add_linear_measurement_double_axis<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        first_axis: &LinearMeasurement,
        second_axis: &LinearMeasurement,
        finding: &Finding,
    ) -> Result<TrackingIdentity> {
        let source = ImageReference::from_document(&reference.resolve()?)?;
        let nodes = vec![first_axis.node(&source)?, second_axis.node(&source)?];
        self.append_group(finding, None, nodes)
    }

    /// 体积测量，可选地附带中心点
    ///
    /// 中心点坐标所在的图像由 `center` 中的引用给出。
    pub fn add_volume_measurement<S: ResolveReference + ?Sized>(
        &mut self,
        segmentation: &S,
        volume: &VolumeMeasurement,
        center: Option<(&dyn ResolveReference, &Coordinates)>,
        finding: &Finding,
    ) -> Result<TrackingIdentity> {
        let mut nodes = volume.nodes(&segmentation.resolve()?)?;
        if let Some((reference, coordinates)) = center {
            let source = ImageReference::from_document(&reference.resolve()?)?;
            nodes.push(center_node(coordinates, source)?);
        }
        self.append_group(finding, None, nodes)
    }

    /// 体积测量加中心点与单轴长度测量
    pub fn add_volume_and_linear_measurement_single_axis<S, R>(
        &mut self,
        segmentation: &S,
        reference: &R,
        volume: &VolumeMeasurement,
        center: &Coordinates,
        measurement: &LinearMeasurement,
        finding: &Finding,
    ) -> Result<TrackingIdentity>
    where
        S: ResolveReference + ?Sized,
        R: ResolveReference + ?Sized,
    {
        let mut nodes = volume.nodes(&segmentation.resolve()?)?;
        let source = ImageReference::from_document(&reference.resolve()?)?;
        nodes.push(center_node(center, source.clone())?);
        nodes.push(measurement.node(&source)?);
        self.append_group(finding, None, nodes)
    }

    /// 无法测量的发现：文本原因，由 CIRCLE 区域推断
    pub fn add_unmeasurable_measurement<R: ResolveReference + ?Sized>(
        &mut self,
        reference: &R,
        region: &Coordinates,
        reason: &str,
        finding: &Finding,
    ) -> Result<TrackingIdentity> {
        region.ensure_graphic_type(GraphicType::Circle)?;
        let source = ImageReference::from_document(&reference.resolve()?)?;
        let node = ContentNode::text(RelationshipType::Contains, concepts::qualitative_evaluations(), reason)
            .with_child(ContentNode::scoord(RelationshipType::InferredFrom, region, source)?);
        self.append_group(finding, None, vec![node])
    }

    /// 组装测量组并追加到成像测量容器
    fn append_group(
        &mut self,
        finding: &Finding,
        template: Option<&str>,
        evidence: Vec<ContentNode>,
    ) -> Result<TrackingIdentity> {
        self.append_group_with(finding, template, evidence, CodedPlacement::BeforeEvidence)
    }

    fn append_group_with(
        &mut self,
        finding: &Finding,
        template: Option<&str>,
        evidence: Vec<ContentNode>,
        placement: CodedPlacement,
    ) -> Result<TrackingIdentity> {
        let tracking = finding.tracking();
        let mut group = ContentNode::container(RelationshipType::Contains, concepts::measurement_group());
        if let Some(template) = template {
            group = group.with_template(template);
        }

        group.push(ContentNode::text(
            RelationshipType::HasObsContext,
            concepts::tracking_identifier(),
            tracking.tracking_id.as_str(),
        ));
        group.push(ContentNode::uid_ref(
            RelationshipType::HasObsContext,
            concepts::tracking_uid(),
            tracking.tracking_uid.as_str(),
        ));
        if let Some(category) = &finding.finding_category {
            group.push(ContentNode::code(
                RelationshipType::Contains,
                concepts::finding_category(),
                category.clone(),
            ));
        }
        group.push(ContentNode::code(
            RelationshipType::Contains,
            concepts::finding(),
            finding.finding_type.clone(),
        ));
        if let Some(site) = &finding.finding_site {
            group.push(ContentNode::code(
                RelationshipType::HasConceptMod,
                concepts::finding_site(),
                site.clone(),
            ));
        }
        let coded = finding.coded_values.iter().map(|coded| {
            ContentNode::code(RelationshipType::HasConceptMod, coded.name.clone(), coded.value.clone())
        });
        match placement {
            CodedPlacement::BeforeEvidence => {
                group.children.extend(coded);
                group.children.extend(evidence);
            }
            CodedPlacement::AfterEvidence => {
                group.children.extend(evidence);
                group.children.extend(coded);
            }
        }
        for text in &finding.text_values {
            group.push(ContentNode::text(
                RelationshipType::HasConceptMod,
                text.name.clone(),
                text.value.as_str(),
            ));
        }
        for evaluation in &finding.qualitative_evaluations {
            group.push(match evaluation {
                QualitativeEvaluation::Code(code) => ContentNode::code(
                    RelationshipType::Contains,
                    concepts::qualitative_evaluations(),
                    code.clone(),
                ),
                QualitativeEvaluation::Text(text) => ContentNode::text(
                    RelationshipType::Contains,
                    concepts::qualitative_evaluations(),
                    text.as_str(),
                ),
            });
        }

        self.append_to_measurements(&group)?;
        debug!(
            "测量组已添加: 发现 {}，跟踪标识 {}",
            finding.finding_type, tracking.tracking_id
        );
        Ok(tracking)
    }

    fn append_to_measurements(&mut self, group: &ContentNode) -> Result<()> {
        let built = self
            .record
            .sequence_builder()
            .build("ContentSequence", &[group.to_item()]);

        let mut root = self.record.items("ContentSequence").to_vec();
        let measurements = root.get_mut(IMAGING_MEASUREMENTS_INDEX).ok_or_else(|| {
            IodError::InvalidArgument("测量报告尚未初始化，缺少成像测量容器".to_string())
        })?;
        let mut groups = read_items(measurements, tags::CONTENT_SEQUENCE).to_vec();
        groups.extend(built);
        measurements.put(sequence_element(tags::CONTENT_SEQUENCE, groups));

        self.record.put_sequence("ContentSequence", root)
    }

    /// 成像测量容器中已有的测量组
    pub fn measurement_groups(&self) -> &[InMemDicomObject] {
        self.record
            .items("ContentSequence")
            .get(IMAGING_MEASUREMENTS_INDEX)
            .map(|measurements| read_items(measurements, tags::CONTENT_SEQUENCE))
            .unwrap_or(&[])
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

/// 图像库中的被引用图像条目
fn library_entry(document: &ReferencedDocument) -> Result<ContentNode> {
    let summary = document.summary();
    let mut entry = ContentNode::image(RelationshipType::Contains, ImageReference::from_document(document)?);

    if let Some(modality) = &summary.modality {
        let meaning = modality_description(modality).unwrap_or(modality.as_str());
        entry.push(ContentNode::code(
            RelationshipType::HasAcqContext,
            concepts::modality(),
            CodedConcept::dcm(modality, meaning),
        ));
    }
    if let Some(date) = &summary.study_date {
        entry.push(ContentNode::date(
            RelationshipType::HasAcqContext,
            concepts::study_date(),
            date.as_str(),
        ));
    }
    if let Some(time) = &summary.study_time {
        entry.push(ContentNode::time(
            RelationshipType::HasAcqContext,
            concepts::study_time(),
            time.as_str(),
        ));
    }
    Ok(entry)
}
