//! 像素数据
//!
//! 图像类记录 (CR、CT、二次采集、全切片显微) 接收 8 位或 16 位无符号
//! 样本，每像素 1 或 3 个样本，按行优先、样本交错 (PlanarConfiguration 0)
//! 排列。格式检查在修改记录之前完成，不支持的格式不会留下半写入的记录。

use crate::defaults::{plane_position, slide_shared_groups_with};
use crate::record::{Record, RecordVariant};
use crate::value::{AttributeValue, ItemSpec};
use dicom::core::value::PrimitiveValue;
use dicom::core::{DataElement, VR};
use dicom::dictionary_std::tags;
use dicom::object::mem::InMemElement;
use iod_core::{IodError, Result};
use tracing::{debug, info};

/// 像素样本
#[derive(Debug, Clone, PartialEq)]
pub enum PixelSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl PixelSamples {
    pub fn len(&self) -> usize {
        match self {
            PixelSamples::U8(v) => v.len(),
            PixelSamples::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bits_allocated(&self) -> u16 {
        match self {
            PixelSamples::U8(_) => 8,
            PixelSamples::U16(_) => 16,
        }
    }
}

/// 二维像素矩阵
#[derive(Debug, Clone, PartialEq)]
pub struct PixelArray {
    rows: u32,
    columns: u32,
    samples_per_pixel: u16,
    samples: PixelSamples,
}

impl PixelArray {
    pub fn new(rows: u32, columns: u32, samples_per_pixel: u16, samples: PixelSamples) -> Result<Self> {
        if samples_per_pixel != 1 && samples_per_pixel != 3 {
            return Err(IodError::UnsupportedPixelFormat(format!(
                "每像素样本数 {}，仅支持 1 或 3",
                samples_per_pixel
            )));
        }
        let expected = rows as usize * columns as usize * samples_per_pixel as usize;
        if samples.len() != expected {
            return Err(IodError::InvalidArgument(format!(
                "像素样本数 {} 与尺寸 {}x{}x{} 不符",
                samples.len(),
                rows,
                columns,
                samples_per_pixel
            )));
        }
        Ok(Self {
            rows,
            columns,
            samples_per_pixel,
            samples,
        })
    }

    pub fn from_u8(rows: u32, columns: u32, samples_per_pixel: u16, data: Vec<u8>) -> Result<Self> {
        Self::new(rows, columns, samples_per_pixel, PixelSamples::U8(data))
    }

    pub fn from_u16(rows: u32, columns: u32, samples_per_pixel: u16, data: Vec<u16>) -> Result<Self> {
        Self::new(rows, columns, samples_per_pixel, PixelSamples::U16(data))
    }

    /// 由原始小端字节构造，位深只接受 8 或 16
    pub fn from_bytes(
        rows: u32,
        columns: u32,
        samples_per_pixel: u16,
        bits_allocated: u16,
        bytes: &[u8],
    ) -> Result<Self> {
        let samples = match bits_allocated {
            8 => PixelSamples::U8(bytes.to_vec()),
            16 => {
                if bytes.len() % 2 != 0 {
                    return Err(IodError::InvalidArgument("16位像素数据的字节数必须为偶数".to_string()));
                }
                PixelSamples::U16(
                    bytes
                        .chunks_exact(2)
                        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                        .collect(),
                )
            }
            other => {
                return Err(IodError::UnsupportedPixelFormat(format!(
                    "分配位数 {}，仅支持 8 或 16",
                    other
                )))
            }
        };
        Self::new(rows, columns, samples_per_pixel, samples)
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn samples_per_pixel(&self) -> u16 {
        self.samples_per_pixel
    }

    pub fn samples(&self) -> &PixelSamples {
        &self.samples
    }

    pub fn bits_allocated(&self) -> u16 {
        self.samples.bits_allocated()
    }

    /// 截取一个分块，超出矩阵的部分以 0 填充
    fn tile(&self, row_start: u32, column_start: u32, tile_rows: u32, tile_columns: u32) -> PixelSamples {
        match &self.samples {
            PixelSamples::U8(data) => PixelSamples::U8(self.copy_tile(data, row_start, column_start, tile_rows, tile_columns)),
            PixelSamples::U16(data) => PixelSamples::U16(self.copy_tile(data, row_start, column_start, tile_rows, tile_columns)),
        }
    }

    fn copy_tile<T: Copy + Default>(
        &self,
        data: &[T],
        row_start: u32,
        column_start: u32,
        tile_rows: u32,
        tile_columns: u32,
    ) -> Vec<T> {
        let spp = self.samples_per_pixel as usize;
        let mut tile = Vec::with_capacity(tile_rows as usize * tile_columns as usize * spp);
        for r in row_start..row_start + tile_rows {
            for c in column_start..column_start + tile_columns {
                if r < self.rows && c < self.columns {
                    let offset = (r as usize * self.columns as usize + c as usize) * spp;
                    tile.extend_from_slice(&data[offset..offset + spp]);
                } else {
                    tile.extend(std::iter::repeat(T::default()).take(spp));
                }
            }
        }
        tile
    }
}

/// 像素数据写入选项
#[derive(Debug, Clone)]
pub struct PixelOptions {
    /// 未指定时单样本为 MONOCHROME2，三样本为 RGB
    pub photometric_interpretation: Option<String>,
    /// 行间距、列间距 (mm)
    pub pixel_spacing: [f64; 2],
    /// 仅全切片显微图像使用
    pub slice_thickness: f64,
    /// 分块大小 (行, 列)，仅全切片显微图像使用
    pub tile_size: Option<(u32, u32)>,
    /// 写入光路序列的ICC配置，仅全切片显微 RGB 图像使用
    pub icc_profile: Option<Vec<u8>>,
}

impl Default for PixelOptions {
    fn default() -> Self {
        Self {
            photometric_interpretation: None,
            pixel_spacing: [1.0, 1.0],
            slice_thickness: 1.0,
            tile_size: None,
            icc_profile: None,
        }
    }
}

impl PixelOptions {
    pub fn with_pixel_spacing(mut self, row_spacing: f64, column_spacing: f64) -> Self {
        self.pixel_spacing = [row_spacing, column_spacing];
        self
    }

    pub fn with_tile_size(mut self, rows: u32, columns: u32) -> Self {
        self.tile_size = Some((rows, columns));
        self
    }

    pub fn with_photometric_interpretation(mut self, value: impl Into<String>) -> Self {
        self.photometric_interpretation = Some(value.into());
        self
    }
}

/// 检查像素格式与记录类型是否匹配，返回光度解释
fn check_format(variant: RecordVariant, pixels: &PixelArray, options: &PixelOptions) -> Result<String> {
    let default_photometric = if pixels.samples_per_pixel == 3 { "RGB" } else { "MONOCHROME2" };
    let photometric = options
        .photometric_interpretation
        .clone()
        .unwrap_or_else(|| default_photometric.to_string());
    let unsupported = |reason: String| Err(IodError::UnsupportedPixelFormat(format!("{}: {}", variant, reason)));

    let grayscale = |photometric: String| {
        if is_monochrome(&photometric) {
            Ok(photometric)
        } else {
            unsupported(format!("单样本像素的光度解释不能为 {}", photometric))
        }
    };

    match variant {
        RecordVariant::CrImage | RecordVariant::CtImage => {
            if pixels.samples_per_pixel != 1 {
                return unsupported("仅支持单样本像素".to_string());
            }
            grayscale(photometric)
        }
        // 三样本时强制为 RGB
        RecordVariant::SecondaryCapture => {
            if pixels.samples_per_pixel == 3 {
                Ok("RGB".to_string())
            } else {
                grayscale(photometric)
            }
        }
        RecordVariant::WholeSlideMicroscopy => {
            match (photometric.as_str(), pixels.samples_per_pixel) {
                ("MONOCHROME2", 1) | ("RGB", 3) => {}
                (other, spp) => {
                    return unsupported(format!("光度解释 {} 与每像素样本数 {} 不匹配", other, spp))
                }
            }
            if let Some((tile_rows, tile_columns)) = options.tile_size {
                if tile_rows == 0 || tile_columns == 0 {
                    return Err(IodError::InvalidArgument("分块大小必须为正数".to_string()));
                }
            }
            Ok(photometric)
        }
        other => Err(IodError::InvalidArgument(format!("记录类型 {} 不包含像素数据", other))),
    }
}

fn is_monochrome(photometric: &str) -> bool {
    matches!(photometric, "MONOCHROME1" | "MONOCHROME2")
}

fn pixel_data_element(samples: PixelSamples) -> InMemElement {
    match samples {
        PixelSamples::U8(mut bytes) => {
            if bytes.len() % 2 != 0 {
                bytes.push(0);
            }
            DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(bytes.into()))
        }
        PixelSamples::U16(words) => {
            DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(words.into()))
        }
    }
}

fn concat(tiles: Vec<PixelSamples>, bits_allocated: u16) -> PixelSamples {
    if bits_allocated == 8 {
        PixelSamples::U8(
            tiles
                .into_iter()
                .flat_map(|t| match t {
                    PixelSamples::U8(v) => v,
                    PixelSamples::U16(_) => Vec::new(),
                })
                .collect(),
        )
    } else {
        PixelSamples::U16(
            tiles
                .into_iter()
                .flat_map(|t| match t {
                    PixelSamples::U16(v) => v,
                    PixelSamples::U8(_) => Vec::new(),
                })
                .collect(),
        )
    }
}

/// 为图像类记录写入像素数据
pub fn add_pixel_data(record: &mut Record, pixels: &PixelArray, options: &PixelOptions) -> Result<()> {
    let variant = record.variant();
    let photometric = check_format(variant, pixels, options)?;
    let bits = pixels.bits_allocated();

    record.try_set_attribute("SamplesPerPixel", pixels.samples_per_pixel as i64)?;
    record.try_set_attribute("PhotometricInterpretation", photometric.as_str())?;
    if pixels.samples_per_pixel == 3 {
        record.try_set_attribute("PlanarConfiguration", 0)?;
    }
    record.try_set_attribute("BitsAllocated", bits as i64)?;
    record.try_set_attribute("BitsStored", bits as i64)?;
    record.try_set_attribute("HighBit", bits as i64 - 1)?;
    record.try_set_attribute("PixelRepresentation", 0)?;

    if variant == RecordVariant::WholeSlideMicroscopy {
        add_slide_pixel_data(record, pixels, options, &photometric)?;
    } else {
        record.try_set_attribute("Rows", pixels.rows as i64)?;
        record.try_set_attribute("Columns", pixels.columns as i64)?;
        record.try_set_attribute("PixelSpacing", options.pixel_spacing.to_vec())?;
        record.put_element(pixel_data_element(pixels.samples.clone()))?;
    }

    info!(
        "{} 写入像素数据: {}x{}，{} 位，{} 个样本",
        variant, pixels.rows, pixels.columns, bits, pixels.samples_per_pixel
    );
    Ok(())
}

fn add_slide_pixel_data(
    record: &mut Record,
    pixels: &PixelArray,
    options: &PixelOptions,
    photometric: &str,
) -> Result<()> {
    if photometric == "RGB" {
        record.unset_attribute("PresentationLUTShape");
        record.unset_attribute("RescaleIntercept");
        record.unset_attribute("RescaleSlope");
        if let Some(profile) = &options.icc_profile {
            set_optical_path_icc_profile(record, profile)?;
        }
    }

    let [row_spacing, column_spacing] = options.pixel_spacing;
    let (tile_rows, tile_columns) = options.tile_size.unwrap_or((pixels.rows, pixels.columns));

    record.try_set_attribute("Rows", tile_rows as i64)?;
    record.try_set_attribute("Columns", tile_columns as i64)?;
    record.try_set_attribute("ImagedVolumeWidth", pixels.columns as f64 * column_spacing)?;
    record.try_set_attribute("ImagedVolumeHeight", pixels.rows as f64 * row_spacing)?;
    record.try_set_attribute("ImagedVolumeDepth", options.slice_thickness)?;
    record.try_set_attribute("TotalPixelMatrixColumns", pixels.columns as i64)?;
    record.try_set_attribute("TotalPixelMatrixRows", pixels.rows as i64)?;
    record.try_set_attribute(
        "SharedFunctionalGroupsSequence",
        slide_shared_groups_with(options.slice_thickness, options.pixel_spacing),
    )?;

    if (tile_rows, tile_columns) == (pixels.rows, pixels.columns) {
        record.try_set_attribute("NumberOfFrames", 1)?;
        record.try_set_attribute("PerFrameFunctionalGroupsSequence", vec![plane_position(0.0, 0.0, 1, 1)])?;
        return record.put_element(pixel_data_element(pixels.samples.clone()));
    }

    let row_tiles = pixels.rows.div_ceil(tile_rows);
    let column_tiles = pixels.columns.div_ceil(tile_columns);
    let mut frames = Vec::with_capacity((row_tiles * column_tiles) as usize);
    let mut positions: Vec<ItemSpec> = Vec::with_capacity(frames.capacity());

    for row_index in 0..row_tiles {
        for column_index in 0..column_tiles {
            let row_start = row_index * tile_rows;
            let column_start = column_index * tile_columns;
            frames.push(pixels.tile(row_start, column_start, tile_rows, tile_columns));
            positions.push(plane_position(
                column_start as f64 * column_spacing,
                row_start as f64 * row_spacing,
                column_start as i64 + 1,
                row_start as i64 + 1,
            ));
        }
    }
    debug!("全切片图像分块: {} 行 x {} 列", row_tiles, column_tiles);

    record.try_set_attribute("NumberOfFrames", frames.len() as i64)?;
    record.try_set_attribute("PerFrameFunctionalGroupsSequence", AttributeValue::Items(positions))?;
    record.put_element(pixel_data_element(concat(frames, pixels.bits_allocated())))
}

fn set_optical_path_icc_profile(record: &mut Record, profile: &[u8]) -> Result<()> {
    let mut paths = record.items("OpticalPathSequence").to_vec();
    let Some(first) = paths.first_mut() else {
        return Ok(());
    };
    let mut bytes = profile.to_vec();
    if bytes.len() % 2 != 0 {
        bytes.push(0);
    }
    first.put(DataElement::new(tags::ICC_PROFILE, VR::OB, PrimitiveValue::U8(bytes.into())));
    record.put_sequence("OpticalPathSequence", paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{read_floats, read_int, read_items, read_text};

    fn gradient(rows: u32, columns: u32) -> PixelArray {
        let data = (0..rows * columns).map(|i| (i % 256) as u8).collect();
        PixelArray::from_u8(rows, columns, 1, data).unwrap()
    }

    #[test]
    fn test_pixel_array_shape_checks() {
        assert!(matches!(
            PixelArray::from_u8(2, 2, 2, vec![0; 8]),
            Err(IodError::UnsupportedPixelFormat(_))
        ));
        assert!(matches!(
            PixelArray::from_u8(2, 2, 1, vec![0; 3]),
            Err(IodError::InvalidArgument(_))
        ));
        assert!(matches!(
            PixelArray::from_bytes(2, 2, 1, 32, &[0; 16]),
            Err(IodError::UnsupportedPixelFormat(_))
        ));
        let array = PixelArray::from_bytes(1, 2, 1, 16, &[1, 0, 0, 1]).unwrap();
        assert_eq!(array.samples(), &PixelSamples::U16(vec![1, 256]));
    }

    #[test]
    fn test_cr_pixel_data() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        record.initiate();
        let pixels = PixelArray::from_u16(4, 3, 1, vec![1000; 12]).unwrap();

        add_pixel_data(&mut record, &pixels, &PixelOptions::default().with_pixel_spacing(0.5, 0.5)).unwrap();

        let dataset = record.dataset();
        assert_eq!(read_int(dataset, tags::ROWS), Some(4));
        assert_eq!(read_int(dataset, tags::COLUMNS), Some(3));
        assert_eq!(read_int(dataset, tags::BITS_ALLOCATED), Some(16));
        assert_eq!(read_int(dataset, tags::HIGH_BIT), Some(15));
        assert_eq!(read_floats(dataset, tags::PIXEL_SPACING), vec![0.5, 0.5]);
        assert!(dataset.element(tags::PIXEL_DATA).is_ok());
    }

    #[test]
    fn test_cr_rejects_color_without_mutation() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        record.initiate();
        let before = record.dataset().clone();
        let pixels = PixelArray::from_u8(2, 2, 3, vec![0; 12]).unwrap();

        let err = add_pixel_data(&mut record, &pixels, &PixelOptions::default()).unwrap_err();
        assert!(matches!(err, IodError::UnsupportedPixelFormat(_)));
        assert_eq!(record.dataset(), &before);
    }

    #[test]
    fn test_secondary_capture_forces_rgb() {
        let mut record = Record::create_empty(RecordVariant::SecondaryCapture);
        record.initiate();
        let pixels = PixelArray::from_u8(2, 2, 3, vec![128; 12]).unwrap();
        let options = PixelOptions::default().with_photometric_interpretation("MONOCHROME2");

        add_pixel_data(&mut record, &pixels, &options).unwrap();

        assert_eq!(record.text("PhotometricInterpretation").as_deref(), Some("RGB"));
        assert_eq!(read_int(record.dataset(), tags::PLANAR_CONFIGURATION), Some(0));
        assert_eq!(read_int(record.dataset(), tags::SAMPLES_PER_PIXEL), Some(3));
        assert_eq!(record.text("ConversionType").as_deref(), Some("SYN"));
    }

    #[test]
    fn test_secondary_capture_rejects_rgb_single_sample() {
        let mut record = Record::create_empty(RecordVariant::SecondaryCapture);
        record.initiate();
        let before = record.dataset().clone();
        let options = PixelOptions::default().with_photometric_interpretation("RGB");

        let err = add_pixel_data(&mut record, &gradient(2, 2), &options).unwrap_err();
        assert!(matches!(err, IodError::UnsupportedPixelFormat(_)));
        assert_eq!(record.dataset(), &before);

        let options = PixelOptions::default().with_photometric_interpretation("MONOCHROME1");
        add_pixel_data(&mut record, &gradient(2, 2), &options).unwrap();
        assert_eq!(record.text("PhotometricInterpretation").as_deref(), Some("MONOCHROME1"));
        assert_eq!(read_int(record.dataset(), tags::SAMPLES_PER_PIXEL), Some(1));
    }

    #[test]
    fn test_cr_rejects_rgb_photometric_without_mutation() {
        let mut record = Record::create_empty(RecordVariant::CrImage);
        record.initiate();
        let before = record.dataset().clone();
        let options = PixelOptions::default().with_photometric_interpretation("RGB");

        let err = add_pixel_data(&mut record, &gradient(2, 2), &options).unwrap_err();
        assert!(matches!(err, IodError::UnsupportedPixelFormat(_)));
        assert_eq!(record.dataset(), &before);
    }

    #[test]
    fn test_whole_slide_tiling() {
        let mut record = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        record.initiate();
        let pixels = gradient(5, 7);
        let options = PixelOptions::default().with_pixel_spacing(0.5, 0.25).with_tile_size(4, 4);

        add_pixel_data(&mut record, &pixels, &options).unwrap();

        let dataset = record.dataset();
        assert_eq!(read_int(dataset, tags::NUMBER_OF_FRAMES), Some(4));
        assert_eq!(read_int(dataset, tags::ROWS), Some(4));
        assert_eq!(read_int(dataset, tags::TOTAL_PIXEL_MATRIX_COLUMNS), Some(7));
        assert_eq!(read_int(dataset, tags::TOTAL_PIXEL_MATRIX_ROWS), Some(5));
        assert_eq!(record.text("ImagedVolumeWidth").as_deref(), Some("1.75"));
        assert_eq!(record.text("ImagedVolumeHeight").as_deref(), Some("2.5"));

        let frames = record.items("PerFrameFunctionalGroupsSequence");
        assert_eq!(frames.len(), 4);
        let last = &read_items(&frames[3], tags::PLANE_POSITION_SLIDE_SEQUENCE)[0];
        assert_eq!(read_int(last, tags::COLUMN_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX), Some(5));
        assert_eq!(read_int(last, tags::ROW_POSITION_IN_TOTAL_IMAGE_PIXEL_MATRIX), Some(5));

        let data = dataset.element(tags::PIXEL_DATA).unwrap().to_bytes().unwrap();
        assert_eq!(data.len(), 4 * 16);
        // 第二个分块的最后一列超出矩阵，填充为 0
        assert_eq!(data[16 + 3], 0);
        assert_eq!(data[16], 4);
    }

    #[test]
    fn test_whole_slide_rgb_unsets_grayscale_attributes() {
        let mut record = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        record.initiate();
        let pixels = PixelArray::from_u8(2, 2, 3, vec![200; 12]).unwrap();
        let options = PixelOptions {
            icc_profile: Some(vec![1, 2, 3]),
            ..PixelOptions::default()
        };

        add_pixel_data(&mut record, &pixels, &options).unwrap();

        let dataset = record.dataset();
        assert!(dataset.element(tags::PRESENTATION_LUT_SHAPE).is_err());
        assert!(dataset.element(tags::RESCALE_SLOPE).is_err());
        assert_eq!(read_text(dataset, tags::PHOTOMETRIC_INTERPRETATION).as_deref(), Some("RGB"));
        let path = &record.items("OpticalPathSequence")[0];
        assert!(path.element(tags::ICC_PROFILE).is_ok());
    }

    #[test]
    fn test_whole_slide_rejects_mismatched_photometric() {
        let mut record = Record::create_empty(RecordVariant::WholeSlideMicroscopy);
        record.initiate();
        let options = PixelOptions::default().with_photometric_interpretation("RGB");
        let err = add_pixel_data(&mut record, &gradient(2, 2), &options).unwrap_err();
        assert!(matches!(err, IodError::UnsupportedPixelFormat(_)));
    }

    #[test]
    fn test_non_image_record_is_rejected() {
        let mut record = Record::create_empty(RecordVariant::BasicTextSr);
        let err = add_pixel_data(&mut record, &gradient(2, 2), &PixelOptions::default()).unwrap_err();
        assert!(matches!(err, IodError::InvalidArgument(_)));
    }
}
