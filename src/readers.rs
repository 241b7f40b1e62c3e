use std::io::Write;
use std::path::{Path, PathBuf};

use time::PrimitiveDateTime;

use crate::blobs::fetch_blob;
use crate::containers::RawFile;
use crate::converters::convert;
use crate::decoders::{byte_size_for_depth, decode_samples, RawSamples};
use crate::errors::{Rb5ReaderError, Rb5ReaderResult};
use crate::params::{resolve_param, ChannelKind, ParamInfo, ParamLocator};
use crate::query::XmlTree;
use crate::slices::{build_slice, SliceContext, SliceInfo};
use crate::times::{format_iso8601, parse_iso8601};

/// サポートする最も古いRB5ファイルのバージョン
pub const MINIMUM_VERSION: &str = "5.2";

/// 射線数とビン数を決定するときに、既定で使用するチャンネル
pub const DEFAULT_CHANNEL: &str = "dBZ";

/// XMLヘッダの最上位の要素名
const ROOT_TAG: &str = "volume";

/// すべてのチャンネルを記録したファイルのファイル名に含まれるデータ種別
const ALL_CHANNELS: &str = "ALL";

/// ファイル名の先頭に記録されている日時の文字数
const FILE_NAME_DATE_TIME_LEN: usize = 16;

/// `Rb5Reader`の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rb5ReaderConfig {
    /// サポートする最も古いバージョン
    pub minimum_version: String,
    /// 射線数とビン数を決定するときに、既定で使用するチャンネル
    pub default_channel: String,
}

impl Default for Rb5ReaderConfig {
    fn default() -> Self {
        Self {
            minimum_version: MINIMUM_VERSION.to_string(),
            default_channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

/// スキャン種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    /// ボリュームスキャン（PPI）
    Volume,
    /// 方位角スキャン（PPI）
    Azimuth,
    /// 仰角スキャン（RHI）
    Elevation,
}

impl ScanType {
    /// XMLヘッダに記録されている文字列を返す。
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanType::Volume => "vol",
            ScanType::Azimuth => "azi",
            ScanType::Elevation => "ele",
        }
    }
}

/// 文字列からスキャン種別を示す`ScanType`に変換する。
impl TryFrom<&str> for ScanType {
    type Error = Rb5ReaderError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            "vol" => Ok(Self::Volume),
            "azi" => Ok(Self::Azimuth),
            "ele" => Ok(Self::Elevation),
            _ => Err(Rb5ReaderError::UnexpectedScanType(value.to_string())),
        }
    }
}

/// レーダーサイト
#[derive(Debug, Clone, PartialEq)]
pub struct SensorInfo {
    /// センサーID
    pub id: String,
    /// サイト名
    pub name: Option<String>,
    /// 経度（度）
    pub longitude: f64,
    /// 緯度（度）
    pub latitude: f64,
    /// 標高（m）
    pub altitude: f64,
    /// 波長（cm）
    pub wavelength: Option<f64>,
    /// ビーム幅（度）
    pub beamwidth: Option<f64>,
}

/// 処理履歴
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryInfo {
    pub pdf_name: Option<String>,
    pub ppdf_name: Option<String>,
    pub sdf_name: Option<String>,
    /// 元になった生データのファイル
    pub raw_data_files: Vec<String>,
    /// 前処理したデータのファイル
    pub preprocessed_files: Vec<String>,
}

/// ボリューム
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeInfo {
    /// バージョン
    pub version: String,
    /// スキャン種別
    pub scan_type: ScanType,
    /// スキャン名（`.vol`などのスキャン種別を除く）
    pub scan_name: String,
    /// 観測日時
    pub date_time: PrimitiveDateTime,
    /// ファイル名に記録されているデータ種別
    pub data_type: Option<String>,
    /// レーダーサイト
    pub sensor: SensorInfo,
    /// 処理履歴
    pub history: Option<HistoryInfo>,
    /// スライス
    pub slices: Vec<SliceInfo>,
}

/// 物理量に変換したチャンネル
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelData {
    /// チャンネルの属性
    pub info: ParamInfo,
    /// 生の値
    pub raw: RawSamples,
    /// 物理量
    pub values: Vec<f64>,
}

/// `Rb5Reader`
#[derive(Debug)]
pub struct Rb5Reader {
    /// パス
    path: Option<PathBuf>,
    /// ファイル全体のバイト列
    raw: RawFile,
    /// XMLヘッダ
    tree: XmlTree,
    /// 設定
    config: Rb5ReaderConfig,
    /// ボリューム
    volume: VolumeInfo,
}

impl Rb5Reader {
    /// RB5ファイルを開く
    ///
    /// # 引数
    ///
    /// * `path` - 開くRB5ファイルのパス
    ///
    /// # 戻り値
    ///
    /// `Rb5Reader`
    pub fn new<P>(path: P) -> Rb5ReaderResult<Self>
    where
        P: AsRef<Path>,
    {
        Self::with_config(path, Rb5ReaderConfig::default())
    }

    /// 設定を指定してRB5ファイルを開く
    ///
    /// データ種別は、ファイル名から決定する。
    ///
    /// # 引数
    ///
    /// * `path` - 開くRB5ファイルのパス
    /// * `config` - 設定
    ///
    /// # 戻り値
    ///
    /// `Rb5Reader`
    pub fn with_config<P>(path: P, config: Rb5ReaderConfig) -> Rb5ReaderResult<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref().to_owned();
        let raw = RawFile::read(&path)?;
        let data_type = data_type_from_file_name(&path);
        let mut reader = Self::open(raw, data_type, config)?;
        reader.path = Some(path);

        Ok(reader)
    }

    /// メモリ上のRB5ファイルを開く
    ///
    /// # 引数
    ///
    /// * `buffer` - RB5ファイル全体のバイト列
    /// * `data_type` - データ種別（ファイル名に記録されているチャンネル名）
    /// * `config` - 設定
    ///
    /// # 戻り値
    ///
    /// `Rb5Reader`
    pub fn from_bytes(
        buffer: Vec<u8>,
        data_type: Option<&str>,
        config: Rb5ReaderConfig,
    ) -> Rb5ReaderResult<Self> {
        let raw = RawFile::from_bytes(buffer)?;
        Self::open(raw, data_type.map(str::to_string), config)
    }

    fn open(
        raw: RawFile,
        data_type: Option<String>,
        config: Rb5ReaderConfig,
    ) -> Rb5ReaderResult<Self> {
        let tree = XmlTree::parse_bytes(raw.header_bytes())?;
        let volume = read_volume(&tree, raw.blob_region(), data_type, &config)?;
        log::info!(
            "RB5 {} {} {} sensor={} slices={}",
            volume.version,
            volume.scan_type.as_str(),
            format_iso8601(volume.date_time),
            volume.sensor.id,
            volume.slices.len()
        );

        Ok(Self {
            path: None,
            raw,
            tree,
            config,
            volume,
        })
    }

    /// パスを返す。
    ///
    /// メモリ上のRB5ファイルを開いた場合は`None`を返す。
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 設定を返す。
    pub fn config(&self) -> &Rb5ReaderConfig {
        &self.config
    }

    /// XMLヘッダを返す。
    pub fn tree(&self) -> &XmlTree {
        &self.tree
    }

    /// BLOB領域を返す。
    pub fn blob_region(&self) -> &[u8] {
        self.raw.blob_region()
    }

    /// ボリュームを返す。
    pub fn volume(&self) -> &VolumeInfo {
        &self.volume
    }

    /// バージョンを返す。
    pub fn version(&self) -> &str {
        &self.volume.version
    }

    /// スキャン種別を返す。
    pub fn scan_type(&self) -> ScanType {
        self.volume.scan_type
    }

    /// レーダーサイトを返す。
    pub fn sensor(&self) -> &SensorInfo {
        &self.volume.sensor
    }

    /// 処理履歴を返す。
    pub fn history(&self) -> Option<&HistoryInfo> {
        self.volume.history.as_ref()
    }

    /// スライスを返す。
    pub fn slices(&self) -> &[SliceInfo] {
        &self.volume.slices
    }

    /// 指定されたチャンネルの位置を返す。
    ///
    /// `rawdata`を優先して検索し、見つからない場合は`rayinfo`を検索する。
    pub fn find_channel(&self, slice: usize, name: &str) -> Option<ParamLocator> {
        let info = self.volume.slices.get(slice)?;
        if let Some(position) = info.raw_data_names.iter().position(|n| n == name) {
            return Some(ParamLocator::new(slice, ChannelKind::RawData, position));
        }
        info.ray_info_names
            .iter()
            .position(|n| n == name)
            .map(|position| ParamLocator::new(slice, ChannelKind::RayInfo, position))
    }

    /// チャンネルの属性を返す。
    ///
    /// 返却する`ParamInfo`には、スライスの真北に最も近い射線のインデックスが記録されている。
    pub fn param_info(&self, locator: ParamLocator) -> Rb5ReaderResult<ParamInfo> {
        let pivot = self
            .volume
            .slices
            .get(locator.slice)
            .and_then(|s| s.zero_azimuth_ray);
        resolve_param(&self.tree, locator, pivot)
    }

    /// チャンネルの生の値を、真北に最も近い射線が先頭になるように並べ替えて返す。
    ///
    /// チャンネルの射線数は、スライスの射線数と一致しなければならない。
    pub fn read_raw(&self, info: &ParamInfo) -> Rb5ReaderResult<RawSamples> {
        let ray_count = self
            .volume
            .slices
            .get(info.locator.slice)
            .map_or(info.ray_count, |s| s.ray_count);
        load_raw(self.raw.blob_region(), info, ray_count)
    }

    /// チャンネルを読み込み、物理量に変換して返す。
    ///
    /// # 引数
    ///
    /// * `slice` - スライスのインデックス（0始まり）
    /// * `name` - チャンネル名
    ///
    /// # 戻り値
    ///
    /// `ChannelData`
    pub fn read_channel(&self, slice: usize, name: &str) -> Rb5ReaderResult<ChannelData> {
        let locator =
            self.find_channel(slice, name)
                .ok_or_else(|| Rb5ReaderError::ChannelNotFound {
                    slice,
                    channel: name.to_string(),
                })?;
        self.read_located_channel(locator)
            .map_err(|e| channel_error(locator, name, e))
    }

    fn read_located_channel(&self, locator: ParamLocator) -> Rb5ReaderResult<ChannelData> {
        let info = self.param_info(locator)?;
        let raw = self.read_raw(&info)?;
        let (values, info) = convert(info, &raw);

        Ok(ChannelData { info, raw, values })
    }

    /// ボリュームの内容を出力する。
    pub fn pretty_print<W>(&self, writer: &mut W) -> Rb5ReaderResult<()>
    where
        W: Write,
    {
        self.write_summary(writer)
            .map_err(|e| Rb5ReaderError::Io(format!("出力に失敗しました。{e}")))
    }

    fn write_summary<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: Write,
    {
        let volume = &self.volume;
        if let Some(path) = &self.path {
            writeln!(writer, "path: {}", path.display())?;
        }
        writeln!(writer, "version: {}", volume.version)?;
        writeln!(writer, "scan type: {}", volume.scan_type.as_str())?;
        writeln!(writer, "scan name: {}", volume.scan_name)?;
        writeln!(writer, "date time: {}", format_iso8601(volume.date_time))?;
        if let Some(data_type) = &volume.data_type {
            writeln!(writer, "data type: {data_type}")?;
        }

        let sensor = &volume.sensor;
        writeln!(writer, "sensor:")?;
        writeln!(writer, "    id: {}", sensor.id)?;
        if let Some(name) = &sensor.name {
            writeln!(writer, "    name: {name}")?;
        }
        writeln!(writer, "    longitude: {}", sensor.longitude)?;
        writeln!(writer, "    latitude: {}", sensor.latitude)?;
        writeln!(writer, "    altitude: {}", sensor.altitude)?;
        if let Some(wavelength) = sensor.wavelength {
            writeln!(writer, "    wavelength: {wavelength} cm")?;
        }
        if let Some(beamwidth) = sensor.beamwidth {
            writeln!(writer, "    beamwidth: {beamwidth}")?;
        }

        if let Some(history) = &volume.history {
            writeln!(writer, "history:")?;
            for (label, name) in [
                ("pdf", &history.pdf_name),
                ("ppdf", &history.ppdf_name),
                ("sdf", &history.sdf_name),
            ] {
                if let Some(name) = name {
                    writeln!(writer, "    {label}: {name}")?;
                }
            }
            for file in &history.raw_data_files {
                writeln!(writer, "    raw data file: {file}")?;
            }
            for file in &history.preprocessed_files {
                writeln!(writer, "    preprocessed file: {file}")?;
            }
        }

        writeln!(writer, "slices: {}", volume.slices.len())?;
        for slice in &volume.slices {
            writeln!(writer, "slice {}:", slice.index)?;
            writeln!(writer, "    fixed angle: {}", slice.fixed_angle)?;
            writeln!(
                writer,
                "    rays x bins: {} x {} ({})",
                slice.ray_count, slice.bin_count, slice.primary_channel
            )?;
            writeln!(writer, "    angle step: {}", slice.angle_step)?;
            if let Some(step) = slice.range_step {
                writeln!(writer, "    range step: {step} km")?;
            }
            if let Some(speed) = slice.antenna_speed {
                writeln!(writer, "    antenna speed: {speed} deg/s")?;
            }
            if let Some(velocity) = slice.nyquist_velocity {
                writeln!(writer, "    nyquist velocity: {velocity} m/s")?;
            }
            if let Some(width) = slice.pulse_width {
                writeln!(writer, "    pulse width: {width} us")?;
            }
            match slice.zero_azimuth_ray {
                Some(ray) => writeln!(writer, "    zero azimuth ray: {ray}")?,
                None => writeln!(writer, "    zero azimuth ray: -")?,
            }
            writeln!(writer, "    start time: {}", format_iso8601(slice.start_time))?;
            writeln!(writer, "    end time: {}", format_iso8601(slice.end_time))?;
            writeln!(writer, "    raw data: {}", slice.raw_data_names.join(", "))?;
            writeln!(writer, "    ray info: {}", slice.ray_info_names.join(", "))?;
        }

        Ok(())
    }
}

/// チャンネルのBLOBを読み込み、真北に最も近い射線が先頭になるように並べ替えて返す。
///
/// チャンネルの射線数がスライスの射線数`ray_count`と一致しない場合、または展開したBLOBの
/// バイト数がXMLヘッダに記録されている要素数と一致しない場合はエラーを返す。
pub(crate) fn load_raw(
    blob_region: &[u8],
    info: &ParamInfo,
    ray_count: usize,
) -> Rb5ReaderResult<RawSamples> {
    let byte_size = byte_size_for_depth(info.depth)?;
    if info.ray_count != ray_count {
        return Err(Rb5ReaderError::DimensionMismatch {
            expected: ray_count.saturating_mul(info.bin_count),
            actual_bytes: info.element_count.saturating_mul(byte_size),
            byte_size,
        });
    }
    let bytes = fetch_blob(blob_region, info.blob_id)?;
    if Some(bytes.len()) != info.element_count.checked_mul(byte_size) {
        return Err(Rb5ReaderError::DimensionMismatch {
            expected: info.element_count,
            actual_bytes: bytes.len(),
            byte_size,
        });
    }
    let mut raw = decode_samples(&bytes, info.depth)?;
    raw.rotate_rays(info.zero_azimuth_ray, info.bin_count)?;

    Ok(raw)
}

/// チャンネルの読み込みエラーに、チャンネルの位置を付与する。
pub(crate) fn channel_error(
    locator: ParamLocator,
    channel: &str,
    source: Rb5ReaderError,
) -> Rb5ReaderError {
    Rb5ReaderError::Channel {
        slice: locator.slice,
        channel: channel.to_string(),
        locator: locator.path(),
        source: Box::new(source),
    }
}

/// ファイル名からデータ種別を返す。
///
/// ファイル名は、16文字の日時、データ種別、拡張子の順で構成されている
/// （例: `2016090715102400dBZ.vol`）。
pub fn data_type_from_file_name<P>(path: P) -> Option<String>
where
    P: AsRef<Path>,
{
    let stem = path.as_ref().file_stem()?.to_str()?;
    let data_type = stem.get(FILE_NAME_DATE_TIME_LEN..)?;
    if data_type.is_empty() {
        None
    } else {
        Some(data_type.to_string())
    }
}

fn read_volume(
    tree: &XmlTree,
    blob_region: &[u8],
    data_type: Option<String>,
    config: &Rb5ReaderConfig,
) -> Rb5ReaderResult<VolumeInfo> {
    // バージョン
    let root = tree.root();
    let version = root
        .attribute("version")
        .ok_or_else(|| Rb5ReaderError::AttributeNotFound("/volume/@version".into()))?
        .trim()
        .to_string();
    if version.as_str() < config.minimum_version.as_str() {
        return Err(Rb5ReaderError::VersionIncompatible {
            version,
            minimum: config.minimum_version.clone(),
        });
    }

    // 最上位の要素
    if root.name != ROOT_TAG {
        return Err(Rb5ReaderError::UnexpectedRootTag(root.name.clone()));
    }

    // スキャン種別
    let scan_type = ScanType::try_from(tree.require("/volume/@type")?)?;
    let scan_name = tree.require("/volume/scan/@name")?.trim();
    let scan_name = scan_name
        .strip_suffix(&format!(".{}", scan_type.as_str()))
        .unwrap_or(scan_name)
        .to_string();
    let date_time = parse_iso8601(tree.require("/volume/@datetime")?)?;

    let sensor = read_sensor(tree)?;
    let history = read_history(tree);

    // スライス
    let slice_count = tree.count("/volume/scan/slice");
    if let Some(numele) = tree.parse_optional::<usize>("/volume/scan/pargroup/numele")? {
        if numele != slice_count {
            log::warn!("pargroup/numele is {numele} but {slice_count} slices are recorded");
        }
    }
    let primary_channel = match data_type.as_deref() {
        Some(ALL_CHANNELS) | None => config.default_channel.as_str(),
        Some(data_type) => data_type,
    };
    let ctx = SliceContext {
        tree,
        blob_region,
        scan_type,
        sensor_id: &sensor.id,
        primary_channel,
        default_channel: &config.default_channel,
    };
    let slices = (0..slice_count)
        .map(|index| build_slice(&ctx, index))
        .collect::<Rb5ReaderResult<Vec<_>>>()?;

    Ok(VolumeInfo {
        version,
        scan_type,
        scan_name,
        date_time,
        data_type,
        sensor,
        history,
        slices,
    })
}

fn read_sensor(tree: &XmlTree) -> Rb5ReaderResult<SensorInfo> {
    Ok(SensorInfo {
        id: tree.require("/volume/sensorinfo/@id")?.trim().to_string(),
        name: tree
            .value("/volume/sensorinfo/@name")
            .map(|v| v.trim().to_string()),
        longitude: tree.parse_value("/volume/sensorinfo/lon")?,
        latitude: tree.parse_value("/volume/sensorinfo/lat")?,
        altitude: tree.parse_value("/volume/sensorinfo/alt")?,
        wavelength: tree
            .parse_optional::<f64>("/volume/sensorinfo/wavelen")?
            .map(|metres| metres * 100.0),
        beamwidth: tree.parse_optional("/volume/sensorinfo/beamwidth")?,
    })
}

fn read_history(tree: &XmlTree) -> Option<HistoryInfo> {
    if !tree.exists("/volume/history") {
        return None;
    }
    let attribute = |name: &str| {
        tree.value(&format!("/volume/history/@{name}"))
            .map(|v| v.trim().to_string())
    };
    let files = |path: &str| {
        tree.values(path)
            .into_iter()
            .map(|v| v.trim().to_string())
            .collect::<Vec<_>>()
    };

    Some(HistoryInfo {
        pdf_name: attribute("pdfname"),
        ppdf_name: attribute("ppdfname"),
        sdf_name: attribute("sdfname"),
        raw_data_files: files("/volume/history/rawdatafiles/file"),
        preprocessed_files: files("/volume/history/preprocessedfiles/file"),
    })
}
