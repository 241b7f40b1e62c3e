//! チャンネルの属性の解決
use std::fmt;

use time::PrimitiveDateTime;

use crate::errors::{Rb5ReaderError, Rb5ReaderResult};
use crate::query::XmlTree;
use crate::times::parse_iso8601;

/// 物理量の範囲が宣言されていないチャンネルの範囲
pub const UNDECLARED_RANGE: f64 = -999.0;

/// チャンネルの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// 射線×ビンの2次元データ（`rawdata`要素）
    RawData,
    /// 射線ごとの1次元データ（`rayinfo`要素）
    RayInfo,
}

impl ChannelKind {
    /// XMLヘッダの要素名を返す。
    pub fn element_name(&self) -> &'static str {
        match self {
            ChannelKind::RawData => "rawdata",
            ChannelKind::RayInfo => "rayinfo",
        }
    }

    /// チャンネル名を記録している属性名を返す。
    pub fn name_attribute(&self) -> &'static str {
        match self {
            ChannelKind::RawData => "type",
            ChannelKind::RayInfo => "refid",
        }
    }
}

/// XMLヘッダ内のチャンネルの位置
///
/// `slice`と`position`は0始まりである。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamLocator {
    /// スライスのインデックス
    pub slice: usize,
    /// チャンネルの種類
    pub kind: ChannelKind,
    /// スライス内の同じ種類のチャンネルの中での位置
    pub position: usize,
}

impl ParamLocator {
    pub fn new(slice: usize, kind: ChannelKind, position: usize) -> Self {
        Self {
            slice,
            kind,
            position,
        }
    }

    /// チャンネルの要素を示すパス式を返す。
    pub fn path(&self) -> String {
        format!(
            "{}/{}[{}]",
            slicedata_path(self.slice),
            self.kind.element_name(),
            self.position + 1
        )
    }

    fn attribute_path(&self, attribute: &str) -> String {
        format!("{}/@{attribute}", self.path())
    }
}

impl fmt::Display for ParamLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// スライスを示すパス式を返す。
pub(crate) fn slice_path(slice: usize) -> String {
    format!("/volume/scan/slice[{}]", slice + 1)
}

/// スライスの`slicedata`要素を示すパス式を返す。
pub(crate) fn slicedata_path(slice: usize) -> String {
    format!("{}/slicedata", slice_path(slice))
}

/// 生の値から物理量への変換方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    /// 生の値をそのまま使用する。
    Copy,
    /// 0度から360度の角度に変換する。
    Angular,
    /// 宣言された範囲の物理量に変換する。
    RegularData,
    /// 位相差（`PhiDP`、`uPhiDP`）
    PhiDpData,
    /// 比偏波間位相差（`KDP`、`uKDP`）
    KdpData,
}

impl ConversionMode {
    /// チャンネル名から変換方法を決定する。
    ///
    /// 表に記録されていないチャンネルは`RegularData`とする。
    pub fn from_channel_name(name: &str) -> Self {
        CONVERSION_MODES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, mode)| *mode)
            .unwrap_or(ConversionMode::RegularData)
    }

    /// 宣言された範囲の物理量に変換する方法か確認する。
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            ConversionMode::RegularData | ConversionMode::PhiDpData | ConversionMode::KdpData
        )
    }
}

/// チャンネル名と変換方法の表
const CONVERSION_MODES: &[(&str, ConversionMode)] = &[
    ("dataflag", ConversionMode::Copy),
    ("numpulses", ConversionMode::Copy),
    ("timestamp", ConversionMode::Copy),
    ("txpower", ConversionMode::Copy),
    ("noisepowerh", ConversionMode::Copy),
    ("noisepowerv", ConversionMode::Copy),
    ("startangle", ConversionMode::Angular),
    ("stopangle", ConversionMode::Angular),
    ("startfixangle", ConversionMode::Angular),
    ("stopfixangle", ConversionMode::Angular),
    ("uPhiDP", ConversionMode::PhiDpData),
    ("PhiDP", ConversionMode::PhiDpData),
    ("uKDP", ConversionMode::KdpData),
    ("KDP", ConversionMode::KdpData),
];

/// チャンネルの属性
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// チャンネルの位置
    pub locator: ParamLocator,
    /// チャンネル名
    pub name: String,
    /// BLOB ID
    pub blob_id: u32,
    /// ビット深度
    pub depth: u32,
    /// 射線数
    pub ray_count: usize,
    /// ビン数（`rayinfo`は1）
    pub bin_count: usize,
    /// 生の値の最小値
    pub raw_min: u64,
    /// 生の値の最大値
    pub raw_max: u64,
    /// 生の値の幅
    pub raw_width: u64,
    /// 物理量の最小値
    pub data_min: f64,
    /// 物理量の最大値
    pub data_max: f64,
    /// 物理量の幅
    pub data_width: f64,
    /// 生の値1あたりの物理量
    pub data_step: f64,
    /// 欠測値
    ///
    /// 物理量に変換するまでは`None`である。
    pub no_data: Option<f64>,
    /// 変換方法
    pub conversion: ConversionMode,
    /// 要素数（射線数×ビン数）
    pub element_count: usize,
    /// 1要素のバイト数
    pub byte_size: usize,
    /// チャンネルを記録した`slicedata`要素の日時
    pub date_time: Option<PrimitiveDateTime>,
    /// 真北に最も近い射線のインデックス
    ///
    /// 並べ替えない場合は`None`である。
    pub zero_azimuth_ray: Option<usize>,
}

impl ParamInfo {
    /// 要素単位の回転量を返す。
    ///
    /// 回転量が`usize`の範囲を超える場合は`None`を返す。
    pub fn element_pivot(&self) -> Option<usize> {
        self.zero_azimuth_ray
            .and_then(|ray| ray.checked_mul(self.bin_count))
    }
}

/// ビット深度から生の値の最大値を返す。
pub fn raw_max_for_depth(depth: u32) -> u64 {
    match depth {
        0 => 0,
        1..=63 => (1u64 << depth) - 1,
        _ => u64::MAX,
    }
}

/// XMLヘッダからチャンネルの属性を解決する。
///
/// # 引数
///
/// * `tree` - XMLヘッダ
/// * `locator` - チャンネルの位置
/// * `zero_azimuth_ray` - スライスの真北に最も近い射線のインデックス（未計算の場合は`None`）
///
/// # 戻り値
///
/// `ParamInfo`
pub fn resolve_param(
    tree: &XmlTree,
    locator: ParamLocator,
    zero_azimuth_ray: Option<usize>,
) -> Rb5ReaderResult<ParamInfo> {
    let name = tree
        .require(&locator.attribute_path(locator.kind.name_attribute()))?
        .trim()
        .to_string();
    let blob_id = tree.parse_value::<u32>(&locator.attribute_path("blobid"))?;
    let depth = tree.parse_value::<u32>(&locator.attribute_path("depth"))?;
    let ray_count = tree.parse_value::<usize>(&locator.attribute_path("rays"))?;
    let (bin_count, data_min, data_max) = match locator.kind {
        ChannelKind::RawData => (
            tree.parse_value::<usize>(&locator.attribute_path("bins"))?,
            tree.parse_value::<f64>(&locator.attribute_path("min"))?,
            tree.parse_value::<f64>(&locator.attribute_path("max"))?,
        ),
        ChannelKind::RayInfo => (1, UNDECLARED_RANGE, UNDECLARED_RANGE),
    };
    let element_count = ray_count
        .checked_mul(bin_count)
        .ok_or_else(|| Rb5ReaderError::InvalidValue {
            path: locator.attribute_path("rays"),
            value: format!("{ray_count}x{bin_count}"),
        })?;
    let date_time = slicedata_date_time(tree, locator.slice)?;

    let raw_max = raw_max_for_depth(depth);
    let raw_width = raw_max;
    let data_width = data_max - data_min;
    let data_step = if raw_width == 0 {
        0.0
    } else {
        data_width / raw_width as f64
    };
    let conversion = ConversionMode::from_channel_name(&name);

    log::debug!(
        "{locator}: {name} [{ray_count}x{bin_count}] depth={depth} blobid={blob_id} {conversion:?}"
    );

    Ok(ParamInfo {
        locator,
        name,
        blob_id,
        depth,
        ray_count,
        bin_count,
        raw_min: 0,
        raw_max,
        raw_width,
        data_min,
        data_max,
        data_width,
        data_step,
        no_data: None,
        conversion,
        element_count,
        byte_size: (depth / 8) as usize,
        date_time,
        zero_azimuth_ray,
    })
}

/// スライスに記録されている種類`kind`のチャンネル名を、記録順に返す。
pub fn channel_names(tree: &XmlTree, slice: usize, kind: ChannelKind) -> Vec<String> {
    let path = format!(
        "{}/{}/@{}",
        slicedata_path(slice),
        kind.element_name(),
        kind.name_attribute()
    );
    tree.values(&path)
        .into_iter()
        .map(|v| v.trim().to_string())
        .collect()
}

/// スライスの`slicedata`要素に記録されている日時を返す。
///
/// `datetimehighaccuracy`属性を優先し、記録されていない場合は`date`属性と`time`属性から構築する。
pub fn slicedata_date_time(
    tree: &XmlTree,
    slice: usize,
) -> Rb5ReaderResult<Option<PrimitiveDateTime>> {
    let base = slicedata_path(slice);
    if let Some(value) = tree.value(&format!("{base}/@datetimehighaccuracy")) {
        return parse_iso8601(value).map(Some);
    }
    let date = tree.value(&format!("{base}/@date"));
    let time = tree.value(&format!("{base}/@time"));
    match (date, time) {
        (Some(date), Some(time)) => {
            parse_iso8601(&format!("{} {}", date.trim(), time.trim())).map(Some)
        }
        (None, None) => Ok(None),
        _ => Err(Rb5ReaderError::AttributeNotFound(format!(
            "{base}/@date, {base}/@time"
        ))),
    }
}
