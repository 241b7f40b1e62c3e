//! スライスごとの属性と射線の角度の集約
use time::PrimitiveDateTime;

use crate::converters::convert;
use crate::errors::{Rb5ReaderError, Rb5ReaderResult};
use crate::params::{
    channel_names, resolve_param, slice_path, slicedata_date_time, slicedata_path, ChannelKind,
    ParamLocator,
};
use crate::query::{parse_text, XmlTree};
use crate::readers::{channel_error, load_raw, ScanType};
use crate::reorder::{rotate_rays, zero_azimuth_ray};
use crate::sensors::{pulse_width, radar_constant};
use crate::times::add_seconds;

/// 射線の角度の精度（1/1000度）
const ANGLE_PRECISION: f64 = 1000.0;

/// この角度を超える角度は、負の仰角として扱う。
const NEGATIVE_ANGLE_THRESHOLD: f64 = 270.0;

/// 射線ごとの角度
///
/// 走査方向に移動する角度（PPIは方位角、RHIは仰角）を`moving`、
/// 固定する角度（PPIは仰角、RHIは方位角）を`fixed`とする。
/// すべての配列の要素数は射線数と一致する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RayAngles {
    /// 走査方向の開始角度
    pub moving_start: Vec<f64>,
    /// 走査方向の終了角度
    pub moving_stop: Vec<f64>,
    /// 固定方向の開始角度
    pub fixed_start: Vec<f64>,
    /// 固定方向の終了角度
    pub fixed_stop: Vec<f64>,
    /// 走査方向の中央の角度
    pub moving: Vec<f64>,
    /// 固定方向の中央の角度
    pub fixed: Vec<f64>,
}

impl RayAngles {
    /// 射線数を返す。
    pub fn len(&self) -> usize {
        self.moving_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moving_start.is_empty()
    }

    /// すべての配列の射線を`ray`本分だけ左に回転する。
    pub fn rotate(&mut self, ray: Option<usize>) -> Rb5ReaderResult<()> {
        for angles in [
            &mut self.moving_start,
            &mut self.moving_stop,
            &mut self.fixed_start,
            &mut self.fixed_stop,
            &mut self.moving,
            &mut self.fixed,
        ] {
            rotate_rays(angles, ray, 1)?;
        }

        Ok(())
    }
}

/// スライスの閾値
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SliceThresholds {
    pub csr: Option<f64>,
    pub sqi: Option<f64>,
    pub zsqi: Option<f64>,
    pub log: Option<f64>,
    /// 水平偏波のノイズ電力（dBZ）
    pub noise_power_h: Option<f64>,
    /// 垂直偏波のノイズ電力（dBZ）
    pub noise_power_v: Option<f64>,
}

/// スライス
#[derive(Debug, Clone, PartialEq)]
pub struct SliceInfo {
    /// スライスのインデックス（0始まり）
    pub index: usize,
    /// 固定角度（度）
    pub fixed_angle: f64,
    /// 射線数
    pub ray_count: usize,
    /// ビン数
    pub bin_count: usize,
    /// 要素数
    pub element_count: usize,
    /// 射線数とビン数を決定したチャンネル
    pub primary_channel: String,
    /// `rawdata`のチャンネル名
    pub raw_data_names: Vec<String>,
    /// `rayinfo`のチャンネル名
    pub ray_info_names: Vec<String>,
    /// ビンの距離分解能（km）
    pub range_step: Option<f64>,
    /// 最初のビンの距離（km）
    pub range_start: Option<f64>,
    /// 最後のビンの距離（km）
    pub range_stop: Option<f64>,
    /// 射線の角度分解能（度）
    pub angle_step: f64,
    /// 走査の開始角度（度）
    pub angle_start: Option<f64>,
    /// 走査の終了角度（度）
    pub angle_stop: Option<f64>,
    /// ナイキスト速度（m/s）
    pub nyquist_velocity: Option<f64>,
    /// スペクトル幅の最大値（m/s）
    pub nyquist_width: Option<f64>,
    /// アンテナの回転速度（度/秒）
    pub antenna_speed: Option<f64>,
    /// 1射線あたりのサンプル数
    pub time_samples: Option<u32>,
    /// 二重PRFモード
    pub dual_prf_mode: Option<String>,
    /// PRFのスタガ比
    pub prf_stagger: Option<String>,
    /// 高いPRF（Hz）
    pub high_prf: Option<f64>,
    /// 低いPRF（Hz）
    pub low_prf: Option<f64>,
    /// 閾値
    pub thresholds: SliceThresholds,
    /// パルス幅のインデックス
    pub pulse_width_index: Option<usize>,
    /// パルス幅（マイクロ秒）
    pub pulse_width: Option<f64>,
    /// 水平偏波のレーダー定数
    pub radar_constant_h: Option<f64>,
    /// 垂直偏波のレーダー定数
    pub radar_constant_v: Option<f64>,
    /// 射線ごとの角度
    pub angles: RayAngles,
    /// 真北に最も近い射線のインデックス
    ///
    /// 並べ替えない場合は`None`である。
    pub zero_azimuth_ray: Option<usize>,
    /// 開始日時
    pub start_time: PrimitiveDateTime,
    /// 終了日時
    pub end_time: PrimitiveDateTime,
    /// 所要時間（秒）
    pub duration: f64,
}

impl SliceInfo {
    /// アンテナの回転速度（rpm）を返す。
    pub fn antenna_speed_rpm(&self) -> Option<f64> {
        self.antenna_speed.map(|speed| speed / 360.0 * 60.0)
    }

    /// 二重PRFモードの略称を返す。
    ///
    /// `SdfDPrfMode211`のように記録されている場合に、`SdfDPrfMode`に続く3文字を返す。
    pub fn dual_prf_ratio(&self) -> Option<&str> {
        let mode = self.dual_prf_mode.as_deref()?;
        let ratio = mode.strip_prefix("SdfDPrfMode").unwrap_or(mode);
        Some(ratio.get(..3).unwrap_or(ratio))
    }
}

/// スライスを構築するときに参照する情報
pub(crate) struct SliceContext<'a> {
    pub tree: &'a XmlTree,
    pub blob_region: &'a [u8],
    pub scan_type: ScanType,
    pub sensor_id: &'a str,
    /// 射線数とビン数を決定するチャンネル
    pub primary_channel: &'a str,
    /// `primary_channel`がない場合に使用するチャンネル
    pub default_channel: &'a str,
}

impl SliceContext<'_> {
    /// スライスの値を返す。
    ///
    /// スライスに記録されていない場合は、最初のスライスの値を返す。
    fn slice_value(&self, slice: usize, relative: &str) -> Option<(String, &str)> {
        [slice, 0].into_iter().find_map(|s| {
            let path = format!("{}{relative}", slice_path(s));
            self.tree.value(&path).map(|v| (path, v))
        })
    }

    fn slice_parse<T>(&self, slice: usize, relative: &str) -> Rb5ReaderResult<Option<T>>
    where
        T: std::str::FromStr,
    {
        self.slice_value(slice, relative)
            .map(|(path, value)| parse_text(&path, value))
            .transpose()
    }

    fn slice_require<T>(&self, slice: usize, relative: &str) -> Rb5ReaderResult<T>
    where
        T: std::str::FromStr,
    {
        self.slice_parse(slice, relative)?.ok_or_else(|| {
            Rb5ReaderError::AttributeNotFound(format!("{}{relative}", slice_path(slice)))
        })
    }

    fn slice_string(&self, slice: usize, relative: &str) -> Option<String> {
        self.slice_value(slice, relative)
            .map(|(_, value)| value.trim().to_string())
    }

    /// `rayinfo`のチャンネルを読み込んで物理量を返す。
    ///
    /// チャンネルが記録されていない場合は`None`を返す。
    fn ray_info_values(
        &self,
        slice: usize,
        names: &[String],
        name: &str,
        ray_count: usize,
    ) -> Rb5ReaderResult<Option<Vec<f64>>> {
        let Some(position) = names.iter().position(|n| n == name) else {
            return Ok(None);
        };
        let locator = ParamLocator::new(slice, ChannelKind::RayInfo, position);
        let values = self
            .load_ray_info(locator, ray_count)
            .map_err(|e| channel_error(locator, name, e))?;

        Ok(Some(values))
    }

    fn load_ray_info(&self, locator: ParamLocator, ray_count: usize) -> Rb5ReaderResult<Vec<f64>> {
        let info = resolve_param(self.tree, locator, None)?;
        let raw = load_raw(self.blob_region, &info, ray_count)?;
        let (values, _) = convert(info, &raw);

        Ok(values)
    }

    /// 射線数とビン数を決定するチャンネルの位置を返す。
    fn primary_position(&self, slice: usize, names: &[String]) -> Rb5ReaderResult<usize> {
        if let Some(position) = names.iter().position(|n| n == self.primary_channel) {
            return Ok(position);
        }
        if let Some(position) = names.iter().position(|n| n == self.default_channel) {
            log::warn!(
                "slice {slice}: channel `{}` not found, using `{}` for dimensions",
                self.primary_channel,
                self.default_channel
            );
            return Ok(position);
        }
        match names.first() {
            Some(first) => {
                log::warn!(
                    "slice {slice}: channels `{}` and `{}` not found, using `{first}` for dimensions",
                    self.primary_channel,
                    self.default_channel
                );
                Ok(0)
            }
            None => Err(Rb5ReaderError::AttributeNotFound(format!(
                "{}/rawdata",
                slicedata_path(slice)
            ))),
        }
    }
}

/// スライスを構築する。
///
/// 射線ごとの角度は、真北に最も近い射線が先頭になるように並べ替える。
pub(crate) fn build_slice(ctx: &SliceContext<'_>, index: usize) -> Rb5ReaderResult<SliceInfo> {
    let raw_data_names = channel_names(ctx.tree, index, ChannelKind::RawData);
    let ray_info_names = channel_names(ctx.tree, index, ChannelKind::RayInfo);

    // 射線数とビン数
    let position = ctx.primary_position(index, &raw_data_names)?;
    let locator = ParamLocator::new(index, ChannelKind::RawData, position);
    let primary = resolve_param(ctx.tree, locator, None)
        .map_err(|e| channel_error(locator, &raw_data_names[position], e))?;

    // 開始日時と終了日時
    let start_time = slicedata_date_time(ctx.tree, index)?.ok_or_else(|| {
        Rb5ReaderError::AttributeNotFound(format!(
            "{}/@datetimehighaccuracy",
            slicedata_path(index)
        ))
    })?;
    let duration = slice_duration(ctx, index, &ray_info_names, primary.ray_count)?;
    let end_time = add_seconds(start_time, duration)?;

    // パルス幅とレーダー定数
    let pulse_width_index = ctx.slice_parse::<usize>(index, "/pw_index")?;
    let pulse_width = pulse_width_index.and_then(|i| pulse_width(ctx.sensor_id, i));
    let radar_constant_h = pulse_width_index.and_then(|i| {
        ctx.slice_string(index, "/rspdphradconst")
            .and_then(|list| radar_constant(&list, i))
    });
    let radar_constant_v = pulse_width_index.and_then(|i| {
        ctx.slice_string(index, "/rspdpvradconst")
            .and_then(|list| radar_constant(&list, i))
    });

    let fixed_angle = ctx.slice_require::<f64>(index, "/posangle")?;
    let angle_step = ctx.slice_require::<f64>(index, "/anglestep")?;
    let mut angles = ray_angles(
        ctx,
        index,
        &ray_info_names,
        primary.ray_count,
        fixed_angle,
        angle_step,
    )?;
    let zero_azimuth_ray = zero_azimuth_ray(ctx.scan_type, &angles.moving_start);
    angles.rotate(zero_azimuth_ray)?;

    let thresholds = SliceThresholds {
        csr: ctx.slice_parse(index, "/csr")?,
        sqi: ctx.slice_parse(index, "/sqi")?,
        zsqi: ctx.slice_parse(index, "/zsqi")?,
        log: ctx.slice_parse(index, "/log")?,
        noise_power_h: ctx.slice_parse(index, "/noise_power_dbz")?,
        noise_power_v: ctx.slice_parse(index, "/noise_power_dbz_dpv")?,
    };

    Ok(SliceInfo {
        index,
        fixed_angle,
        ray_count: primary.ray_count,
        bin_count: primary.bin_count,
        element_count: primary.element_count,
        primary_channel: primary.name,
        raw_data_names,
        ray_info_names,
        range_step: ctx.slice_parse(index, "/rangestep")?,
        range_start: ctx.slice_parse(index, "/start_range")?,
        range_stop: ctx.slice_parse(index, "/stoprange")?,
        angle_step,
        angle_start: ctx.slice_parse(index, "/startangle")?,
        angle_stop: ctx.slice_parse(index, "/stopangle")?,
        nyquist_velocity: ctx.slice_parse(index, "/dynv/@max")?,
        nyquist_width: ctx.slice_parse(index, "/dynw/@max")?,
        antenna_speed: ctx.slice_parse(index, "/antspeed")?,
        time_samples: ctx.slice_parse(index, "/timesamp")?,
        dual_prf_mode: ctx.slice_string(index, "/dualprfmode"),
        prf_stagger: ctx.slice_string(index, "/stagger"),
        high_prf: ctx.slice_parse(index, "/highprf")?,
        low_prf: ctx.slice_parse(index, "/lowprf")?,
        thresholds,
        pulse_width_index,
        pulse_width,
        radar_constant_h,
        radar_constant_v,
        angles,
        zero_azimuth_ray,
        start_time,
        end_time,
        duration,
    })
}

/// スライスの所要時間（秒）を返す。
///
/// `timestamp`チャンネルが記録されている場合は、その最大値（ミリ秒）から求める。
/// 記録されていない場合は、アンテナが1回転する時間とする。
fn slice_duration(
    ctx: &SliceContext<'_>,
    index: usize,
    ray_info_names: &[String],
    ray_count: usize,
) -> Rb5ReaderResult<f64> {
    if let Some(timestamps) = ctx.ray_info_values(index, ray_info_names, "timestamp", ray_count)? {
        let max = timestamps.iter().copied().fold(0.0, f64::max);
        return Ok(max / 1000.0);
    }

    log::debug!("slice {index}: duration estimated from antenna speed");
    let speed = match ctx.tree.parse_optional::<f64>("/volume/scan/pargroup/antspeed")? {
        Some(speed) => speed,
        None => ctx.slice_require::<f64>(index, "/antspeed")?,
    };
    if speed <= 0.0 {
        return Err(Rb5ReaderError::InvalidValue {
            path: "/volume/scan/pargroup/antspeed".into(),
            value: format!("{speed}"),
        });
    }

    Ok(360.0 / speed)
}

/// 射線ごとの角度を構築する。
fn ray_angles(
    ctx: &SliceContext<'_>,
    index: usize,
    names: &[String],
    ray_count: usize,
    fixed_angle: f64,
    angle_step: f64,
) -> Rb5ReaderResult<RayAngles> {
    let elevation_scan = ctx.scan_type == ScanType::Elevation;
    let readback = |name: &str, correct: bool| -> Rb5ReaderResult<Option<Vec<f64>>> {
        Ok(ctx
            .ray_info_values(index, names, name, ray_count)?
            .map(|values| {
                values
                    .into_iter()
                    .map(|v| if correct { negative_angle(v) } else { v })
                    .map(round_angle)
                    .collect()
            }))
    };

    let moving_start = readback("startangle", elevation_scan)?.ok_or_else(|| {
        Rb5ReaderError::AttributeNotFound(format!(
            "{}/rayinfo[@refid='startangle']",
            slicedata_path(index)
        ))
    })?;
    let moving_stop = match readback("stopangle", elevation_scan)? {
        Some(values) => values,
        None => moving_start
            .iter()
            .map(|start| round_angle(start + angle_step))
            .collect(),
    };
    let fixed_default = vec![round_angle(fixed_angle); ray_count];
    let fixed_start =
        readback("startfixangle", !elevation_scan)?.unwrap_or_else(|| fixed_default.clone());
    let fixed_stop = readback("stopfixangle", !elevation_scan)?.unwrap_or(fixed_default);

    let moving = mid_angles(&moving_start, &moving_stop);
    let fixed = mid_angles(&fixed_start, &fixed_stop);

    Ok(RayAngles {
        moving_start,
        moving_stop,
        fixed_start,
        fixed_stop,
        moving,
        fixed,
    })
}

/// 270度を超える角度を負の角度に変換する。
pub fn negative_angle(angle: f64) -> f64 {
    if angle > NEGATIVE_ANGLE_THRESHOLD {
        angle - 360.0
    } else {
        angle
    }
}

/// 角度を1/1000度に丸める。
pub fn round_angle(angle: f64) -> f64 {
    (angle * ANGLE_PRECISION).round() / ANGLE_PRECISION
}

/// 開始角度と終了角度の中央の角度を返す。
///
/// 開始角度と終了角度の差が180度を超える場合は、0度をまたいだものとして、
/// 短い方の弧の中央を返す。
pub fn mid_angles(start: &[f64], stop: &[f64]) -> Vec<f64> {
    start
        .iter()
        .zip(stop)
        .map(|(start, stop)| {
            let mut diff = stop - start;
            if diff > 180.0 {
                diff -= 360.0;
            } else if diff < -180.0 {
                diff += 360.0;
            }
            start + diff / 2.0
        })
        .collect()
}
