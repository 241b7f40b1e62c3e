use crate::decoders::RawSamples;
use crate::params::{ConversionMode, ParamInfo};

/// 角度の最小値
const ANGLE_MIN: f64 = 0.0;

/// 角度の最大値
const ANGLE_MAX: f64 = 360.0;

/// 生の値を物理量に変換する。
///
/// 変換に使用した物理量の範囲、生の値1あたりの物理量、欠測値を`ParamInfo`に記録して返す。
///
/// | 変換方法 | 物理量 | 欠測値 |
/// |---|---|---|
/// | `Copy` | `raw` | `0` |
/// | `Angular` | `raw * step` | `-step` |
/// | その他 | `raw * step - step + min` | `-step + min` |
///
/// # 引数
///
/// * `info` - チャンネルの属性
/// * `raw` - 生の値の配列
///
/// # 戻り値
///
/// 物理量の配列と、更新したチャンネルの属性
pub fn convert(mut info: ParamInfo, raw: &RawSamples) -> (Vec<f64>, ParamInfo) {
    let values = match info.conversion {
        ConversionMode::Copy => {
            info.no_data = Some(0.0);
            raw.iter().map(f64::from).collect()
        }
        ConversionMode::Angular => {
            info.data_min = ANGLE_MIN;
            info.data_max = ANGLE_MAX;
            info.data_width = ANGLE_MAX - ANGLE_MIN;
            info.data_step = step(info.data_width, info.raw_width);
            let (step, min) = (info.data_step, info.data_min);
            info.no_data = Some(0.0 * step - step + min);
            raw.iter().map(|r| f64::from(r) * step + min).collect()
        }
        ConversionMode::RegularData | ConversionMode::PhiDpData | ConversionMode::KdpData => {
            info.data_width = info.data_max - info.data_min;
            info.data_step = step(info.data_width, info.raw_width);
            let (step, min) = (info.data_step, info.data_min);
            info.no_data = Some(0.0 * step - step + min);
            raw.iter().map(|r| f64::from(r) * step - step + min).collect()
        }
    };

    (values, info)
}

fn step(data_width: f64, raw_width: u64) -> f64 {
    if raw_width == 0 {
        0.0
    } else {
        data_width / raw_width as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ChannelKind, ParamLocator, UNDECLARED_RANGE};

    fn info(name: &str, depth: u32, min: f64, max: f64) -> ParamInfo {
        let raw_max = crate::params::raw_max_for_depth(depth);
        ParamInfo {
            locator: ParamLocator::new(0, ChannelKind::RayInfo, 0),
            name: name.to_string(),
            blob_id: 0,
            depth,
            ray_count: 3,
            bin_count: 1,
            raw_min: 0,
            raw_max,
            raw_width: raw_max,
            data_min: min,
            data_max: max,
            data_width: max - min,
            data_step: (max - min) / raw_max as f64,
            no_data: None,
            conversion: ConversionMode::from_channel_name(name),
            element_count: 3,
            byte_size: (depth / 8) as usize,
            date_time: None,
            zero_azimuth_ray: None,
        }
    }

    #[test]
    fn copy_keeps_raw_values() {
        let raw = RawSamples::U32(vec![0, 17, 4_000_000_000]);
        let (values, info) = convert(info("timestamp", 32, UNDECLARED_RANGE, UNDECLARED_RANGE), &raw);
        assert_eq!(values, vec![0.0, 17.0, 4_000_000_000.0]);
        assert_eq!(info.no_data, Some(0.0));
        assert_eq!(info.data_min, UNDECLARED_RANGE);
    }

    #[test]
    fn angular_spans_full_circle() {
        let raw = RawSamples::U8(vec![0, 128, 255]);
        let (values, info) = convert(info("startangle", 8, UNDECLARED_RANGE, UNDECLARED_RANGE), &raw);
        assert_eq!(values[0], 0.0);
        assert!((values[1] - 180.705_882).abs() < 1e-5);
        assert!((values[2] - 360.0).abs() < 1e-9);
        assert_eq!(info.data_min, 0.0);
        assert_eq!(info.data_max, 360.0);
        assert!((info.data_step - 360.0 / 255.0).abs() < 1e-12);
        assert_eq!(info.no_data, Some(-info.data_step));
    }

    #[test]
    fn data_uses_declared_range() {
        let raw = RawSamples::U8(vec![0, 1, 255]);
        let (values, info) = convert(info("dBZ", 8, -31.5, 95.5), &raw);
        let step = 127.0 / 255.0;
        assert!((values[0] - (-31.5 - step)).abs() < 1e-9);
        assert!((values[1] - (-31.5)).abs() < 1e-9);
        assert!((values[2] - (95.5 - step)).abs() < 1e-9);
        assert_eq!(info.no_data, Some(-step + -31.5));
    }

    #[test]
    fn kdp_is_not_special_cased() {
        let raw = RawSamples::U16(vec![0, 65535]);
        let (values, info) = convert(info("KDP", 16, -5.0, 5.0), &raw);
        assert_eq!(info.data_min, -5.0);
        assert_eq!(info.data_max, 5.0);
        assert!((values[1] - (5.0 - info.data_step)).abs() < 1e-9);
    }
}
