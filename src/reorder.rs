//! 真北に最も近い射線が先頭になるように、射線の並び順を変更する。
use crate::decoders::RawSamples;
use crate::errors::{Rb5ReaderError, Rb5ReaderResult};
use crate::readers::ScanType;

/// 真北に最も近い射線のインデックスを返す。
///
/// 射線の開始角度が最も小さい射線を選択する。同じ最小値の射線が複数ある場合は、
/// 最初の射線を選択する。
/// RHI（`ele`）は並べ替えないため、`None`を返す。
pub fn zero_azimuth_ray(scan_type: ScanType, moving_start_angles: &[f64]) -> Option<usize> {
    if scan_type == ScanType::Elevation {
        log::debug!("zero azimuth reordering is not applied to elevation scans");
        return None;
    }
    if moving_start_angles.is_empty() {
        return None;
    }
    let mut pivot = 0;
    for (i, angle) in moving_start_angles.iter().enumerate() {
        if *angle < moving_start_angles[pivot] {
            pivot = i;
        }
    }
    log::debug!("zero azimuth ray: {pivot}");

    Some(pivot)
}

/// 射線を`ray`本分だけ左に回転する。
///
/// 1射線は`block`個の連続した要素で構成される。
/// `ray`が`None`または0の場合は何もしない。
/// `ray`が射線数の範囲外の場合はエラーを返す。
pub fn rotate_rays<T>(
    values: &mut [T],
    ray: Option<usize>,
    block: usize,
) -> Rb5ReaderResult<()> {
    let Some(ray) = ray else { return Ok(()) };
    let ray_count = if block == 0 { 0 } else { values.len() / block };
    if ray >= ray_count {
        return Err(Rb5ReaderError::RayOutOfRange { ray, ray_count });
    }
    values.rotate_left(ray * block);

    Ok(())
}

impl RawSamples {
    /// 生の値の射線を`ray`本分だけ左に回転する。
    ///
    /// 1射線は`bins`個の連続した要素で構成される（`rayinfo`は1）。
    pub fn rotate_rays(&mut self, ray: Option<usize>, bins: usize) -> Rb5ReaderResult<()> {
        match self {
            RawSamples::U8(v) => rotate_rays(v, ray, bins),
            RawSamples::U16(v) => rotate_rays(v, ray, bins),
            RawSamples::U32(v) => rotate_rays(v, ray, bins),
        }
    }
}
