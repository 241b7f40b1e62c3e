//! 展開したBLOBから生の値を読み込む。
//!
//! 16ビットと32ビットの値は、ビッグ・エンディアンで記録されている。
use crate::errors::{Rb5ReaderError, Rb5ReaderResult};

/// 生の値の配列
///
/// ビット深度と格納する型が常に一致するように、深度ごとに型を分けて保持する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawSamples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl RawSamples {
    /// 要素数を返す。
    pub fn len(&self) -> usize {
        match self {
            RawSamples::U8(v) => v.len(),
            RawSamples::U16(v) => v.len(),
            RawSamples::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// ビット深度を返す。
    pub fn depth(&self) -> u32 {
        match self {
            RawSamples::U8(_) => 8,
            RawSamples::U16(_) => 16,
            RawSamples::U32(_) => 32,
        }
    }

    /// `index`番目の値を返す。
    pub fn get(&self, index: usize) -> Option<u32> {
        match self {
            RawSamples::U8(v) => v.get(index).map(|&x| u32::from(x)),
            RawSamples::U16(v) => v.get(index).map(|&x| u32::from(x)),
            RawSamples::U32(v) => v.get(index).copied(),
        }
    }

    /// 値を順に走査するイテレーターを返す。
    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            RawSamples::U8(v) => Box::new(v.iter().map(|&x| u32::from(x))),
            RawSamples::U16(v) => Box::new(v.iter().map(|&x| u32::from(x))),
            RawSamples::U32(v) => Box::new(v.iter().copied()),
        }
    }

    /// `u32`の配列に変換する。
    pub fn to_u32_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }
}

/// 展開したBLOBを、ビット深度に応じた生の値の配列に変換する。
///
/// # 引数
///
/// * `bytes` - 展開したBLOB
/// * `depth` - ビット深度（8、16、32）
///
/// # 戻り値
///
/// 生の値の配列
pub fn decode_samples(bytes: &[u8], depth: u32) -> Rb5ReaderResult<RawSamples> {
    let byte_size = byte_size_for_depth(depth)?;
    if bytes.len() % byte_size != 0 {
        return Err(Rb5ReaderError::DimensionMismatch {
            expected: bytes.len() / byte_size,
            actual_bytes: bytes.len(),
            byte_size,
        });
    }

    let samples = match depth {
        8 => RawSamples::U8(bytes.to_vec()),
        16 => RawSamples::U16(
            bytes
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect(),
        ),
        _ => RawSamples::U32(
            bytes
                .chunks_exact(4)
                .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
    };

    Ok(samples)
}

/// ビット深度から1要素のバイト数を返す。
pub fn byte_size_for_depth(depth: u32) -> Rb5ReaderResult<usize> {
    match depth {
        8 => Ok(1),
        16 => Ok(2),
        32 => Ok(4),
        _ => Err(Rb5ReaderError::UnsupportedDepth(depth)),
    }
}
