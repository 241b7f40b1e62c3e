use std::fs::OpenOptions;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::errors::{Rb5ReaderError, Rb5ReaderResult};

/// XMLヘッダの終端を示すマーカー
pub const END_XML_MARKER: &[u8] = b"<!-- END XML -->";

/// RB5ファイル全体のバイト列
///
/// XMLヘッダとBLOB領域は、同じバッファを参照するスライスとして返す。
#[derive(Debug, Clone)]
pub struct RawFile {
    /// ファイル全体のバイト列
    buffer: Vec<u8>,
    /// BLOB領域の開始位置
    blob_offset: usize,
}

impl RawFile {
    /// RB5ファイルを読み込む。
    ///
    /// # 引数
    ///
    /// * `path` - 読み込むRB5ファイルのパス
    ///
    /// # 戻り値
    ///
    /// `RawFile`
    pub fn read<P>(path: P) -> Rb5ReaderResult<Self>
    where
        P: AsRef<Path>,
    {
        let file = OpenOptions::new()
            .read(true)
            .open(path.as_ref())
            .map_err(|e| Rb5ReaderError::Io(format!("{e}")))?;
        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).map_err(|e| {
            Rb5ReaderError::Io(format!(
                "`{}`の読み込みに失敗しました。{e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_bytes(buffer)
    }

    /// メモリ上のバイト列から`RawFile`を構築する。
    pub fn from_bytes(buffer: Vec<u8>) -> Rb5ReaderResult<Self> {
        let blob_offset = split_container(&buffer)?;
        log::debug!(
            "header: {} bytes, blob region: {} bytes",
            blob_offset,
            buffer.len() - blob_offset
        );

        Ok(Self {
            buffer,
            blob_offset,
        })
    }

    /// ファイル全体のバイト列を返す。
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// XMLヘッダ（終端マーカーと直後の改行を含む）を返す。
    pub fn header_bytes(&self) -> &[u8] {
        &self.buffer[..self.blob_offset]
    }

    /// BLOB領域を返す。
    pub fn blob_region(&self) -> &[u8] {
        &self.buffer[self.blob_offset..]
    }
}

/// XMLヘッダとBLOB領域の境界を返す。
///
/// 境界は終端マーカーの直後の改行1文字の次の位置である。
/// 改行が`\r\n`の場合は2バイトを改行とみなす。
pub fn split_container(buffer: &[u8]) -> Rb5ReaderResult<usize> {
    let position = buffer
        .windows(END_XML_MARKER.len())
        .position(|w| w == END_XML_MARKER)
        .ok_or_else(|| {
            Rb5ReaderError::MalformedContainer(
                "XMLヘッダの終端マーカー`<!-- END XML -->`が見つかりません。".into(),
            )
        })?;
    if position == 0 {
        return Err(Rb5ReaderError::MalformedContainer(
            "終端マーカーの前にXMLヘッダが記録されていません。".into(),
        ));
    }
    let mut offset = position + END_XML_MARKER.len();
    match &buffer[offset..] {
        [b'\r', b'\n', ..] => offset += 2,
        [b'\n', ..] => offset += 1,
        _ => {}
    }

    Ok(offset)
}
