//! BLOB領域の走査とBLOBの展開
//!
//! BLOB領域には、次の形式のレコードが連続して記録されている。
//!
//! ```text
//! <BLOB blobid="0" size="1234" compression="qt">\n
//! （sizeバイトの圧縮データ）
//! </BLOB>\n
//! ```
//!
//! 圧縮データの先頭4バイトは、展開後のバイト数をビッグ・エンディアンで記録している。
//! 残りのバイトはzlib形式の圧縮ストリームである。
use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::errors::{Rb5ReaderError, Rb5ReaderResult};

/// BLOBレコードの開始タグ
const BLOB_OPEN_TAG: &[u8] = b"<BLOB";

/// BLOBレコードの終了タグ
const BLOB_CLOSE_TAG: &[u8] = b"</BLOB>";

/// 展開後のバイト数を記録しているバイト数
const EXPECTED_SIZE_BYTES: usize = 4;

/// BLOBレコード
#[derive(Debug, Clone, Copy)]
pub struct BlobRecord<'a> {
    /// BLOB ID
    pub blob_id: u32,
    /// 圧縮データ
    pub payload: &'a [u8],
    /// BLOB領域の先頭からのレコードの開始位置
    pub offset: usize,
    /// 次のレコードの開始位置
    pub next_offset: usize,
}

/// BLOB領域を先頭からレコード単位で走査するイテレーター
///
/// BLOB領域を書き換えないため、同じ領域を何度でも走査できる。
pub struct BlobScanner<'a> {
    region: &'a [u8],
    offset: usize,
}

impl<'a> BlobScanner<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self { region, offset: 0 }
    }

    fn read_record(&self, start: usize) -> Rb5ReaderResult<BlobRecord<'a>> {
        let rest = &self.region[start..];
        if !rest.starts_with(BLOB_OPEN_TAG) {
            return Err(Rb5ReaderError::MalformedContainer(format!(
                "BLOB領域の{start}バイト目にBLOBの開始タグがありません。"
            )));
        }
        let line_len = rest.iter().position(|&b| b == b'\n').ok_or_else(|| {
            Rb5ReaderError::MalformedContainer(format!(
                "BLOB領域の{start}バイト目のBLOBヘッダが改行で終わっていません。"
            ))
        })?;
        let header = parse_blob_header(&rest[..line_len])?;

        let payload_start = start + line_len + 1;
        let payload_end = payload_start
            .checked_add(header.size)
            .filter(|&end| end <= self.region.len())
            .ok_or_else(|| {
                Rb5ReaderError::MalformedContainer(format!(
                    "BLOB ID`{}`の圧縮データ（{}バイト）がBLOB領域の終端を越えています。",
                    header.blob_id, header.size
                ))
            })?;

        let close_start = skip_whitespace(self.region, payload_end);
        if !self.region[close_start..].starts_with(BLOB_CLOSE_TAG) {
            return Err(Rb5ReaderError::MalformedContainer(format!(
                "BLOB ID`{}`の圧縮データの後にBLOBの終了タグがありません。",
                header.blob_id
            )));
        }
        let mut next_offset = close_start + BLOB_CLOSE_TAG.len();
        if self.region.get(next_offset) == Some(&b'\r') {
            next_offset += 1;
        }
        if self.region.get(next_offset) == Some(&b'\n') {
            next_offset += 1;
        }

        Ok(BlobRecord {
            blob_id: header.blob_id,
            payload: &self.region[payload_start..payload_end],
            offset: start,
            next_offset,
        })
    }
}

impl<'a> Iterator for BlobScanner<'a> {
    type Item = Rb5ReaderResult<BlobRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = skip_whitespace(self.region, self.offset);
        if start >= self.region.len() {
            self.offset = start;
            return None;
        }
        match self.read_record(start) {
            Ok(record) => {
                self.offset = record.next_offset;
                Some(Ok(record))
            }
            Err(e) => {
                // 壊れたレコード以降は走査しない
                self.offset = self.region.len();
                Some(Err(e))
            }
        }
    }
}

/// BLOBヘッダの属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlobHeader {
    blob_id: u32,
    size: usize,
}

/// BLOBヘッダの1行を解析する。
///
/// 開始タグだけを解析できればよいため、閉じられていないタグや未知の属性は許容する。
fn parse_blob_header(line: &[u8]) -> Rb5ReaderResult<BlobHeader> {
    let line = String::from_utf8_lossy(line);
    let attributes = tag_attributes(&line);
    let blob_id = header_attribute(&attributes, "blobid", &line)?;
    let blob_id = blob_id.trim().parse::<u32>().map_err(|_| {
        Rb5ReaderError::MalformedContainer(format!("BLOB ID`{blob_id}`が不正です。"))
    })?;
    let size = header_attribute(&attributes, "size", &line)?;
    let size = size.trim().parse::<usize>().map_err(|_| {
        Rb5ReaderError::MalformedContainer(format!("BLOBのサイズ`{size}`が不正です。"))
    })?;

    Ok(BlobHeader { blob_id, size })
}

fn header_attribute<'a>(
    attributes: &[(&'a str, &'a str)],
    name: &str,
    line: &str,
) -> Rb5ReaderResult<&'a str> {
    attributes
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| *v)
        .ok_or_else(|| {
            Rb5ReaderError::MalformedContainer(format!(
                "BLOBヘッダ`{}`に`{name}`属性がありません。",
                line.trim_end()
            ))
        })
}

/// タグに記録されている`名前="値"`の組を返す。
fn tag_attributes(tag: &str) -> Vec<(&str, &str)> {
    let mut attributes = Vec::new();
    let body = tag.trim_start().trim_start_matches('<');
    // タグ名を読み飛ばす
    let mut rest = match body.find(char::is_whitespace) {
        Some(i) => &body[i..],
        None => return attributes,
    };
    loop {
        rest = rest.trim_start();
        let Some(eq) = rest.find('=') else { break };
        let name = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            break;
        };
        let Some(close) = after[1..].find(quote) else { break };
        attributes.push((name, &after[1..1 + close]));
        rest = &after[close + 2..];
    }

    attributes
}

fn skip_whitespace(region: &[u8], mut offset: usize) -> usize {
    while region.get(offset).is_some_and(|b| b.is_ascii_whitespace()) {
        offset += 1;
    }
    offset
}

/// BLOB領域から指定されたBLOB IDのBLOBを探して展開する。
///
/// # 引数
///
/// * `region` - BLOB領域
/// * `blob_id` - 展開するBLOBのBLOB ID
///
/// # 戻り値
///
/// 展開したバイト列
pub fn fetch_blob(region: &[u8], blob_id: u32) -> Rb5ReaderResult<Vec<u8>> {
    for record in BlobScanner::new(region) {
        let record = record?;
        if record.blob_id == blob_id {
            log::debug!(
                "blob {} found at offset {} ({} compressed bytes)",
                blob_id,
                record.offset,
                record.payload.len()
            );
            return decompress_blob(record.payload);
        }
    }

    Err(Rb5ReaderError::BlobNotFound(blob_id))
}

/// BLOBの圧縮データを展開する。
///
/// 展開したバイト数が、圧縮データの先頭4バイトに記録されたバイト数と一致しない場合はエラーとする。
pub fn decompress_blob(payload: &[u8]) -> Rb5ReaderResult<Vec<u8>> {
    if payload.len() < EXPECTED_SIZE_BYTES {
        return Err(Rb5ReaderError::Decompression(format!(
            "圧縮データが{}バイトしかありません。",
            payload.len()
        )));
    }
    let (prefix, stream) = payload.split_at(EXPECTED_SIZE_BYTES);
    let mut size = [0u8; EXPECTED_SIZE_BYTES];
    size.copy_from_slice(prefix);
    let expected = u32::from_be_bytes(size) as usize;

    // 記録されたバイト数を1バイト超えた時点で展開を打ち切る
    let mut decompressed = Vec::new();
    ZlibDecoder::new(stream)
        .take(expected as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| Rb5ReaderError::Decompression(format!("{e}")))?;
    if decompressed.len() != expected {
        return Err(Rb5ReaderError::Decompression(format!(
            "展開後のバイト数が{}バイトでした。{expected}バイトを期待しました。",
            decompressed.len()
        )));
    }

    Ok(decompressed)
}
