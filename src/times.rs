//! RB5ファイルに記録されている日時の変換
//!
//! 日時は`YYYY-MM-DD hh:mm:ss[.fff]`形式の文字列で扱う。
//! XMLヘッダには日付と時刻の区切りに`T`を使用した日時が記録されているが、空白に置き換えて扱う。
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};

use crate::errors::{Rb5ReaderError, Rb5ReaderResult};

/// 日時の書式（小数点以下の秒を除く）
const DATE_TIME_FMT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// 日時を解析する書式（小数点以下の秒は省略できる）
const PARSE_DATE_TIME_FMT: &[FormatItem<'_>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

/// 年月日時分秒を連結した書式
const COMPACT_DATE_TIME_FMT: &[FormatItem<'_>] =
    format_description!("[year][month][day][hour][minute][second]");

/// 年月日を連結した書式
const COMPACT_DATE_FMT: &[FormatItem<'_>] = format_description!("[year][month][day]");

/// 時分秒を連結した書式
const COMPACT_TIME_FMT: &[FormatItem<'_>] = format_description!("[hour][minute][second]");

/// 年月日時分を連結した書式
const VALID_TIME_FMT: &[FormatItem<'_>] =
    format_description!("[year][month][day][hour][minute]");

/// 日付と時刻の区切りを空白に置き換える。
pub fn blank_separator(value: &str) -> String {
    match value.char_indices().nth(10) {
        Some((i, 'T')) => format!("{} {}", &value[..i], &value[i + 1..]),
        _ => value.to_string(),
    }
}

/// 日時を示す文字列を`PrimitiveDateTime`に変換する。
///
/// 小数点以下の秒は、ナノ秒の精度まで保持する。
pub fn parse_iso8601(value: &str) -> Rb5ReaderResult<PrimitiveDateTime> {
    let value = blank_separator(value.trim());

    PrimitiveDateTime::parse(&value, PARSE_DATE_TIME_FMT).map_err(|_| {
        Rb5ReaderError::InvalidValue {
            path: "datetime".into(),
            value,
        }
    })
}

/// `PrimitiveDateTime`を日時を示す文字列に変換する。
///
/// ミリ秒が0でない場合に限り、`.nnn`を付与する。
pub fn format_iso8601(dt: PrimitiveDateTime) -> String {
    let mut formatted = format(dt, DATE_TIME_FMT);
    let milli = dt.millisecond();
    if milli != 0 {
        formatted.push_str(&format!(".{milli:03}"));
    }
    formatted
}

/// 日時に秒数を加算する。
pub fn add_seconds(dt: PrimitiveDateTime, seconds: f64) -> Rb5ReaderResult<PrimitiveDateTime> {
    let invalid = || Rb5ReaderError::InvalidValue {
        path: "elapsed seconds".into(),
        value: format!("{seconds}"),
    };
    if !seconds.is_finite() {
        return Err(invalid());
    }
    dt.checked_add(Duration::seconds_f64(seconds))
        .ok_or_else(invalid)
}

/// 日時を示す文字列に秒数を加算した日時を、同じ形式の文字列で返す。
pub fn add_seconds_to_iso8601(value: &str, seconds: f64) -> Rb5ReaderResult<String> {
    Ok(format_iso8601(add_seconds(parse_iso8601(value)?, seconds)?))
}

/// `YYYYMMDDhhmmss`形式の文字列を返す。
pub fn to_compact_date_time(dt: PrimitiveDateTime) -> String {
    format(dt, COMPACT_DATE_TIME_FMT)
}

/// `YYYYMMDD`形式の文字列を返す。
pub fn to_compact_date(dt: PrimitiveDateTime) -> String {
    format(dt, COMPACT_DATE_FMT)
}

/// `hhmmss`形式の文字列を返す。
pub fn to_compact_time(dt: PrimitiveDateTime) -> String {
    format(dt, COMPACT_TIME_FMT)
}

/// 日時の丸め方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// 切り捨て
    Floor,
    /// 四捨五入
    Nearest,
}

/// 日時を`minutes`分間隔の格子に丸めて、`YYYYMMDDhhmm`形式の文字列で返す。
///
/// 小数点以下の秒は切り捨てる。
pub fn to_valid_time(dt: PrimitiveDateTime, minutes: u32, rounding: Rounding) -> String {
    let interval = i64::from(minutes.max(1)) * 60;
    let seconds = dt.assume_utc().unix_timestamp();
    let rounded = match rounding {
        Rounding::Floor => seconds - seconds.rem_euclid(interval),
        Rounding::Nearest => (seconds + interval / 2).div_euclid(interval) * interval,
    };
    match OffsetDateTime::from_unix_timestamp(rounded) {
        Ok(odt) => format(PrimitiveDateTime::new(odt.date(), odt.time()), VALID_TIME_FMT),
        Err(_) => format(dt, VALID_TIME_FMT),
    }
}

fn format(dt: PrimitiveDateTime, fmt: &[FormatItem<'_>]) -> String {
    // 書式は日付と時刻の要素だけで構成している
    dt.format(fmt).unwrap_or_default()
}
