//! レーダーごとのパルス幅と、二重PRFのレーダー定数

/// パルス幅の表に記録するパルス幅の数
pub const MAX_PULSE_WIDTHS: usize = 4;

/// レーダー（センサーID）ごとのパルス幅（マイクロ秒）
///
/// パルス幅のインデックスは、XMLヘッダの`pw_index`に記録されている。
const PULSE_WIDTHS: &[(&str, [f64; MAX_PULSE_WIDTHS])] = &[
    // CAX1（Albert Head、King Radar）
    ("XKR", [0.3, 1.0, 2.0, 3.3]),
    // CAX1（Whitehorse）
    ("XWH", [0.3, 1.0, 2.0, 3.3]),
    // CAX2（Exeter）
    ("XSO", [0.3, 1.0, 2.0, 3.3]),
    // CAX3
    ("X##", [0.3, 1.0, 2.0, 3.3]),
];

/// パルス幅（マイクロ秒）を返す。
///
/// # 引数
///
/// * `sensor_id` - センサーID
/// * `index` - パルス幅のインデックス
///
/// # 戻り値
///
/// パルス幅。表に記録されていないセンサーまたはインデックスの場合は`None`
pub fn pulse_width(sensor_id: &str, index: usize) -> Option<f64> {
    let widths = PULSE_WIDTHS
        .iter()
        .find(|(id, _)| *id == sensor_id)
        .map(|(_, widths)| widths);
    match widths {
        Some(widths) => widths.get(index).copied(),
        None => {
            log::warn!("no pulse width table for sensor `{sensor_id}`");
            None
        }
    }
}

/// 空白またはカンマで区切ったレーダー定数の並びから、パルス幅のインデックスに対応する値を返す。
pub fn radar_constant(list: &str, index: usize) -> Option<f64> {
    list.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .nth(index)
        .and_then(|token| token.parse().ok())
}
