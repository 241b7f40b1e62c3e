//! チャンネル名を、外部の命名規則のチャンネル名に変換する。

/// ODIM形式のチャンネル名の表
const ODIM_NAMES: &[(&str, &str)] = &[
    ("dBuZ", "TH"),
    ("dBuZv", "TV"),
    ("dBZ", "DBZH"),
    ("V", "VRADH"),
    ("Vv", "VRADV"),
    ("W", "WRADH"),
    ("Wv", "WRADV"),
    ("SNR", "SNRH"),
    ("SQI", "SQIH"),
];

/// ODIM形式のチャンネル名を返す。
///
/// 表に記録されていないチャンネルは、チャンネル名を大文字にした名前を返す。
pub fn odim_name(name: &str) -> String {
    ODIM_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, odim)| odim.to_string())
        .unwrap_or_else(|| name.to_uppercase())
}

/// URPのチャンネルの記述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrpDescriptor {
    /// 種別コード
    pub type_code: i32,
    /// 短い名前
    pub name: &'static str,
    /// 単位
    pub unit: &'static str,
    /// 説明
    pub description: &'static str,
}

impl UrpDescriptor {
    /// URPに対応するチャンネルがないことを示す記述
    pub const NOT_AVAILABLE: UrpDescriptor = UrpDescriptor {
        type_code: -1,
        name: "n/a",
        unit: "n/a",
        description: "n/a",
    };

    const fn new(
        type_code: i32,
        name: &'static str,
        unit: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            type_code,
            name,
            unit,
            description,
        }
    }
}

/// URPのチャンネルの記述の表
const URP_DESCRIPTORS: &[(&str, UrpDescriptor)] = &[
    ("dBuZ", UrpDescriptor::new(1, "DBT", "dBZ", "Uncorrected Reflectivity")),
    ("dBZ", UrpDescriptor::new(2, "DBZ", "dBZ", "Reflectivity")),
    ("V", UrpDescriptor::new(3, "VEL", "m/s", "Velocity")),
    ("W", UrpDescriptor::new(4, "WID", "m/s", "Width")),
    ("SNR", UrpDescriptor::new(100, "SNR", "", "Signal to Noise")),
    ("SQI", UrpDescriptor::new(18, "SQI", "", "Signal Quality Index")),
    ("ZDR", UrpDescriptor::new(5, "ZDR", "dB", "Differential Reflectivity")),
    ("RhoHV", UrpDescriptor::new(19, "RHOHV", "", "Correlation Coefficient")),
    ("uPhiDP", UrpDescriptor::new(16, "UPHIDP", "deg", "Uncorrected Differential Phase")),
    ("PhiDP", UrpDescriptor::new(16, "PHIDP", "deg", "Differential Phase")),
    ("uKDP", UrpDescriptor::new(14, "UKDP", "deg/km", "Uncorrected Specific Differential Phase")),
    ("KDP", UrpDescriptor::new(14, "KDP", "deg/km", "Specific Differential Phase")),
];

/// URPのチャンネルの記述を返す。
///
/// 表に記録されていないチャンネルは`UrpDescriptor::NOT_AVAILABLE`を返す。
pub fn urp_descriptor(name: &str) -> UrpDescriptor {
    URP_DESCRIPTORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
        .unwrap_or(UrpDescriptor::NOT_AVAILABLE)
}
