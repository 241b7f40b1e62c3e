/// Rb5Readerエラー型
#[derive(Debug, Clone, thiserror::Error)]
pub enum Rb5ReaderError {
    /// ファイル・オープン・エラー
    #[error("ファイルを開くときにエラーが発生しました。{0}")]
    Io(String),

    /// XMLヘッダとBLOB領域の境界が見つからない、またはBLOBレコードが壊れている
    #[error("RB5ファイルの構造が不正です。{0}")]
    MalformedContainer(String),

    /// XMLヘッダの解析エラー
    #[error("XMLヘッダを解析できませんでした。{0}")]
    DocumentParse(String),

    /// XMLヘッダに要素または属性が記録されていない
    #[error("XMLヘッダに`{0}`が記録されていません。")]
    AttributeNotFound(String),

    /// XMLヘッダに記録されている値を数値に変換できない
    #[error("XMLヘッダの`{path}`に記録されている値`{value}`が不正です。")]
    InvalidValue { path: String, value: String },

    /// サポートしていないバージョン
    #[error("サポートしていないバージョンです。`{version}`（`{minimum}`以上が必要です）")]
    VersionIncompatible { version: String, minimum: String },

    /// 最上位の要素が`volume`ではない
    #[error("RB5ファイルではありません。最上位の要素が`<{0}>`です。")]
    UnexpectedRootTag(String),

    /// サポートしていないスキャン種別
    #[error("サポートしていないスキャン種別です。`{0}`")]
    UnexpectedScanType(String),

    /// 指定されたBLOB IDのBLOBが記録されていない
    #[error("BLOB IDが`{0}`のBLOBは記録されていません。")]
    BlobNotFound(u32),

    /// BLOBの展開エラー
    #[error("BLOBを展開できませんでした。{0}")]
    Decompression(String),

    /// サポートしていないビット深度
    #[error("サポートしていないビット深度です。`{0}`")]
    UnsupportedDepth(u32),

    /// 展開したデータの要素数がXMLヘッダに記録されている要素数と一致しない
    #[error(
        "データの要素数が一致しません。期待した要素数は{expected}ですが、展開したデータは{actual_bytes}バイト（1要素{byte_size}バイト）でした。"
    )]
    DimensionMismatch {
        expected: usize,
        actual_bytes: usize,
        byte_size: usize,
    },

    /// 真北に最も近い射線のインデックスが射線数の範囲外
    #[error("射線{ray}を先頭にできません。射線数は{ray_count}です。")]
    RayOutOfRange { ray: usize, ray_count: usize },

    /// 指定されたチャンネルがスライスに記録されていない
    #[error("スライス{slice}にチャンネル`{channel}`は記録されていません。")]
    ChannelNotFound { slice: usize, channel: String },

    /// チャンネルの読み込みエラー
    #[error("スライス{slice}のチャンネル`{channel}`（{locator}）の読み込みに失敗しました。{source}")]
    Channel {
        slice: usize,
        channel: String,
        locator: String,
        source: Box<Rb5ReaderError>,
    },
}

/// Rb5Reader結果型
pub type Rb5ReaderResult<T> = Result<T, Rb5ReaderError>;
