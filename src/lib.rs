//! Rainbow 5のRB5ファイルを読み込むライブラリ
//!
//! RB5ファイルは、XMLヘッダと、zlibで圧縮したBLOBを並べたBLOB領域で構成されている。
//! XMLヘッダとBLOB領域の境界には`<!-- END XML -->`が記録されている。
//!
//! ```no_run
//! use rainbow_rb5::readers::Rb5Reader;
//!
//! let reader = Rb5Reader::new("2016090715102400dBZ.vol")?;
//! for slice in reader.slices() {
//!     let dbz = reader.read_channel(slice.index, "dBZ")?;
//!     println!("{}: {} values", slice.index, dbz.values.len());
//! }
//! # Ok::<(), rainbow_rb5::errors::Rb5ReaderError>(())
//! ```
pub mod blobs;
pub mod containers;
pub mod converters;
pub mod decoders;
pub mod errors;
pub mod names;
pub mod params;
pub mod query;
pub mod readers;
pub mod reorder;
pub mod sensors;
pub mod slices;
pub mod times;

pub use errors::{Rb5ReaderError, Rb5ReaderResult};
pub use readers::{Rb5Reader, Rb5ReaderConfig};
