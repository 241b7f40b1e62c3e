use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use time::macros::datetime;

use rainbow_rb5::params::ChannelKind;
use rainbow_rb5::readers::{Rb5Reader, Rb5ReaderConfig, ScanType};
use rainbow_rb5::Rb5ReaderError;

/// 展開後のバイト数と圧縮データからなるBLOBレコードを返す。
fn blob(blob_id: u32, data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    let mut payload = (data.len() as u32).to_be_bytes().to_vec();
    payload.extend(encoder.finish().unwrap());

    let mut bytes = format!(
        "<BLOB blobid=\"{blob_id}\" size=\"{}\" compression=\"qt\">\n",
        payload.len()
    )
    .into_bytes();
    bytes.extend(payload);
    bytes.extend_from_slice(b"\n</BLOB>\n");
    bytes
}

fn rb5(xml: &str, blobs: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut bytes = xml.as_bytes().to_vec();
    bytes.extend_from_slice(b"\n<!-- END XML -->\n");
    for (blob_id, data) in blobs {
        bytes.extend(blob(*blob_id, data));
    }
    bytes
}

fn u16_bytes(values: &[u16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

fn u32_bytes(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_be_bytes()).collect()
}

/// 生の値を角度に変換して、1/1000度に丸める。
fn angle(raw: u32, raw_max: f64) -> f64 {
    let value = f64::from(raw) * (360.0 / raw_max) + 0.0;
    (value * 1000.0).round() / 1000.0
}

/// 生の値を角度に変換し、負の角度に補正して、1/1000度に丸める。
fn negative_angle(raw: u32, raw_max: f64) -> f64 {
    let value = f64::from(raw) * (360.0 / raw_max) + 0.0 - 360.0;
    (value * 1000.0).round() / 1000.0
}

const VOLUME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<volume version="5.34.16" datetime="2016-09-07T15:10:24" type="vol" owner="">
  <sensorinfo type="rainbow" id="XSO" name="Exeter">
    <lon>-3.4</lon>
    <lat>50.7</lat>
    <alt>35.5</alt>
    <wavelen>0.05</wavelen>
    <beamwidth>1</beamwidth>
  </sensorinfo>
  <history pdfname="vol_test.pdf" ppdfname="vol_test.ppdf">
    <rawdatafiles>
      <file>2016090715102400.raw</file>
      <file>2016090715113000.raw</file>
    </rawdatafiles>
  </history>
  <scan name="Test.vol" time="15:10:24" date="2016-09-07">
    <pargroup refid="sdfbase">
      <numele>2</numele>
      <antspeed>12</antspeed>
    </pargroup>
    <slice refid="0">
      <posangle>0.5</posangle>
      <anglestep>1</anglestep>
      <antspeed>10</antspeed>
      <rangestep>0.25</rangestep>
      <pw_index>1</pw_index>
      <rspdphradconst>70.1 71.2 72.3 73.4</rspdphradconst>
      <dynv max="16.0"/>
      <dualprfmode>SdfDPrfMode211</dualprfmode>
      <slicedata datetimehighaccuracy="2016-09-07T15:10:24.500">
        <rayinfo refid="startangle" blobid="0" rays="4" depth="16"/>
        <rayinfo refid="timestamp" blobid="1" rays="4" depth="32"/>
        <rawdata type="dBZ" blobid="2" rays="4" bins="3" depth="8" min="-31.5" max="95.5"/>
      </slicedata>
    </slice>
    <slice refid="1">
      <posangle>1.5</posangle>
      <slicedata date="2016-09-07" time="15:11:30">
        <rayinfo refid="startangle" blobid="3" rays="4" depth="8"/>
        <rayinfo refid="startfixangle" blobid="4" rays="4" depth="8"/>
        <rawdata type="dBZ" blobid="5" rays="4" bins="2" depth="16" min="-31.5" max="95.5"/>
      </slicedata>
    </slice>
  </scan>
</volume>"#;

const SLICE1_START_ANGLES: [u16; 4] = [32768, 49152, 0, 16384];

fn volume_blobs() -> Vec<(u32, Vec<u8>)> {
    vec![
        (0, u16_bytes(&SLICE1_START_ANGLES)),
        (1, u32_bytes(&[100, 2000, 36000, 500])),
        (2, vec![10, 11, 12, 20, 21, 22, 0, 1, 2, 30, 31, 32]),
        (3, vec![128, 64, 192, 64]),
        (4, vec![1, 254, 1, 1]),
        (5, u16_bytes(&[100, 101, 200, 201, 300, 301, 400, 401])),
    ]
}

fn open_volume() -> Rb5Reader {
    let bytes = rb5(VOLUME, &volume_blobs());
    Rb5Reader::from_bytes(bytes, Some("dBZ"), Rb5ReaderConfig::default()).unwrap()
}

#[test]
fn reads_volume_header() {
    let reader = open_volume();
    let volume = reader.volume();
    assert_eq!(volume.version, "5.34.16");
    assert_eq!(volume.scan_type, ScanType::Volume);
    assert_eq!(volume.scan_name, "Test");
    assert_eq!(volume.date_time, datetime!(2016-09-07 15:10:24));
    assert_eq!(volume.data_type.as_deref(), Some("dBZ"));

    let sensor = reader.sensor();
    assert_eq!(sensor.id, "XSO");
    assert_eq!(sensor.name.as_deref(), Some("Exeter"));
    assert_eq!(sensor.latitude, 50.7);
    assert!((sensor.wavelength.unwrap() - 5.0).abs() < 1e-9);

    let history = reader.history().unwrap();
    assert_eq!(history.pdf_name.as_deref(), Some("vol_test.pdf"));
    assert_eq!(history.sdf_name, None);
    assert_eq!(history.raw_data_files.len(), 2);
    assert!(history.preprocessed_files.is_empty());

    assert_eq!(reader.slices().len(), 2);
}

#[test]
fn slice_angles_start_at_north() {
    let reader = open_volume();
    let slice = &reader.slices()[0];
    assert_eq!(slice.ray_count, 4);
    assert_eq!(slice.bin_count, 3);
    assert_eq!(slice.primary_channel, "dBZ");
    assert_eq!(slice.zero_azimuth_ray, Some(2));

    let expected: Vec<f64> = [0, 16384, 32768, 49152]
        .into_iter()
        .map(|raw| angle(raw, 65535.0))
        .collect();
    assert_eq!(slice.angles.moving_start, expected);
    assert_eq!(slice.angles.moving_start[0], 0.0);
    for (start, stop) in slice.angles.moving_start.iter().zip(&slice.angles.moving_stop) {
        assert_eq!(*stop, ((start + 1.0) * 1000.0).round() / 1000.0);
    }
    assert_eq!(slice.angles.fixed_start, vec![0.5; 4]);
    assert_eq!(slice.angles.fixed, vec![0.5; 4]);
    assert!((slice.angles.moving[1] - (expected[1] + 0.5)).abs() < 1e-9);
}

#[test]
fn first_minimum_is_the_pivot_and_fixed_angles_are_corrected() {
    let reader = open_volume();
    let slice = &reader.slices()[1];
    // 64が2回記録されているため、最初の射線を選択する。
    assert_eq!(slice.zero_azimuth_ray, Some(1));
    assert_eq!(slice.angles.moving_start[0], angle(64, 255.0));
    assert_eq!(slice.angles.moving_start[3], angle(128, 255.0));
    assert_eq!(slice.angles.fixed_start[0], negative_angle(254, 255.0));
    assert!(slice.angles.fixed_start[0] < 0.0);
    assert_eq!(slice.angles.fixed_stop, vec![1.5; 4]);
}

#[test]
fn slice_settings_fall_back_to_first_slice() {
    let reader = open_volume();
    let first = &reader.slices()[0];
    let second = &reader.slices()[1];
    assert_eq!(second.fixed_angle, 1.5);
    assert_eq!(second.angle_step, 1.0);
    assert_eq!(second.range_step, Some(0.25));
    assert_eq!(second.pulse_width_index, Some(1));
    assert_eq!(first.pulse_width, Some(1.0));
    assert_eq!(second.radar_constant_h, Some(71.2));
    assert_eq!(second.radar_constant_v, None);
    assert_eq!(first.nyquist_velocity, Some(16.0));
    assert_eq!(first.dual_prf_ratio(), Some("211"));
    assert_eq!(first.antenna_speed_rpm(), Some(10.0 / 360.0 * 60.0));
}

#[test]
fn slice_times() {
    let reader = open_volume();
    let first = &reader.slices()[0];
    assert_eq!(first.start_time, datetime!(2016-09-07 15:10:24.5));
    assert_eq!(first.duration, 36.0);
    assert_eq!(first.end_time, datetime!(2016-09-07 15:11:00.5));

    // timestampがないため、アンテナの回転速度から求める。
    let second = &reader.slices()[1];
    assert_eq!(second.start_time, datetime!(2016-09-07 15:11:30));
    assert_eq!(second.duration, 30.0);
    assert_eq!(second.end_time, datetime!(2016-09-07 15:12:00));
}

#[test]
fn channel_values_are_reordered() -> anyhow::Result<()> {
    let reader = open_volume();

    let dbz = reader.read_channel(0, "dBZ")?;
    assert_eq!(dbz.raw.to_u32_vec(), vec![0, 1, 2, 30, 31, 32, 10, 11, 12, 20, 21, 22]);
    assert_eq!(dbz.info.zero_azimuth_ray, Some(2));
    let step = 127.0 / 255.0;
    assert_eq!(dbz.values[1], -31.5);
    assert!((dbz.values[0] - (-31.5 - step)).abs() < 1e-9);
    assert_eq!(dbz.info.no_data, Some(dbz.values[0]));

    let wide = reader.read_channel(1, "dBZ")?;
    assert_eq!(
        wide.raw.to_u32_vec(),
        vec![200, 201, 300, 301, 400, 401, 100, 101]
    );

    let start = reader.read_channel(0, "startangle")?;
    assert_eq!(start.info.locator.kind, ChannelKind::RayInfo);
    assert_eq!(start.raw.to_u32_vec(), vec![0, 16384, 32768, 49152]);

    Ok(())
}

#[test]
fn missing_channel_is_reported() {
    let reader = open_volume();
    let err = reader.read_channel(1, "timestamp").unwrap_err();
    assert!(matches!(
        err,
        Rb5ReaderError::ChannelNotFound { slice: 1, ref channel } if channel == "timestamp"
    ));
    assert!(matches!(
        reader.read_channel(5, "dBZ"),
        Err(Rb5ReaderError::ChannelNotFound { slice: 5, .. })
    ));
}

#[test]
fn primary_channel_falls_back_to_default() {
    let bytes = rb5(VOLUME, &volume_blobs());
    let reader = Rb5Reader::from_bytes(bytes, Some("ZDR"), Rb5ReaderConfig::default()).unwrap();
    assert_eq!(reader.slices()[0].primary_channel, "dBZ");

    let bytes = rb5(VOLUME, &volume_blobs());
    let reader = Rb5Reader::from_bytes(bytes, Some("ALL"), Rb5ReaderConfig::default()).unwrap();
    assert_eq!(reader.slices()[1].bin_count, 2);
}

#[test]
fn pretty_print_lists_slices() {
    let reader = open_volume();
    let mut out = Vec::new();
    reader.pretty_print(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("version: 5.34.16"));
    assert!(text.contains("slices: 2"));
    assert!(text.contains("zero azimuth ray: 2"));
}

const ELEVATION: &str = r#"<volume version="5.34.16" datetime="2016-09-07T15:10:24" type="ele">
  <sensorinfo id="XKR"><lon>-123.5</lon><lat>48.4</lat><alt>300</alt></sensorinfo>
  <scan name="Test.ele">
    <slice refid="0">
      <posangle>45</posangle>
      <anglestep>0.5</anglestep>
      <antspeed>6</antspeed>
      <slicedata datetimehighaccuracy="2016-09-07T15:10:24">
        <rayinfo refid="startangle" blobid="0" rays="3" depth="16"/>
        <rawdata type="dBZ" blobid="1" rays="3" bins="1" depth="8" min="-31.5" max="95.5"/>
      </slicedata>
    </slice>
  </scan>
</volume>"#;

#[test]
fn elevation_scans_keep_ray_order() {
    let bytes = rb5(
        ELEVATION,
        &[(0, u16_bytes(&[63715, 0, 5000])), (1, vec![3, 2, 1])],
    );
    let reader = Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()).unwrap();
    assert_eq!(reader.scan_type(), ScanType::Elevation);
    assert_eq!(reader.volume().scan_name, "Test");

    let slice = &reader.slices()[0];
    assert_eq!(slice.zero_azimuth_ray, None);
    assert_eq!(slice.angles.moving_start[0], negative_angle(63715, 65535.0));
    assert!((slice.angles.moving_start[0] - (-10.0)).abs() < 0.01);
    assert_eq!(slice.angles.moving_start[1], 0.0);
    assert_eq!(slice.angles.fixed, vec![45.0; 3]);
    assert_eq!(slice.duration, 60.0);
    assert_eq!(slice.pulse_width, None);

    let dbz = reader.read_channel(0, "dBZ").unwrap();
    assert_eq!(dbz.raw.to_u32_vec(), vec![3, 2, 1]);
}

const LARGE: &str = r#"<volume version="5.34.16" datetime="2016-09-07T15:10:24" type="azi">
  <sensorinfo id="XSO"><lon>0</lon><lat>0</lat><alt>0</alt></sensorinfo>
  <scan name="Test.azi">
    <slice refid="0">
      <posangle>0.5</posangle>
      <anglestep>1</anglestep>
      <antspeed>24</antspeed>
      <slicedata datetimehighaccuracy="2016-09-07T15:10:24">
        <rayinfo refid="startangle" blobid="0" rays="360" depth="16"/>
        <rawdata type="dBZ" blobid="1" rays="360" bins="100" depth="8" min="-31.5" max="95.5"/>
        <rawdata type="V" blobid="99" rays="360" bins="100" depth="8" min="-16" max="16"/>
      </slicedata>
    </slice>
  </scan>
</volume>"#;

fn large_start_angles() -> Vec<u8> {
    let angles: Vec<u16> = (0..360u16).map(|i| ((i + 90) % 360) * 182).collect();
    u16_bytes(&angles)
}

#[test]
fn short_blob_is_a_dimension_mismatch() {
    let bytes = rb5(LARGE, &[(0, large_start_angles()), (1, vec![7u8; 35_999])]);
    let reader = Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()).unwrap();
    assert_eq!(reader.slices()[0].zero_azimuth_ray, Some(270));
    assert_eq!(reader.slices()[0].duration, 15.0);

    match reader.read_channel(0, "dBZ").unwrap_err() {
        Rb5ReaderError::Channel {
            slice,
            channel,
            locator,
            source,
        } => {
            assert_eq!(slice, 0);
            assert_eq!(channel, "dBZ");
            assert_eq!(locator, "/volume/scan/slice[1]/slicedata/rawdata[1]");
            assert!(matches!(
                *source,
                Rb5ReaderError::DimensionMismatch {
                    expected: 36_000,
                    actual_bytes: 35_999,
                    byte_size: 1
                }
            ));
        }
        e => panic!("unexpected error {e:?}"),
    }
}

#[test]
fn channel_with_fewer_rays_than_slice_is_rejected() {
    let xml = VOLUME.replace(
        r#"<rawdata type="dBZ" blobid="2" rays="4" bins="3" depth="8" min="-31.5" max="95.5"/>"#,
        r#"<rawdata type="dBZ" blobid="2" rays="4" bins="3" depth="8" min="-31.5" max="95.5"/>
        <rawdata type="V" blobid="6" rays="2" bins="2" depth="8" min="-8" max="8"/>"#,
    );
    let mut blobs = volume_blobs();
    blobs.push((6, vec![1, 2, 3, 4]));
    let reader = Rb5Reader::from_bytes(rb5(&xml, &blobs), None, Rb5ReaderConfig::default())
        .unwrap();
    assert_eq!(reader.slices()[0].zero_azimuth_ray, Some(2));

    match reader.read_channel(0, "V").unwrap_err() {
        Rb5ReaderError::Channel {
            channel, source, ..
        } => {
            assert_eq!(channel, "V");
            assert!(matches!(
                *source,
                Rb5ReaderError::DimensionMismatch {
                    expected: 8,
                    actual_bytes: 4,
                    byte_size: 1
                }
            ));
        }
        e => panic!("unexpected error {e:?}"),
    }
    assert_eq!(reader.read_channel(0, "dBZ").unwrap().raw.len(), 12);
}

#[test]
fn missing_blob_is_reported_with_channel() {
    let bytes = rb5(LARGE, &[(0, large_start_angles()), (1, vec![7u8; 36_000])]);
    let reader = Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()).unwrap();
    assert_eq!(reader.read_channel(0, "dBZ").unwrap().values.len(), 36_000);

    match reader.read_channel(0, "V").unwrap_err() {
        Rb5ReaderError::Channel { source, .. } => {
            assert!(matches!(*source, Rb5ReaderError::BlobNotFound(99)))
        }
        e => panic!("unexpected error {e:?}"),
    }
}

#[test]
fn old_versions_are_rejected() {
    let xml = VOLUME.replace("5.34.16", "5.1.9");
    let bytes = rb5(&xml, &volume_blobs());
    let err = Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        Rb5ReaderError::VersionIncompatible { ref version, .. } if version == "5.1.9"
    ));
}

#[test]
fn unexpected_documents_are_rejected() {
    let bytes = rb5(r#"<product version="5.34.16"/>"#, &[]);
    assert!(matches!(
        Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()),
        Err(Rb5ReaderError::UnexpectedRootTag(tag)) if tag == "product"
    ));

    let xml = VOLUME.replace("type=\"vol\"", "type=\"sec\"");
    let bytes = rb5(&xml, &volume_blobs());
    assert!(matches!(
        Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()),
        Err(Rb5ReaderError::UnexpectedScanType(_))
    ));

    let bytes = VOLUME.as_bytes().to_vec();
    assert!(matches!(
        Rb5Reader::from_bytes(bytes, None, Rb5ReaderConfig::default()),
        Err(Rb5ReaderError::MalformedContainer(_))
    ));
}

#[test]
fn opens_file_and_takes_data_type_from_name() -> anyhow::Result<()> {
    let dir = std::env::temp_dir().join(format!("rainbow-rb5-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("2016090715102400dBZ.vol");
    std::fs::write(&path, rb5(VOLUME, &volume_blobs()))?;

    let reader = Rb5Reader::new(&path)?;
    assert_eq!(reader.path(), Some(path.as_path()));
    assert_eq!(reader.volume().data_type.as_deref(), Some("dBZ"));
    assert_eq!(reader.slices().len(), 2);

    std::fs::remove_dir_all(&dir)?;
    assert!(matches!(
        Rb5Reader::new(&path),
        Err(Rb5ReaderError::Io(_))
    ));

    Ok(())
}
