use std::borrow::BorrowMut;

use rainbow_rb5::names::{odim_name, urp_descriptor};
use rainbow_rb5::readers::Rb5Reader;
use rainbow_rb5::times::to_compact_date_time;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: rb5_probe <rb5 file>"))?;
    let reader = Rb5Reader::new(&path)?;

    reader.pretty_print(std::io::stdout().borrow_mut())?;

    for slice in reader.slices() {
        println!(
            "slice {} ({} - {})",
            slice.index,
            to_compact_date_time(slice.start_time),
            to_compact_date_time(slice.end_time)
        );
        for name in slice.raw_data_names.iter().chain(&slice.ray_info_names) {
            let channel = match reader.read_channel(slice.index, name) {
                Ok(channel) => channel,
                Err(e) => {
                    log::warn!("{e}");
                    continue;
                }
            };
            let no_data = channel.info.no_data.unwrap_or(f64::NAN);
            let valid = channel
                .values
                .iter()
                .copied()
                .filter(|v| *v != no_data)
                .collect::<Vec<_>>();
            let min = valid.iter().copied().fold(f64::INFINITY, f64::min);
            let max = valid.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let urp = urp_descriptor(name);
            println!(
                "    {:<14} {:<8} {:>4} x {:<4} depth={:<2} valid={:<7} min={:.3} max={:.3} [{}]",
                name,
                odim_name(name),
                channel.info.ray_count,
                channel.info.bin_count,
                channel.info.depth,
                valid.len(),
                min,
                max,
                urp.unit
            );
        }
    }

    Ok(())
}
