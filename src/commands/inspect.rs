//! `uwfflash inspect` - print an image's records without a device

use std::path::Path;

use uwfflash_core::uwf::{RecordKind, UwfContainer};

use super::read_binary_file;

pub fn run(image: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_binary_file(image)?;
    let container = UwfContainer::parse(&data).map_err(uwfflash_core::Error::from)?;

    println!("UWF container version {}", container.version);
    println!("{} records, {} data bytes", container.records.len(), container.data_len());
    println!();
    println!("{:>5}  {:<10}  {:>10}  {:>7}", "#", "kind", "address", "bytes");

    for (index, record) in container.records.iter().enumerate() {
        println!(
            "{:>5}  {:<10}  0x{:08X}  {:>7}",
            index,
            record.kind,
            record.address,
            record.payload.len()
        );
        if record.kind == RecordKind::Register && record.payload.len() == 11 {
            let base = u32::from_le_bytes(record.payload[1..5].try_into()?);
            let size = u32::from_le_bytes(record.payload[6..10].try_into()?);
            println!(
                "{:>5}  {:<10}  handle {} base 0x{:08X} size 0x{:X}",
                "", "", record.payload[0], base, size
            );
        }
    }
    Ok(())
}
