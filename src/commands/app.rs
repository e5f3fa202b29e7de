//! `uwfflash app` - upload a smartBASIC application over AT commands

use std::path::Path;

use indicatif::ProgressBar;
use uwfflash_core::app::{app_name, AppConfig, AppLoader, UploadProgress};
use uwfflash_serial::SerialTransport;

use super::{byte_bar_style, read_binary_file};

struct UploadBar {
    bar: Option<ProgressBar>,
}

impl UploadProgress for UploadBar {
    fn chunk_written(&mut self, sent: usize, total: usize) {
        let bar = self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(byte_bar_style());
            pb
        });
        bar.set_position(sent as u64);
        if sent == total {
            bar.finish();
        }
    }
}

pub fn run(
    port: &str,
    baud: u32,
    image: &Path,
    start: bool,
    no_reset: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_binary_file(image)?;
    let name = image
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or("image path has no usable file name")?;

    let transport =
        SerialTransport::open(port, baud).map_err(uwfflash_core::Error::from)?;
    let mut loader = AppLoader::new(transport, AppConfig::default());

    if !no_reset {
        loader.reset_into_command_mode()?;
    }

    loader.upload(name, &data, &mut UploadBar { bar: None })?;
    println!("Stored {} ({} bytes)", app_name(name), data.len());

    if start {
        loader.run_app(name)?;
        println!("Started {}", app_name(name));
    }
    Ok(())
}
