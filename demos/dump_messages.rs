//! Dumps the subject and attachment list of every message in an .olm file.
//!
//! Not part of the published crate surface; a runnable illustration of the
//! public API, analogous to the teacher crate's own unzip demo.

use anyhow::{Context, Result};
use log::info;

use olm_archive::{OlmArchive, OlmOptions};

fn main() -> Result<()> {
    env_logger::init();

    let olm_path = std::env::args()
        .nth(1)
        .context("usage: dump_messages <path-to.olm>")?;

    info!("opening {olm_path}");
    let mut archive =
        OlmArchive::open(&olm_path, OlmOptions::empty()).context("couldn't open OLM archive")?;

    println!("{} messages", archive.message_count());
    for index in 0..archive.message_count() {
        let message = archive.get_message_at(index)?;
        println!("[{index}] from {}: {}", message.from, message.subject);
        for attachment in &message.attachments {
            println!("    attachment: {} ({})", attachment.filename, attachment.content_type);
        }
    }

    Ok(())
}
