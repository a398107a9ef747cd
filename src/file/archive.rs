//! Zip container reader for `.jar` / `.zip` class sources.
//!
//! Archives are opened with [`zip::ZipArchive`] over the memory-mapped image. Every `*.class`
//! member and the optional configuration fragment ([`crate::file::CONFIG_FRAGMENT_NAME`]) is
//! read into memory; decompression and CRC checks are left to the `zip` crate.
//!
//! Multi-release variants under `META-INF/` are ignored so a base class is never shadowed by a
//! version-specific copy.

use std::io::{Cursor, Read};

use crate::{
    file::{Memory, SourceContents, SourceEntry, CONFIG_FRAGMENT_NAME},
    Result,
};

/// Extracts all classfiles and the configuration fragment from an archive image.
///
/// Members are visited in central directory order.
///
/// # Arguments
/// * `data` - The complete archive bytes
///
/// # Errors
/// Returns [`crate::Error::Archive`] if the container is damaged or uses an unsupported
/// feature, and [`crate::Error::Malformed`] for a configuration fragment that is not UTF-8.
pub fn read_archive(data: &[u8]) -> Result<SourceContents> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::new();
    let mut config_fragment = None;

    for index in 0..archive.len() {
        let mut member = archive.by_index(index)?;
        if member.is_dir() {
            continue;
        }

        let name = member.name().to_string();
        let is_class = name.ends_with(".class") && !name.starts_with("META-INF/");
        let is_config = name == CONFIG_FRAGMENT_NAME;
        if !is_class && !is_config {
            continue;
        }

        let mut bytes = Vec::with_capacity(usize::try_from(member.size()).unwrap_or(0));
        member
            .read_to_end(&mut bytes)
            .map_err(|e| malformed_error!("Failed to read archive member {}: {}", name, e))?;

        if is_config {
            let text = String::from_utf8(bytes)
                .map_err(|_| malformed_error!("Configuration fragment {} is not UTF-8", name))?;
            config_fragment = Some(text);
        } else {
            entries.push(SourceEntry {
                name,
                backend: Box::new(Memory::new(bytes)),
            });
        }
    }

    log::debug!(
        "archive: {} classes{}",
        entries.len(),
        if config_fragment.is_some() {
            ", configuration fragment"
        } else {
            ""
        }
    );

    Ok(SourceContents {
        entries,
        config_fragment,
    })
}
