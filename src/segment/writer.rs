//! Segment Writer
//!
//! Streams sorted entries into a new index/data file pair.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::entry::Entry;
use crate::error::Result;
use crate::StrataError;

use super::TOMBSTONE_LEN;

/// Write a new segment from an ordered entry stream.
///
/// Opens both files create-new (fails with `AlreadyExists` if either
/// survived a crash; callers pre-delete temporaries). Entries must arrive
/// in strictly ascending key order with unique keys. Every data-file
/// offset is written before the trailing count, so the index is complete
/// the moment the count lands. When `sync` is set, both files are fsynced
/// before returning.
///
/// Returns the number of entries written.
pub fn write_segment<I>(index_path: &Path, data_path: &Path, entries: I, sync: bool) -> Result<u32>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let mut data_writer = BufWriter::new(create_new(data_path)?);
    let mut index_writer = BufWriter::new(create_new(index_path)?);

    let mut bytes_written: u64 = 0;
    let mut entry_count: u32 = 0;

    for entry in entries {
        let entry = entry?;

        let offset = u32::try_from(bytes_written).map_err(|_| {
            StrataError::Storage(format!(
                "segment data file exceeds the 4 GiB offset space at {} bytes",
                bytes_written
            ))
        })?;
        index_writer.write_all(&offset.to_be_bytes())?;

        data_writer.write_all(&(entry.key.len() as i32).to_be_bytes())?;
        data_writer.write_all(&entry.key)?;
        match &entry.value {
            Some(value) => {
                data_writer.write_all(&(value.len() as i32).to_be_bytes())?;
                data_writer.write_all(value)?;
            }
            None => data_writer.write_all(&TOMBSTONE_LEN.to_be_bytes())?,
        }

        bytes_written += entry.encoded_len() as u64;
        entry_count += 1;
    }

    index_writer.write_all(&entry_count.to_be_bytes())?;

    data_writer.flush()?;
    index_writer.flush()?;
    if sync {
        data_writer.get_ref().sync_all()?;
        index_writer.get_ref().sync_all()?;
    }

    Ok(entry_count)
}

fn create_new(path: &Path) -> Result<std::fs::File> {
    Ok(OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?)
}
