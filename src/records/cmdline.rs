/// `cmdline` record parsing into the workload argument vector
use super::reader::NulRecords;
use crate::config::types::{RecordError, RecordLimits};
use std::ffi::CString;
use std::io::BufRead;

/// Parse NUL-terminated arguments. Argument 0 is the program to execute.
///
/// Fails with [`RecordError::Empty`] when the file holds no complete record
/// and with [`RecordError::TooMany`] past `limits.max_args`.
pub fn parse_cmdline<R: BufRead>(reader: R, limits: &RecordLimits) -> Result<Vec<CString>, RecordError> {
    let mut args = Vec::new();
    for record in NulRecords::new(reader, limits.max_record_len) {
        let record = record?;
        if args.len() == limits.max_args {
            return Err(RecordError::TooMany {
                limit: limits.max_args,
            });
        }
        // NulRecords splits on NUL, so records never contain one
        let arg = CString::new(record).map_err(|e| {
            RecordError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        args.push(arg);
    }

    if args.is_empty() {
        return Err(RecordError::Empty);
    }
    Ok(args)
}
