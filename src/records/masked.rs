/// `masked.txt`: one slash-rooted path per line
use super::reader::{strip_cr, Lines};
use crate::config::types::RecordError;
use crate::kernel::scoped_dir::ScopedPath;
use std::io::BufRead;

/// Parse the whole mask list. Blank lines are skipped; any invalid path
/// rejects the file.
pub fn parse_masked<R: BufRead>(reader: R, max_line_len: usize) -> Result<Vec<ScopedPath>, RecordError> {
    let mut paths = Vec::new();
    for line in Lines::new(reader, max_line_len) {
        let (line, raw) = line?;
        let raw = strip_cr(&raw);
        if raw.is_empty() {
            continue;
        }
        let path = ScopedPath::parse_absolute(raw).map_err(|reason| RecordError::InvalidPath {
            line,
            path: String::from_utf8_lossy(raw).into_owned(),
            reason,
        })?;
        paths.push(path);
    }
    Ok(paths)
}
