/// Bounded streaming readers for runtime directory record files
///
/// Two framings are used by the runtime directory protocol:
/// - NUL-terminated records (`environ`, `cmdline`), like `/proc/<pid>/environ`
/// - newline-terminated lines (`masked.txt`, `devices.txt`)
///
/// Both readers never buffer more than their configured bound per record.
use crate::config::types::RecordError;
use std::io::{BufRead, Read};

/// Iterator over NUL-terminated records.
///
/// A well-formed file ends exactly on a record boundary. Bytes after the
/// last NUL are reported as [`RecordError::TrailingBytes`] and a record that
/// does not fit into `max_len` bytes (terminator included) as
/// [`RecordError::TooLong`]. The iterator stops after the first error.
pub struct NulRecords<R> {
    reader: R,
    max_len: usize,
    index: usize,
    done: bool,
}

impl<R: BufRead> NulRecords<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            max_len,
            index: 0,
            done: false,
        }
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(self.max_len as u64)
            .read_until(b'\0', &mut buf)?;

        if read == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\0') {
            buf.pop();
            self.index += 1;
            return Ok(Some(buf));
        }
        if read >= self.max_len {
            return Err(RecordError::TooLong {
                index: self.index,
                limit: self.max_len,
            });
        }
        Err(RecordError::TrailingBytes { len: read })
    }
}

impl<R: BufRead> Iterator for NulRecords<R> {
    type Item = Result<Vec<u8>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_record().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

/// Drop a trailing `\r` so CRLF-terminated files parse like LF ones
pub fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Iterator over newline-terminated lines, yielding `(line_number, bytes)`
/// with 1-based line numbers. The final line may omit its newline.
pub struct Lines<R> {
    reader: R,
    max_len: usize,
    line: usize,
    done: bool,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R, max_len: usize) -> Self {
        Self {
            reader,
            max_len,
            line: 0,
            done: false,
        }
    }

    fn read_line(&mut self) -> Result<Option<(usize, Vec<u8>)>, RecordError> {
        let mut buf = Vec::new();
        let read = (&mut self.reader)
            .take(self.max_len as u64)
            .read_until(b'\n', &mut buf)?;

        if read == 0 {
            return Ok(None);
        }
        self.line += 1;

        if buf.last() == Some(&b'\n') {
            buf.pop();
        } else if read >= self.max_len {
            return Err(RecordError::InvalidLine {
                line: self.line,
                reason: format!("line exceeds {} bytes", self.max_len),
            });
        }
        Ok(Some((self.line, buf)))
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = Result<(usize, Vec<u8>), RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = self.read_line().transpose();
        if !matches!(item, Some(Ok(_))) {
            self.done = true;
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(data: &[u8], max_len: usize) -> Vec<Result<Vec<u8>, RecordError>> {
        NulRecords::new(data, max_len).collect()
    }

    #[test]
    fn test_nul_records_clean_eof() {
        let out = records(b"one\0two\0\0", 16);
        let out: Vec<Vec<u8>> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(out, vec![b"one".to_vec(), b"two".to_vec(), Vec::new()]);
    }

    #[test]
    fn test_nul_records_empty_input() {
        assert!(records(b"", 16).is_empty());
    }

    #[test]
    fn test_nul_records_trailing_bytes() {
        let out = records(b"one\0tw", 16);
        assert_eq!(out.len(), 2);
        assert!(out[0].is_ok());
        assert!(matches!(out[1], Err(RecordError::TrailingBytes { len: 2 })));
    }

    #[test]
    fn test_nul_records_length_bound() {
        // exactly max_len including the terminator fits
        let out = records(b"abc\0", 4);
        assert_eq!(out.len(), 1);
        assert!(out[0].is_ok());

        let out = records(b"ok\0abcd\0", 4);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[1], Err(RecordError::TooLong { index: 1, limit: 4 })));
    }

    #[test]
    fn test_lines_with_and_without_final_newline() {
        let out: Vec<_> = Lines::new(&b"/a\n\n/b"[..], 64).map(|r| r.unwrap()).collect();
        assert_eq!(
            out,
            vec![(1, b"/a".to_vec()), (2, Vec::new()), (3, b"/b".to_vec())]
        );
    }

    #[test]
    fn test_lines_length_bound() {
        let out: Vec<_> = Lines::new(&b"/abcdefgh\n"[..], 4).collect();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(RecordError::InvalidLine { line: 1, .. })));
    }
}
