/// `devices.txt`: fixed-arity device node records
///
/// Grammar, one record per line, fields separated by whitespace:
///
/// ```text
/// path kind major minor mode uid:gid
/// path kind major minor mode uid gid
/// ```
///
/// `kind` is one of `b` (block), `c`/`u` (character), `p`/`f` (FIFO);
/// `major`/`minor`/`uid`/`gid` are decimal, `mode` is octal and may carry
/// the `S_IF*` bits of `kind`.
use super::reader::{strip_cr, Lines};
use crate::config::types::RecordError;
use crate::kernel::scoped_dir::ScopedPath;
use std::fmt;
use std::io::BufRead;

/// Node type to create
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Block,
    Char,
    Fifo,
}

impl DeviceKind {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "b" => Some(DeviceKind::Block),
            "c" | "u" => Some(DeviceKind::Char),
            "p" | "f" => Some(DeviceKind::Fifo),
            _ => None,
        }
    }

    /// `S_IF*` file type bits passed to `mknodat`
    pub fn file_type(self) -> libc::mode_t {
        match self {
            DeviceKind::Block => libc::S_IFBLK,
            DeviceKind::Char => libc::S_IFCHR,
            DeviceKind::Fifo => libc::S_IFIFO,
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceKind::Block => "block",
            DeviceKind::Char => "char",
            DeviceKind::Fifo => "fifo",
        })
    }
}

/// One device node to materialise inside the rootfs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSpec {
    pub path: ScopedPath,
    pub kind: DeviceKind,
    pub major: u32,
    pub minor: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

fn invalid(line: usize, reason: impl Into<String>) -> RecordError {
    RecordError::InvalidLine {
        line,
        reason: reason.into(),
    }
}

fn parse_u32(line: usize, field: &str, raw: &str, radix: u32) -> Result<u32, RecordError> {
    // from_str_radix accepts a leading '+', the grammar does not
    if raw.is_empty() || !raw.bytes().all(|b| (b as char).is_digit(radix)) {
        return Err(invalid(line, format!("{} {:?} is not a number", field, raw)));
    }
    u32::from_str_radix(raw, radix)
        .map_err(|_| invalid(line, format!("{} {:?} is out of range", field, raw)))
}

impl DeviceSpec {
    fn parse_line(line: usize, raw: &[u8]) -> Result<Self, RecordError> {
        let text = std::str::from_utf8(raw).map_err(|_| invalid(line, "record is not valid UTF-8"))?;
        let fields: Vec<&str> = text.split_ascii_whitespace().collect();

        let (uid, gid) = match fields.len() {
            6 => fields[5]
                .split_once(':')
                .ok_or_else(|| invalid(line, format!("owner {:?} is not uid:gid", fields[5])))?,
            7 => (fields[5], fields[6]),
            n => return Err(invalid(line, format!("expected 6 or 7 fields, found {}", n))),
        };

        let path = ScopedPath::parse_absolute(fields[0].as_bytes()).map_err(|reason| {
            RecordError::InvalidPath {
                line,
                path: fields[0].to_string(),
                reason,
            }
        })?;

        let kind = DeviceKind::from_letter(fields[1]).ok_or_else(|| RecordError::UnsupportedKind {
            line,
            kind: fields[1].to_string(),
        })?;

        let raw_mode = parse_u32(line, "mode", fields[4], 8)?;
        let type_bits = raw_mode & !0o7777;
        if type_bits != 0 && type_bits != kind.file_type() as u32 {
            return Err(invalid(
                line,
                format!("mode {:o} does not describe a {} device", raw_mode, kind),
            ));
        }
        let mode = raw_mode & 0o7777;

        Ok(Self {
            path,
            kind,
            major: parse_u32(line, "major", fields[2], 10)?,
            minor: parse_u32(line, "minor", fields[3], 10)?,
            mode,
            uid: parse_u32(line, "uid", uid, 10)?,
            gid: parse_u32(line, "gid", gid, 10)?,
        })
    }
}

/// Parse the whole device list; the first bad record rejects the file.
pub fn parse_devices<R: BufRead>(reader: R, max_line_len: usize) -> Result<Vec<DeviceSpec>, RecordError> {
    let mut specs = Vec::new();
    for line in Lines::new(reader, max_line_len) {
        let (line, raw) = line?;
        let raw = strip_cr(&raw);
        if raw.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        specs.push(DeviceSpec::parse_line(line, raw)?);
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &str) -> Result<Vec<DeviceSpec>, RecordError> {
        parse_devices(data.as_bytes(), 4096)
    }

    #[test]
    fn test_fuse_line_with_separate_owner_fields() {
        let specs = parse("/dev/fuse c 10 229 0666 0 0\n").unwrap();
        assert_eq!(specs.len(), 1);
        let fuse = &specs[0];
        assert_eq!(fuse.path.to_string(), "/dev/fuse");
        assert_eq!(fuse.kind, DeviceKind::Char);
        assert_eq!((fuse.major, fuse.minor), (10, 229));
        assert_eq!(fuse.mode, 0o666);
        assert_eq!((fuse.uid, fuse.gid), (0, 0));
    }

    #[test]
    fn test_engine_format_with_colon_owner() {
        let specs = parse("/dev/kvm c 10 232 660 0:36\n/dev/loop0 b 7 0 0600 0:6\n/run/pipe p 0 0 644 1000:1000").unwrap();
        assert_eq!(specs.len(), 3);
        assert_eq!(specs[0].mode, 0o660);
        assert_eq!(specs[0].gid, 36);
        assert_eq!(specs[1].kind, DeviceKind::Block);
        assert_eq!(specs[2].kind, DeviceKind::Fifo);
        assert_eq!((specs[2].uid, specs[2].gid), (1000, 1000));
    }

    #[test]
    fn test_mode_with_matching_file_type_bits() {
        let specs = parse("/dev/fuse c 10 229 20666 0:0\n/dev/loop0 b 7 0 60660 0:6\n/run/pipe p 0 0 10600 0:0\n").unwrap();
        assert_eq!(specs[0].mode, 0o666);
        assert_eq!(specs[1].mode, 0o660);
        assert_eq!(specs[2].mode, 0o600);

        let err = parse("/dev/fuse c 10 229 60666 0:0").unwrap_err();
        assert!(matches!(err, RecordError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn test_oci_kind_letters() {
        assert_eq!(DeviceKind::from_letter("u"), Some(DeviceKind::Char));
        assert_eq!(DeviceKind::from_letter("f"), Some(DeviceKind::Fifo));
        assert_eq!(DeviceKind::from_letter("a"), None);
    }

    #[test]
    fn test_unsupported_kind_names_the_line() {
        let err = parse("/dev/null c 1 3 0666 0:0\n/dev/weird x 1 1 0666 0:0\n").unwrap_err();
        match err {
            RecordError::UnsupportedKind { line, kind } => {
                assert_eq!(line, 2);
                assert_eq!(kind, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_grammar_violations() {
        let cases = [
            "/dev/fuse c 10 229 0666",
            "/dev/fuse c 10 229 0666 0",
            "/dev/fuse c ten 229 0666 0:0",
            "/dev/fuse c 10 229 0999 0:0",
            "/dev/fuse c 10 229 17777 0:0",
            "/dev/fuse c 10 229 0666 +0:0",
            "/dev/fuse c 10 229 0666 0:0 extra",
        ];
        for case in cases {
            assert!(
                matches!(parse(case), Err(RecordError::InvalidLine { line: 1, .. })),
                "accepted {:?}",
                case
            );
        }
    }

    #[test]
    fn test_path_escapes_rejected() {
        assert!(matches!(
            parse("/dev/../../etc/x c 1 3 0666 0:0"),
            Err(RecordError::InvalidPath { line: 1, .. })
        ));
        assert!(matches!(
            parse("dev/null c 1 3 0666 0:0"),
            Err(RecordError::InvalidPath { line: 1, .. })
        ));
    }

    #[test]
    fn test_blank_lines_skipped() {
        assert_eq!(parse("\n  \n/dev/null c 1 3 0666 0:0\n\n").unwrap().len(), 1);
        assert!(parse("").unwrap().is_empty());
    }
}
