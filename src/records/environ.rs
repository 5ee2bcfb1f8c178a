/// `environ` record parsing into an explicitly owned environment map
use super::reader::NulRecords;
use crate::config::types::RecordError;
use std::collections::BTreeMap;
use std::ffi::{CString, OsStr, OsString};
use std::io::BufRead;
use std::os::unix::ffi::{OsStrExt, OsStringExt};

/// Environment of the workload. Never mirrored into the bootstrap's own
/// process environment; it is handed to `execve` as-is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvMap {
    vars: BTreeMap<OsString, OsString>,
}

impl EnvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse NUL-terminated `KEY=VALUE` records. Duplicate keys resolve to
    /// the last occurrence. The key ends at the first `=`, so values may
    /// themselves contain `=`.
    pub fn parse<R: BufRead>(reader: R, max_record_len: usize) -> Result<Self, RecordError> {
        let mut env = EnvMap::new();
        for (index, record) in NulRecords::new(reader, max_record_len).enumerate() {
            let record = record?;
            let Some(split) = record.iter().position(|b| *b == b'=') else {
                return Err(RecordError::MissingSeparator { index });
            };
            if split == 0 {
                return Err(RecordError::EmptyKey { index });
            }

            let value = record[split + 1..].to_vec();
            let mut key = record;
            key.truncate(split);
            env.vars
                .insert(OsString::from_vec(key), OsString::from_vec(value));
        }
        Ok(env)
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(key)).map(OsString::as_os_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(OsStr::new(key))
    }

    pub fn insert(&mut self, key: impl Into<OsString>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    /// `KEY=VALUE` strings sorted by key, ready for `execve`
    pub fn to_exec_env(&self) -> Vec<CString> {
        self.vars
            .iter()
            .filter_map(|(key, value)| {
                let mut entry = Vec::with_capacity(key.len() + value.len() + 1);
                entry.extend_from_slice(key.as_bytes());
                entry.push(b'=');
                entry.extend_from_slice(value.as_bytes());
                // parsed records cannot contain NUL; values inserted later might
                CString::new(entry).ok()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(data: &[u8]) -> Result<EnvMap, RecordError> {
        EnvMap::parse(data, 1024)
    }

    #[test]
    fn test_parse_path_and_home() {
        let env = parse(b"PATH=/bin\0HOME=/root\0").unwrap();
        assert_eq!(env.get("PATH"), Some(OsStr::new("/bin")));
        assert_eq!(env.get("HOME"), Some(OsStr::new("/root")));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_last_definition_wins() {
        let env = parse(b"A=1\0B=2\0A=3\0").unwrap();
        assert_eq!(env.get("A"), Some(OsStr::new("3")));
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_value_may_contain_separator_and_be_empty() {
        let env = parse(b"OPTS=a=b=c\0EMPTY=\0").unwrap();
        assert_eq!(env.get("OPTS"), Some(OsStr::new("a=b=c")));
        assert_eq!(env.get("EMPTY"), Some(OsStr::new("")));
    }

    #[test]
    fn test_malformed_records_are_rejected() {
        assert!(matches!(
            parse(b"A=1\0NOSEP\0"),
            Err(RecordError::MissingSeparator { index: 1 })
        ));
        assert!(matches!(parse(b"=x\0"), Err(RecordError::EmptyKey { index: 0 })));
        assert!(matches!(
            parse(b"A=1\0B=2"),
            Err(RecordError::TrailingBytes { len: 3 })
        ));
    }

    #[test]
    fn test_empty_file_is_an_empty_environment() {
        assert!(parse(b"").unwrap().is_empty());
    }

    #[test]
    fn test_exec_env_is_sorted_and_reproduces_mapping() {
        let env = parse(b"Z=last\0A=first\0M=x=y\0A=again\0").unwrap();
        let exec: Vec<Vec<u8>> = env
            .to_exec_env()
            .into_iter()
            .map(CString::into_bytes)
            .collect();
        assert_eq!(
            exec,
            vec![b"A=again".to_vec(), b"M=x=y".to_vec(), b"Z=last".to_vec()]
        );

        let mut serialized = Vec::new();
        for entry in env.to_exec_env() {
            serialized.extend_from_slice(entry.as_bytes_with_nul());
        }
        assert_eq!(EnvMap::parse(&serialized[..], 1024).unwrap(), env);
    }
}
