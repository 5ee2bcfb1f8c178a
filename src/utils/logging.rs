/// Logger initialisation for the init and hook binaries
use env_logger::{Builder, Env, Target};
use std::fs::File;

/// Where diagnostics go
#[derive(Debug)]
pub enum LogTarget {
    Stderr,
    /// Hook output; the engine keeps hook stdout and drops hook stderr
    Stdout,
    /// The runtime directory's `error.log`, opened for appending
    File(File),
}

/// Build the `env_logger` builder. `RUST_LOG` overrides `default_level`.
pub fn builder(default_level: &str, target: LogTarget) -> Builder {
    let mut builder = Builder::from_env(Env::default().default_filter_or(default_level));
    builder.format_timestamp_millis();
    builder.target(match target {
        LogTarget::Stderr => Target::Stderr,
        LogTarget::Stdout => Target::Stdout,
        LogTarget::File(file) => Target::Pipe(Box::new(file)),
    });
    builder
}

/// Install the global logger. A second call keeps the first logger.
pub fn init_logging(default_level: &str, target: LogTarget) {
    if let Err(e) = builder(default_level, target).try_init() {
        log::debug!("logger already initialised: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    #[test]
    fn test_file_target_receives_records() {
        let mut file = tempfile::tempfile().unwrap();
        let logger = builder("info", LogTarget::File(file.try_clone().unwrap())).build();

        let record = log::Record::builder()
            .args(format_args!("masked directory /proc/acpi"))
            .level(log::Level::Info)
            .target("rootstrap")
            .build();
        log::Log::log(&logger, &record);
        log::Log::flush(&logger);

        let mut contents = String::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_string(&mut contents).unwrap();
        assert!(contents.contains("masked directory /proc/acpi"));
    }

    #[test]
    fn test_default_level_filters() {
        let logger = builder("warn", LogTarget::Stderr).build();
        let info = log::Metadata::builder().level(log::Level::Info).target("rootstrap").build();
        let error = log::Metadata::builder().level(log::Level::Error).target("rootstrap").build();
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(!log::Log::enabled(&logger, &info));
        }
        assert!(log::Log::enabled(&logger, &error));
    }
}
