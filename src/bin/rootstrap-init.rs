use anyhow::Result;

fn main() -> Result<()> {
    rootstrap::cli::run(rootstrap::cli::CliMode::Init)
}
