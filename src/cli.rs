//! Helpers shared by the accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result};
pub use clap::{App, Arg, ArgMatches};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use tracing_subscriber::EnvFilter;

use crate::sweep::{SweepConfig, Values};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Install a stderr `tracing` subscriber. `RUST_LOG` takes
/// precedence over the `-v` count.
pub fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Progress bar in the style shared by all binaries.
pub fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// Sweep configuration from an optional JSON file, with
/// lists given on the command line taking precedence.
pub fn sweep_config_from_matches(matches: &ArgMatches) -> Result<SweepConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => read_sweep_config(Path::new(path))?,
        None => SweepConfig::default(),
    };

    let lists = [
        ("distance", &mut config.distances),
        ("humidity", &mut config.humidities),
        ("emissivity", &mut config.emissivities),
        ("reflection", &mut config.reflections),
    ];
    for (name, list) in lists {
        if let Some(text) = matches.value_of(name) {
            let Values(values) = text
                .parse::<Values>()
                .with_context(|| format!("invalid --{} list `{}`", name, text))?;
            *list = values;
        }
    }
    Ok(config)
}

pub fn read_sweep_config(path: &Path) -> Result<SweepConfig> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing sweep config {}", path.display()))
}

/// Parse a tag code given as hex (`ffe3`, `0xffe3`) or as
/// an APP marker name (`app3`).
pub fn parse_tag(text: &str) -> Result<[u8; 2]> {
    let text = text.trim().to_lowercase();
    if let Some(n) = text.strip_prefix("app") {
        let n: u8 = n.parse().with_context(|| format!("invalid marker `{}`", text))?;
        return crate::tag::markers::app(n).with_context(|| format!("no such marker `{}`", text));
    }

    let hex = text.trim_start_matches("0x");
    anyhow::ensure!(hex.len() == 4, "tag must be 2 bytes of hex: `{}`", text);
    let code = u16::from_str_radix(hex, 16).with_context(|| format!("invalid tag `{}`", text))?;
    Ok(code.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() -> Result<()> {
        assert_eq!(parse_tag("app3")?, [0xff, 0xe3]);
        assert_eq!(parse_tag("APP1")?, [0xff, 0xe1]);
        assert_eq!(parse_tag("0xFFE3")?, [0xff, 0xe3]);
        assert_eq!(parse_tag("ffd8")?, [0xff, 0xd8]);
        assert!(parse_tag("app16").is_err());
        assert!(parse_tag("ff").is_err());
        Ok(())
    }

    #[test]
    fn config_overrides() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sweep.json");
        std::fs::write(
            &path,
            r#"{"distances":[5,10],"humidities":[40],"emissivities":[0.9],"reflections":[20]}"#,
        )?;

        let matches = App::new("test")
            .arg(opt!("config"))
            .arg(opt!("distance"))
            .arg(opt!("humidity"))
            .arg(opt!("emissivity"))
            .arg(opt!("reflection"))
            .get_matches_from(vec![
                "test",
                "--config",
                path.to_str().unwrap(),
                "--emissivity",
                "0.90:1.00:0.05",
            ]);

        let config = sweep_config_from_matches(&matches)?;
        assert_eq!(config.distances, vec![5., 10.]);
        assert_eq!(config.shape(), [2, 1, 3, 1]);
        Ok(())
    }
}
