use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use byteordered::Endianness;
use clap::value_t_or_exit;
use ndarray::Array1;
use serde_derive::*;

use thermal_sweep::{
    arg, args_parser,
    cli::{init_logging, parse_tag},
    decode::{bytes_to_f32, bytes_to_i16, bytes_to_u16},
    opt,
    stats::Stats,
    tag::{find_tag, TagRecord},
};

#[derive(Debug, Serialize)]
struct Report {
    path: String,
    tag: String,
    records: Vec<RecordJson>,
    payload_len: usize,
    values: Option<Stats>,
}

#[derive(Debug, Serialize)]
struct RecordJson {
    offset: usize,
    length: u16,
}

impl From<&TagRecord> for RecordJson {
    fn from(r: &TagRecord) -> Self {
        RecordJson {
            offset: r.offset,
            length: r.length,
        }
    }
}

fn main() -> Result<()> {
    let matches = args_parser!("thermal-tags")
        .about("Locate tagged records in an image file and decode their payload.")
        .arg(
            opt!("tag")
                .short("t")
                .default_value("app3")
                .help("Tag code as hex (`ffe3`) or APP marker name (`app3`)"),
        )
        .arg(
            opt!("as")
                .short("a")
                .possible_values(&["f32", "u16", "i16"])
                .help("Decode the payload and report value statistics"),
        )
        .arg(
            opt!("big endian")
                .short("b")
                .takes_value(false)
                .help("Decode as big-endian (default: little-endian)"),
        )
        .arg(
            opt!("dump")
                .short("o")
                .help("Write the stitched payload to this file"),
        )
        .arg(
            opt!("verbose")
                .short("v")
                .takes_value(false)
                .multiple(true)
                .help("Increase log verbosity"),
        )
        .arg(arg!("path").required(true).help("Image path"))
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    let path = value_t_or_exit!(matches, "path", PathBuf);
    let tag_text = matches.value_of("tag").unwrap_or("app3");
    let tag = parse_tag(tag_text)?;
    let endianness = if matches.is_present("big endian") {
        Endianness::Big
    } else {
        Endianness::Little
    };

    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let found = find_tag(tag, &bytes).with_context(|| format!("scanning {}", path.display()))?;

    if let Some(dump) = matches.value_of("dump") {
        fs::write(dump, &found.data_bytes).with_context(|| format!("writing {}", dump))?;
    }

    fn summarize<T: Copy + Into<f64>>(values: Array1<T>) -> Stats {
        let mut stats = Stats::default();
        for &v in values.iter() {
            stats += v.into();
        }
        stats
    }

    let data = &found.data_bytes;
    let values = match matches.value_of("as") {
        Some("f32") => Some(summarize(bytes_to_f32(data, endianness)?)),
        Some("u16") => Some(summarize(bytes_to_u16(data, endianness)?)),
        Some("i16") => Some(summarize(bytes_to_i16(data, endianness)?)),
        _ => None,
    };

    serde_json::to_writer_pretty(
        std::io::stdout().lock(),
        &Report {
            path: format!("{}", path.display()),
            tag: tag_text.to_string(),
            records: found.records.iter().map(RecordJson::from).collect(),
            payload_len: found.data_bytes.len(),
            values,
        },
    )?;
    println!();

    Ok(())
}
