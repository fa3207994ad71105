pub mod time;

use std::path::PathBuf;

use clap::{builder::ValueParser, value_parser, Arg, ArgAction, Command};

use self::time::{parse_positive_time, parse_time};

pub const DEFAULT_SOURCE_DIR: &str = "audio/";
pub const DEFAULT_OUTPUT: &str = "medley.wav";
pub const DEFAULT_IN_MARKER: &str = "10";
pub const DEFAULT_OUT_MARKER: &str = "20";
pub const DEFAULT_CROSSFADE: &str = "2";

pub fn build_cli() -> Command {
    Command::new(env!("CARGO_PKG_NAME"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Build a crossfaded medley out of a directory of WAV files")
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(
            "TIME values are seconds (10, 2.5) or unit components (500ms, 1m30s).\n\
             Every track contributes the slice between the in- and out-marker.",
        )
        .arg(
            Arg::new("read")
                .short('r')
                .long("read")
                .value_name("DIR")
                .help("Directory containing the .wav, .wave and .bwf tracks")
                .default_value(DEFAULT_SOURCE_DIR)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("write")
                .short('w')
                .long("write")
                .value_name("FILE")
                .help("Output file, replaced if it exists")
                .default_value(DEFAULT_OUTPUT)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("in")
                .short('i')
                .long("in")
                .value_name("TIME")
                .help("In-marker: where each track's segment starts")
                .default_value(DEFAULT_IN_MARKER)
                .value_parser(ValueParser::new(parse_time)),
        )
        .arg(
            Arg::new("out")
                .short('o')
                .long("out")
                .value_name("TIME")
                .help("Out-marker: where each track's segment ends")
                .default_value(DEFAULT_OUT_MARKER)
                .value_parser(ValueParser::new(parse_positive_time)),
        )
        .arg(
            Arg::new("xfade")
                .short('x')
                .long("xfade")
                .value_name("TIME")
                .help("Crossfade length, at most half of the segment")
                .default_value(DEFAULT_CROSSFADE)
                .value_parser(ValueParser::new(parse_time)),
        )
        .arg(
            Arg::new("saturate")
                .long("saturate")
                .help("Clip crossfade sums to the 16-bit range instead of wrapping around")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Validate the tracks and print the playlist without writing")
                .action(ArgAction::SetTrue),
        )
}
