mod cli;

use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use indicatif::{HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};
use medley_core::{plan, run_with_progress, Config, MedleyError, OverflowMode, ProgressEvent};

use crate::cli::build_cli;

struct ProgressState {
    sample_rate: u32,
    total_label: String,
}

fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(frames as f64 / f64::from(sample_rate))
}

/// Process status for a failed run, one per documented failure class.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MedleyError>() {
        Some(MedleyError::SourceDirectory { .. }) => 2,
        Some(MedleyError::NoValidTracks { .. }) => 3,
        Some(MedleyError::OutputUnwritable { .. }) => 4,
        Some(MedleyError::Allocation { .. }) => 5,
        Some(MedleyError::UnexpectedEof { .. }) | Some(MedleyError::Read { .. }) => 6,
        _ => 1,
    }
}

fn main() -> ExitCode {
    env_logger::init();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let matches = build_cli().get_matches();

    let source_dir = matches
        .get_one::<PathBuf>("read")
        .expect("defaulted argument");
    let output_path = matches
        .get_one::<PathBuf>("write")
        .expect("defaulted argument");
    let in_marker = *matches.get_one::<Duration>("in").expect("defaulted argument");
    let out_marker = *matches.get_one::<Duration>("out").expect("defaulted argument");
    let crossfade = *matches
        .get_one::<Duration>("xfade")
        .expect("defaulted argument");
    let overflow = if matches.get_flag("saturate") {
        OverflowMode::Saturate
    } else {
        OverflowMode::Wrap
    };
    let dry_run = matches.get_flag("dry-run");

    if out_marker <= in_marker {
        return Err(anyhow!(
            "out-marker ({:.3}s) must come after the in-marker ({:.3}s)",
            out_marker.as_secs_f64(),
            in_marker.as_secs_f64()
        ));
    }
    let segment_length = out_marker - in_marker;
    if crossfade * 2 > segment_length {
        return Err(anyhow!(
            "crossfade ({:.3}s) cannot be longer than half of the segment ({:.3}s)",
            crossfade.as_secs_f64(),
            segment_length.as_secs_f64()
        ));
    }

    let config = Config::builder(source_dir, output_path, segment_length)
        .start_offset(in_marker)
        .crossfade(crossfade)
        .overflow(overflow)
        .build()
        .context("invalid medley configuration")?;

    if dry_run {
        let plan = plan(&config)
            .with_context(|| format!("failed to plan a medley from '{}'", source_dir.display()))?;

        println!("Dry run: {} track(s), {}", plan.tracks.len(), plan.format);
        for track in &plan.tracks {
            println!(
                "  {:>3}. {} ({:.2}s)",
                track.ordinal,
                track.display_name,
                track.duration.as_secs_f64()
            );
        }
        for rejection in &plan.rejected {
            println!("  skipped {}: {}", rejection.display_name, rejection.reason);
        }
        println!(
            "Would write {} frames ({} bytes, {:.3}s) to {}",
            plan.header.frames,
            plan.header.data_chunk_size,
            plan.duration().as_secs_f64(),
            output_path.display()
        );
        return Ok(());
    }

    let progress = ProgressBar::new(0);
    progress.set_draw_target(ProgressDrawTarget::stderr());

    let bar_style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar());

    let state = RefCell::new(ProgressState {
        sample_rate: 0,
        total_label: String::new(),
    });

    let progress_handle = progress.clone();
    let result = run_with_progress(config, move |event| match event {
        ProgressEvent::Start {
            total_frames,
            sample_rate,
            tracks,
        } => {
            let mut state = state.borrow_mut();
            state.sample_rate = sample_rate;
            state.total_label = format!(
                "{}",
                HumanDuration(frames_to_duration(total_frames, sample_rate))
            );
            progress_handle.set_style(bar_style.clone());
            progress_handle.set_length(total_frames.max(1));
            progress_handle.enable_steady_tick(Duration::from_millis(100));
            progress_handle.println(format!("Mixing {tracks} track(s)"));
        }
        ProgressEvent::Track { ordinal, name } => {
            progress_handle.println(format!("  {ordinal:>3}. {name}"));
        }
        ProgressEvent::Advance { written_frames } => {
            let state = state.borrow();
            progress_handle.set_position(written_frames);
            progress_handle.set_message(format!(
                "{} / {}",
                HumanDuration(frames_to_duration(written_frames, state.sample_rate)),
                state.total_label
            ));
        }
        ProgressEvent::Finish => {
            progress_handle.set_message(String::from("Completed"));
        }
    })
    .with_context(|| format!("failed to build a medley from '{}'", source_dir.display()));

    progress.finish_and_clear();

    let report = result?;
    for rejection in &report.rejected {
        eprintln!("Skipped {}: {}", rejection.display_name, rejection.reason);
    }
    println!(
        "Wrote {} track(s), {} frames ({}) to {}",
        report.tracks.len(),
        report.frames_written,
        report.format,
        output_path.display()
    );

    Ok(())
}
