//! Terminal and JSON rendering for gantry commands.
//!
//! Status lines carry a [`Tone`]; everything a build leaves for the operator
//! to clean up goes to stderr so JSON on stdout stays parseable.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{AnsiColors, OwoColorize, Stream};

use gantry_lib::deps::{Disposal, DepsReport, PhaseDisposal};
use gantry_lib::util::hash::Fingerprint;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Kind of status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
  Done,
  Note,
  Warn,
  Fail,
}

impl Tone {
  fn symbol(self) -> &'static str {
    match self {
      Tone::Done => "✓",
      Tone::Note => "•",
      Tone::Warn => "⚠",
      Tone::Fail => "✗",
    }
  }

  fn color(self) -> AnsiColors {
    match self {
      Tone::Done => AnsiColors::Green,
      Tone::Note => AnsiColors::Blue,
      Tone::Warn => AnsiColors::Yellow,
      Tone::Fail => AnsiColors::Red,
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Tone::Warn | Tone::Fail)
  }
}

/// Print one status line. Warnings and failures go to stderr with the whole
/// message colored; other tones color only the symbol.
pub fn print_line(tone: Tone, message: &str) {
  let color = tone.color();
  if tone.to_stderr() {
    eprintln!(
      "{} {}",
      tone.symbol().if_supports_color(Stream::Stderr, |s| s.color(color)),
      message.if_supports_color(Stream::Stderr, |s| s.color(color))
    );
  } else {
    println!(
      "{} {}",
      tone.symbol().if_supports_color(Stream::Stdout, |s| s.color(color)),
      message
    );
  }
}

pub fn print_success(message: &str) {
  print_line(Tone::Done, message);
}

pub fn print_info(message: &str) {
  print_line(Tone::Note, message);
}

pub fn print_warning(message: &str) {
  print_line(Tone::Warn, message);
}

pub fn print_error(message: &str) {
  print_line(Tone::Fail, message);
}

/// An indented `label: value` line under a status line.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Operator instruction for a container that survived its phase, if any.
pub fn leftover_line(cleanup: &PhaseDisposal) -> Option<String> {
  match &cleanup.disposal {
    Disposal::Removed => None,
    Disposal::Failed { container, message } => Some(format!(
      "{} container {} was not removed ({}), run `docker rm -f {}`",
      cleanup.phase,
      container.short(),
      message,
      container.as_str()
    )),
  }
}

/// Warn about every container the build could not remove.
pub fn print_leftovers(report: &DepsReport) {
  for line in report.leftover_containers().filter_map(leftover_line) {
    print_warning(&line);
  }
}

/// Short fingerprint, or `none` when nothing has been recorded.
pub fn fingerprint_label(fingerprint: Option<&Fingerprint>) -> &str {
  fingerprint.map(Fingerprint::short).unwrap_or("none")
}

/// Sizes in binary units with one decimal above bytes.
pub fn format_bytes(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

  if bytes < 1024 {
    return format!("{} B", bytes);
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{:.1} {}", value, UNITS[unit])
}

/// Elapsed time truncated to milliseconds, in humantime notation.
pub fn format_duration(duration: Duration) -> String {
  let millis = Duration::from_millis(duration.as_millis() as u64);
  humantime::format_duration(millis).to_string()
}

pub fn yes_no(value: bool) -> &'static str {
  if value { "yes" } else { "no" }
}

#[cfg(test)]
mod tests {
  use super::*;
  use gantry_lib::deps::Phase;
  use gantry_lib::engine::ContainerId;

  #[test]
  fn sizes_step_through_units() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1023), "1023 B");
    assert_eq!(format_bytes(1536), "1.5 KB");
    assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 * 1024 * 1024), "5120.0 TB");
  }

  #[test]
  fn durations_drop_sub_millisecond_noise() {
    assert_eq!(format_duration(Duration::from_micros(50_900)), "50ms");
    assert_eq!(format_duration(Duration::from_millis(1500)), "1s 500ms");
    assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
  }

  #[test]
  fn removed_containers_need_no_instruction() {
    let cleanup = PhaseDisposal {
      phase: Phase::Build,
      disposal: Disposal::Removed,
    };
    assert_eq!(leftover_line(&cleanup), None);
  }

  #[test]
  fn leftover_container_names_phase_and_full_id() {
    let id = "4f1c2e0a9b7d6c5e4f3a2b1c0d9e8f7a6b5c4d3e2f1a0b9c8d7e6f5a4b3c2d1e";
    let cleanup = PhaseDisposal {
      phase: Phase::Install,
      disposal: Disposal::Failed {
        container: ContainerId::new(id),
        message: "device or resource busy".to_string(),
      },
    };

    let line = leftover_line(&cleanup).unwrap();
    assert!(line.starts_with("install container 4f1c2e0a9b7d was not removed"));
    assert!(line.contains("(device or resource busy)"));
    assert!(line.ends_with(&format!("docker rm -f {}`", id)));
  }

  #[test]
  fn fingerprint_label_falls_back_to_none() {
    let fp = Fingerprint::of_bytes(b"requests==2.18.4\n");
    assert_eq!(fingerprint_label(Some(&fp)), fp.short());
    assert_eq!(fingerprint_label(None), "none");
  }
}
