use std::{fmt, str::FromStr};

use clap::{builder::PossibleValue, ValueEnum};
use nalgebra::Vector3;

/// How log events are laid out on stderr.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum LogStyle {
    Compact,
    Full,
    #[default]
    Pretty,
    Json,
}

impl ValueEnum for LogStyle {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Compact, Self::Full, Self::Pretty, Self::Json]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        Some(PossibleValue::new(match self {
            Self::Compact => "compact",
            Self::Full => "full",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }))
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_possible_value() {
            Some(v) => f.write_str(v.get_name()),
            None => Ok(()),
        }
    }
}

/// A point given on the command line as `x,y,z`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Point(pub Vector3<f32>);

impl FromStr for Point {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<f32>().map_err(|e| format!("{p:?}: {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [x, y, z] => Ok(Self(Vector3::new(*x, *y, *z))),
            _ => Err(format!("expected x,y,z, got {} components", parts.len())),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct LogArgs {
    /// Comma-separated event filter directives
    #[arg(
        short = 'l',
        long = "log-filter",
        default_value = "warn,armature=info,rig=info",
        env = "RIG_LOG"
    )]
    pub filter: String,
    /// Event layout
    #[arg(long = "log-style", default_value_t = LogStyle::default())]
    pub style: LogStyle,
}

impl LogArgs {
    /// Install a global subscriber writing to stderr.
    pub fn install(&self) {
        let offset = time::UtcOffset::current_local_offset().unwrap_or_else(|e| {
            eprintln!("using UTC timestamps: {e}");
            time::UtcOffset::UTC
        });
        let timer = tracing_subscriber::fmt::time::OffsetTime::new(
            offset,
            time::macros::format_description!("[hour]:[minute]:[second].[subsecond digits:3]"),
        );
        let builder = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_timer(timer)
            .with_target(true)
            .with_env_filter(self.filter.as_str());

        match self.style {
            LogStyle::Compact => builder.compact().init(),
            LogStyle::Full => builder.init(),
            LogStyle::Pretty => builder.pretty().init(),
            LogStyle::Json => builder.json().init(),
        }
    }
}

/// Pose a two-bone arm under two blended animation tracks and print its skin.
#[derive(Debug, clap::Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,
    /// Number of evenly spaced frames between t = 0 and t = 1
    #[arg(short, long, default_value_t = 5)]
    pub frames: usize,
    /// Weight of the lean track relative to the swing track
    #[arg(short, long, default_value_t = 0.5)]
    pub blend: f32,
    /// Location of the soft body
    #[arg(short, long, default_value = "0,0,0", value_name = "X,Y,Z")]
    pub origin: Point,
}
