use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use viewconfig::FormatSetting;

#[derive(Parser, Debug)]
#[command(
    name = "relayview",
    author,
    version,
    about = "Remote desktop frame viewer",
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Configuration file; defaults to `$XDG_CONFIG_HOME/relayview/relayview.toml`.
    #[arg(long, global = true, env = "RELAYVIEW_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Wire format frames are encoded into: `bgra`, `rgba`, `rgba10`, or `yuv420`.
    #[arg(long, global = true, value_name = "FORMAT", value_parser = parse_format)]
    pub format: Option<FormatSetting>,

    /// Size of generated frames (e.g. `1920x1080`).
    #[arg(long, global = true, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Frames produced per second.
    #[arg(long, global = true, value_name = "FPS")]
    pub fps: Option<f32>,

    /// Stream a still image instead of the test pattern.
    #[arg(long, global = true, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Present without waiting for vertical sync.
    #[arg(long, global = true)]
    pub no_vsync: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect and validate configuration files.
    Config(ConfigCommand),
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Parse and validate FILE, printing `ok` on success.
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the configuration after defaults and command-line overrides.
    Print,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_format(value: &str) -> Result<FormatSetting, String> {
    if value.trim().is_empty() {
        return Err("pixel format must not be empty".to_string());
    }
    FormatSetting::parse(value).map_err(|err| err.to_string())
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    viewconfig::parse_size(value).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from([
            "relayview",
            "--format",
            "yuv420",
            "--size",
            "640x480",
            "--fps",
            "15",
            "--no-vsync",
        ])
        .expect("valid arguments");
        assert_eq!(cli.run.format, Some(FormatSetting::Yuv420));
        assert_eq!(cli.run.size, Some((640, 480)));
        assert_eq!(cli.run.fps, Some(15.0));
        assert!(cli.run.no_vsync);
        assert!(cli.command.is_none());
    }

    #[test]
    fn config_subcommands_accept_global_overrides() {
        let cli = Cli::try_parse_from(["relayview", "config", "print", "--fps", "10"])
            .expect("valid arguments");
        assert!(matches!(
            cli.command,
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Print
            }))
        ));
        assert_eq!(cli.run.fps, Some(10.0));

        let cli = Cli::try_parse_from(["relayview", "config", "check", "view.toml"])
            .expect("valid arguments");
        match cli.command {
            Some(Command::Config(ConfigCommand {
                action: ConfigAction::Check { file },
            })) => assert_eq!(file, PathBuf::from("view.toml")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_values() {
        assert!(Cli::try_parse_from(["relayview", "--format", "nv12"]).is_err());
        assert!(Cli::try_parse_from(["relayview", "--size", "640"]).is_err());
        assert!(parse_format(" ").is_err());
    }
}
