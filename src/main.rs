use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use env_logger::Env;
use kdt_tool::{
    Args, Container, DecodeOptions, Mode, export_midi_file, parse_track_list, print_bgm_type,
    print_events, print_events_json, print_initial_track_volumes, print_silent_tracks,
    split_tracks, write_isolated,
};
use log::{debug, info};

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    if !args.kdt.is_file() {
        Args::command()
            .error(
                ErrorKind::ValueValidation,
                format!("Invalid path: '{}'", args.kdt.display()),
            )
            .exit();
    }

    let options = DecodeOptions::from(&args);
    debug!("{:?}", options);

    match args.mode {
        Mode::Convert => {
            let out = args
                .output
                .clone()
                .unwrap_or_else(|| args.kdt.with_extension("mid"));
            info!(
                "Converting '{}' to '{}'...",
                args.kdt.display(),
                out.display()
            );
            export_midi_file(&args.kdt, &out, options)?;
        }
        Mode::Dump => {
            let kdt = Container::open(&args.kdt, options.max_file_size)?;
            print_events(&kdt, options.tempo)?;
        }
        Mode::Json => {
            let kdt = Container::open(&args.kdt, options.max_file_size)?;
            print_events_json(&kdt, options.tempo)?;
        }
        Mode::Volumes => {
            let kdt = Container::open(&args.kdt, options.max_file_size)?;
            print_initial_track_volumes(&kdt, options.tempo)?;
        }
        Mode::BgmType => {
            let kdt = Container::open(&args.kdt, options.max_file_size)?;
            print_bgm_type(&kdt, options.tempo)?;
        }
        Mode::NoteCounts => {
            let kdt = Container::open(&args.kdt, options.max_file_size)?;
            print_silent_tracks(&kdt, options.tempo)?;
        }
        Mode::Isolate => {
            if args.tracks.is_empty() {
                Args::command()
                    .error(
                        ErrorKind::MissingRequiredArgument,
                        "`--mode isolate` needs a `--tracks` list",
                    )
                    .exit();
            }

            let list = match parse_track_list(&args.tracks) {
                Ok(list) => list,
                Err(e) => Args::command().error(ErrorKind::InvalidValue, e).exit(),
            };
            write_isolated(&args.kdt, args.output.as_deref(), options, &list)?;
        }
        Mode::Split => {
            split_tracks(&args.kdt, options)?;
        }
    }

    Ok(())
}
