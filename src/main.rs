use std::process::ExitCode;

use audioctl::{AudioServices, Config};

static USAGE: &[&str] = &[
    "volume get : Print the master volume (0-100).",
    "volume set <percent> : Set the master volume, clamped to 0-100.",
    "volume muted : Print whether the master element is muted.",
    "volume mute | volume unmute : Change the mute state.",
    "media play | pause | next | previous : Send a transport command.",
    "media seek <microseconds> : Seek relative to the current position.",
    "media position : Print the playback position in microseconds.",
    "media set-position <microseconds> : Jump within the current track.",
    "media duration : Print the current track length in microseconds.",
    "media state : Print position and track length in microseconds.",
];

fn main() -> ExitCode {
    if let Ok(env_filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("info")
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    let services = Config::with(AudioServices::from_config);
    let result = run(&services, &args);
    services.cleanup();

    match result {
        Ok(Some(output)) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Ok(None) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(services: &AudioServices, args: &[&str]) -> anyhow::Result<Option<String>> {
    let volume = &services.volume;
    let media = &services.media;

    match args {
        ["volume", "get"] => Ok(Some(volume.get_volume()?.to_string())),
        ["volume", "set", percent] => {
            volume.set_volume(percent.parse()?)?;
            Ok(None)
        }
        ["volume", "muted"] => Ok(Some(volume.get_mute()?.to_string())),
        ["volume", "mute"] => {
            volume.set_mute(true)?;
            Ok(None)
        }
        ["volume", "unmute"] => {
            volume.set_mute(false)?;
            Ok(None)
        }
        ["media", "play"] => {
            media.play()?;
            Ok(None)
        }
        ["media", "pause"] => {
            media.pause()?;
            Ok(None)
        }
        ["media", "next"] => {
            media.next()?;
            Ok(None)
        }
        ["media", "previous"] => {
            media.previous()?;
            Ok(None)
        }
        ["media", "seek", offset] => {
            media.seek(offset.parse()?)?;
            Ok(None)
        }
        ["media", "position"] => Ok(Some(media.get_position()?.to_string())),
        ["media", "duration"] => Ok(Some(media.get_duration()?.to_string())),
        ["media", "state"] => {
            let state = media.get_media_state()?;
            Ok(Some(format!("{} {}", state.position, state.duration)))
        }
        ["media", "set-position", position] => {
            media.set_position(position.parse()?)?;
            Ok(None)
        }
        _ => {
            println!("USAGE: audioctl <command>");
            println!();
            println!("Commands:");
            for line in USAGE {
                println!("\t{}", line);
            }
            anyhow::bail!("unknown command: {}", args.join(" "))
        }
    }
}
