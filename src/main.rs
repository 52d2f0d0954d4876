use anyhow::{Context, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use log::{error, info, warn};
use mediaflow::config::{AppConfig, ReceiverInput, SenderOutput, app_name, version};
use mediaflow::pipeline::{LifecycleState, MediaBackend, Player, Receiver, Sender, SimBackend};
use mediaflow::utils::sos::SignalOfStop;
use std::io::Write;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const TICK: Duration = Duration::from_millis(100);
const EVENT_SYNC: Duration = Duration::from_secs(2);

fn cli() -> Command {
    Command::new(app_name())
        .version(version())
        .author(env!("CARGO_PKG_AUTHORS"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .subcommand_required(true)
        .arg(
            Arg::new("backend")
                .long("backend")
                .global(true)
                .value_name("BACKEND")
                .help("Media framework backend.")
                .value_parser(["sim", "gst"])
                .default_value("sim"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("FILE")
                .help("JSON configuration file."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging."),
        )
        .arg(
            Arg::new("exit-on-stop")
                .long("exit-on-stop")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Quit as soon as the session stops or fails."),
        )
        .subcommand(
            Command::new("play")
                .about("Play a media file")
                .arg(Arg::new("file").required(true).value_name("FILE"))
                .arg(
                    Arg::new("volume")
                        .long("volume")
                        .value_name("VOLUME")
                        .help("Initial volume in [0, 1].")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("rate")
                        .long("rate")
                        .value_name("RATE")
                        .help("Playback rate, negative for reverse.")
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("start-at")
                        .long("start-at")
                        .value_name("SECONDS")
                        .help("Seek to this position once playing.")
                        .value_parser(value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("send")
                .about("Capture the camera and stream or record it")
                .arg(
                    Arg::new("output")
                        .long("output")
                        .value_name("MODE")
                        .value_parser(["file", "rtp"]),
                )
                .arg(Arg::new("location").long("location").value_name("FILE"))
                .arg(Arg::new("host").long("host").value_name("HOST"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .value_parser(value_parser!(u16)),
                ),
        )
        .subcommand(
            Command::new("receive")
                .about("Receive and render a stream")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .value_name("MODE")
                        .value_parser(["file", "rtp"]),
                )
                .arg(Arg::new("location").long("location").value_name("FILE"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_name("PORT")
                        .value_parser(value_parser!(u16)),
                ),
        )
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn make_backend(name: &str) -> anyhow::Result<Arc<dyn MediaBackend>> {
    match name {
        "sim" => Ok(Arc::new(SimBackend::default())),
        #[cfg(feature = "gstreamer")]
        "gst" => {
            let backend = mediaflow::pipeline::backend::gst::GstBackend::new()
                .context("failed to start the GStreamer backend")?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "gstreamer"))]
        "gst" => bail!("this build has no GStreamer support, rebuild with --features gstreamer"),
        other => bail!("unknown backend '{}'", other),
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<AppConfig> {
    match matches.get_one::<String>("config") {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn print_progress(player: &Player) {
    let position = player.position();
    let duration = player.duration();
    let percent = if duration.is_zero() {
        0.0
    } else {
        position.nseconds() as f64 / duration.nseconds() as f64 * 100.0
    };
    print!(
        "\r{} / {} ({:.1}%) [Rate: {:.2}x] [Vol: {:.0}%]   ",
        position,
        duration,
        percent,
        player.playback_rate(),
        player.volume() * 100.0
    );
    let _ = std::io::stdout().flush();
}

/// Wait until Ctrl-C, or until the session ends when `exit_on_stop` is set
fn run_until_stopped(
    sos: &SignalOfStop,
    exit_on_stop: bool,
    state: impl Fn() -> LifecycleState,
    mut tick: impl FnMut(),
) {
    let mut reported = false;
    while !sos.wait_timeout(TICK) {
        tick();
        match state() {
            LifecycleState::Stopped | LifecycleState::Failed => {
                if !reported {
                    println!();
                    info!("Session ended ({})", state().description());
                    reported = true;
                }
                if exit_on_stop {
                    break;
                }
            }
            _ => reported = false,
        }
    }
    println!();
}

fn play(
    backend: Arc<dyn MediaBackend>,
    config: AppConfig,
    matches: &ArgMatches,
    sos: &SignalOfStop,
    exit_on_stop: bool,
) -> anyhow::Result<()> {
    let file = matches
        .get_one::<String>("file")
        .context("missing file to play")?;

    let mut player = Player::new(backend, config.player);
    player.initialize().context("failed to build the player")?;
    player
        .load_source(file)
        .with_context(|| format!("failed to load {}", file))?;

    if let Some(volume) = matches.get_one::<f64>("volume") {
        player.set_volume(*volume);
    }
    for choice in player.stage_choices() {
        info!("Stage {}", choice);
    }

    player.start().context("failed to start playback")?;
    player.sync_events(EVENT_SYNC);

    if let Some(rate) = matches.get_one::<f64>("rate") {
        if let Err(e) = player.set_playback_rate(*rate) {
            warn!("Cannot apply rate {}: {}", rate, e);
        }
    }
    if let Some(seconds) = matches.get_one::<f64>("start-at") {
        let target = (seconds * 1e9) as i64;
        if let Err(e) = player.seek(target) {
            warn!("Cannot seek to {}s: {}", seconds, e);
        }
    }

    run_until_stopped(sos, exit_on_stop, || player.state(), || print_progress(&player));

    player.stop();
    info!("{}", player.health());
    Ok(())
}

fn send(
    backend: Arc<dyn MediaBackend>,
    config: AppConfig,
    matches: &ArgMatches,
    sos: &SignalOfStop,
    exit_on_stop: bool,
) -> anyhow::Result<()> {
    let mut config = config.sender;
    match matches.get_one::<String>("output").map(String::as_str) {
        Some("file") => config.output = SenderOutput::File,
        Some("rtp") => config.output = SenderOutput::Rtp,
        _ => {}
    }
    if let Some(location) = matches.get_one::<String>("location") {
        config.location = location.clone();
    }
    if let Some(host) = matches.get_one::<String>("host") {
        config.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    let mut sender = Sender::new(backend, config);
    sender.initialize().context("failed to build the sender")?;
    for choice in sender.stage_choices() {
        info!("Stage {}", choice);
    }
    sender.start().context("failed to start the sender")?;
    info!("Sender running, press Ctrl-C to stop");

    run_until_stopped(sos, exit_on_stop, || sender.state(), || {});

    sender.stop();
    info!("{}", sender.health());
    Ok(())
}

fn receive(
    backend: Arc<dyn MediaBackend>,
    config: AppConfig,
    matches: &ArgMatches,
    sos: &SignalOfStop,
    exit_on_stop: bool,
) -> anyhow::Result<()> {
    let mut config = config.receiver;
    match matches.get_one::<String>("input").map(String::as_str) {
        Some("file") => config.input = ReceiverInput::File,
        Some("rtp") => config.input = ReceiverInput::Rtp,
        _ => {}
    }
    if let Some(location) = matches.get_one::<String>("location") {
        config.location = location.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        config.port = *port;
    }

    let mut receiver = Receiver::new(backend, config);
    receiver.initialize().context("failed to build the receiver")?;
    for choice in receiver.stage_choices() {
        info!("Stage {}", choice);
    }
    receiver.start().context("failed to start the receiver")?;
    info!("Receiver running, press Ctrl-C to stop");

    run_until_stopped(sos, exit_on_stop, || receiver.state(), || {});

    receiver.stop();
    info!("{}", receiver.health());
    Ok(())
}

fn run(matches: ArgMatches) -> anyhow::Result<()> {
    let config = load_config(&matches)?;
    let backend_name = matches
        .get_one::<String>("backend")
        .map(String::as_str)
        .unwrap_or("sim");
    let backend = make_backend(backend_name)?;
    info!("{} {} using the {} backend", app_name(), version(), backend.name());

    let exit_on_stop = matches.get_flag("exit-on-stop");

    // Ctrl-C only flips the flag; the polling loop performs the shutdown
    let sos = SignalOfStop::new();
    let handler_sos = sos.clone();
    ctrlc::set_handler(move || handler_sos.cancel()).context("error setting Ctrl-C handler")?;

    match matches.subcommand() {
        Some(("play", sub)) => play(backend, config, sub, &sos, exit_on_stop),
        Some(("send", sub)) => send(backend, config, sub, &sos, exit_on_stop),
        Some(("receive", sub)) => receive(backend, config, sub, &sos, exit_on_stop),
        _ => bail!("no command given"),
    }
}

fn main() {
    let matches = cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    if let Err(e) = run(matches) {
        error!("{:#}", e);
        process::exit(1);
    }
}
