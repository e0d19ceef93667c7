mod cli;

use loopcast::{
    config,
    server::{self, AppContext},
    startup,
    state::RunState,
    supervisor::StreamingSupervisor,
};
use loopcast_av::AudioResolver;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;
use std::time::Duration;

/// How long shutdown waits for the supervisor to finish its current item.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

async fn start(host: Option<String>, port: Option<u16>, config_path: Option<&Path>) -> Result<()> {
    let config_file = config::find_config_file(config_path);
    let mut config = config::load_config_or_default(config_file.as_deref())?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let base_dir = config::base_dir(config_file.as_deref());

    // All startup checks run before anything binds
    let (stream, playlist) = match startup::prepare(&config, &base_dir) {
        Ok(prepared) => prepared,
        Err(e) => {
            tracing::error!("Startup failed: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting loopcast");
    if stream.stop_in_flight {
        tracing::info!("Stop requests will terminate the in-flight encode");
    }

    // Bind before any tool runs so a busy port leaves nothing behind
    let listener = match server::bind(&config.server).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("{:#}", e);
            return Err(e);
        }
    };

    let run_state = RunState::new();
    let supervisor = StreamingSupervisor::new(
        playlist,
        stream.clone(),
        startup::build_resolver(&config, stream.resolve_timeout),
        startup::build_runner(&config, &stream, &run_state),
        run_state.clone(),
    );
    let supervisor_handle = tokio::task::spawn_blocking(move || supervisor.run());

    let server_result = server::serve(
        listener,
        AppContext::new(run_state.clone()),
        server::shutdown_signal(),
    )
    .await;

    // Cleanup
    tracing::info!("Shutting down...");
    run_state.request_stop();
    match tokio::time::timeout(SHUTDOWN_GRACE, supervisor_handle).await {
        Ok(Ok(report)) => tracing::info!("Supervisor finished: {:?}", report),
        Ok(Err(e)) => tracing::error!("Supervisor task failed: {}", e),
        Err(_) => tracing::warn!("Supervisor is still inside an encode; not waiting for it"),
    }

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "loopcast=trace,loopcast_av=trace,tower_http=debug".to_string()
        } else {
            "loopcast=debug,loopcast_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            let result = rt.block_on(start(host, port, cli.config.as_deref()));
            // A blocking encode may still be running; don't let it hold the process.
            rt.shutdown_timeout(SHUTDOWN_GRACE);
            result
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate(path.as_deref())
        }
        Commands::Resolve { reference } => resolve(&reference, cli.config.as_deref()),
        Commands::Version => {
            println!("loopcast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config_file = config::find_config_file(config_path);
    let config = config::load_config_or_default(config_file.as_deref())?;

    println!("Checking external tools...\n");

    let tools = loopcast_av::check_configured_tools(
        config.tools.ffmpeg.as_deref(),
        config.tools.yt_dlp.as_deref(),
    );
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them before starting the stream.");
    }

    Ok(())
}

fn validate(path: Option<&Path>) -> Result<()> {
    let config_file = config::find_config_file(path);
    match config_file {
        Some(ref p) => println!("Validating config: {:?}", p),
        None => println!("No config file found, using defaults"),
    }

    let config = config::load_config_or_default(config_file.as_deref())?;
    let base_dir = config::base_dir(config_file.as_deref());
    let (stream, playlist) = startup::prepare(&config, &base_dir)?;

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Video: {}", stream.video_path.display());
    println!("  Playlist: {}", stream.playlist_path.display());
    println!("  References: {}", playlist.len());
    println!("  Cycle pause: {:?}", stream.cycle_pause);
    println!("  Stop in flight: {}", stream.stop_in_flight);
    println!(
        "  Profile: {} @ {} fps, video {}, audio {}",
        config.encode.resolution,
        config.encode.frame_rate,
        config.encode.video_bitrate,
        config.encode.audio_bitrate
    );

    Ok(())
}

fn resolve(reference: &str, config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let timeout = config.stream.resolve_timeout_secs.map(Duration::from_secs);

    let location = startup::build_resolver(&config, timeout).resolve(reference)?;
    println!("{}", location);
    Ok(())
}
