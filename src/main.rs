use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use soundstrip::animation::AnimationRunner;
use soundstrip::audio::{list_sources, AudioSource, SpectrumAnalyzer};
use soundstrip::catalog::create_signals;
use soundstrip::cli::Args;
use soundstrip::config::{Config, SourceKind};
use soundstrip::grid::PixelGrid;
use soundstrip::led::{LedRenderer, SpiSink};
use soundstrip::network::{serve, Hub};
use soundstrip::signal::{NetworkSink, SignalRegistry};
use soundstrip::system_monitor::SystemMonitor;
use soundstrip::watchdog::Watchdog;

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).context("Invalid --log-level")?,
        None => EnvFilter::from_default_env().add_directive("soundstrip=info".parse()?),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Resolves on Ctrl-C or a line (or EOF) on stdin.
async fn wait_for_shutdown() {
    // A detached reader thread; tokio's stdin would hold up runtime shutdown
    let (line_tx, line_rx) = oneshot::channel::<()>();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        let _ = line_tx.send(());
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        }
        _ = line_rx => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level.as_deref())?;

    if args.init_config {
        let path = Config::init_default_config()?;
        println!("Wrote config template to {}", path.display());
        return Ok(());
    }

    if args.list_devices {
        for (name, description) in list_sources()? {
            println!("{}\t{}", name, description);
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_default_path().unwrap_or_default(),
    };
    config.merge_args(&args);

    info!("Starting soundstrip ({}x{} grid)", config.grid.width, config.grid.height);

    let registry = Arc::new(SignalRegistry::new());
    let hub = Arc::new(Hub::new(config.server.outbound_queue));
    let hub_sink: Arc<dyn NetworkSink> = hub.clone();
    let sink = config.server.enabled.then_some(&hub_sink);
    create_signals(&registry, sink, &config.signal_defaults())
        .context("Failed to register signals")?;

    let (server_stop, server_stop_rx) = oneshot::channel::<()>();
    let server = config.server.enabled.then(|| {
        let bind = config.server.bind;
        let hub = hub.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = server_stop_rx.await;
            };
            if let Err(e) = serve(bind, hub, registry, shutdown).await {
                error!("{}", e);
            }
        })
    });

    let mut watchdog = if config.watchdog.enabled {
        Some(
            Watchdog::start(config.watchdog.device.as_deref(), config.watchdog.interval())
                .context("Failed to start watchdog")?,
        )
    } else {
        None
    };

    let mut analyzer = SpectrumAnalyzer::start(&registry, config.analyzer_settings())
        .context("Failed to start spectrum analyzer")?;

    let grid = Arc::new(PixelGrid::from_registry(
        &registry,
        config.grid.width,
        config.grid.height,
    )?);
    let animation = config
        .grid
        .animation
        .build(&registry, config.grid.frame_rate)
        .context("Failed to build animation")?;
    let mut runner =
        AnimationRunner::start(animation, grid).context("Failed to start animation")?;

    let mut renderer = match &config.led.spi_device {
        Some(path) => {
            let sink = SpiSink::open(path)
                .with_context(|| format!("Failed to open LED device {}", path.display()))?;
            Some(
                LedRenderer::start(&registry, Box::new(sink), config.renderer_settings())
                    .context("Failed to start LED renderer")?,
            )
        }
        None => {
            info!("No SPI device configured, LED output disabled");
            None
        }
    };

    let mut monitor = if config.monitor.enabled {
        Some(SystemMonitor::start(
            &registry,
            Duration::from_secs(config.monitor.interval_secs.max(1)),
            &config.monitor.disk_path,
        )?)
    } else {
        None
    };

    let mut audio = AudioSource::new(&registry)?;
    if let Some(dog) = &watchdog {
        let timer = dog.create_timer(config.watchdog.audio_timeout());
        dog.watch(&timer);
        audio = audio.with_watchdog(timer);
    }
    let capture = config.capture_settings();
    match config.audio.source {
        SourceKind::Microphone => audio
            .start_microphone(&capture)
            .context("Failed to start audio capture")?,
        SourceKind::Sine => audio.start_sine(
            config.audio.sine_frequency,
            config.audio.sine_amplitude,
            &capture,
        )?,
    }

    info!("Running. Press Enter or Ctrl-C to stop.");
    wait_for_shutdown().await;
    info!("Shutting down");

    audio.stop();
    if let Some(monitor) = monitor.as_mut() {
        monitor.stop();
    }
    if let Some(renderer) = renderer.as_mut() {
        renderer.stop();
    }
    runner.stop();
    analyzer.stop();
    if let Some(dog) = watchdog.as_mut() {
        dog.stop();
    }
    let _ = server_stop.send(());
    if let Some(server) = server {
        if let Err(e) = server.await {
            warn!("Server task ended abnormally: {}", e);
        }
    }

    info!("Stopped");
    Ok(())
}
