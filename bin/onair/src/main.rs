use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::{bail, Context};
use clap::Parser;
use onair::{
    sniff::sniff, LoadControl, OnairConfig, SessionEvent, StreamRequest, Tuner,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Parser, Debug, Clone)]
#[clap(version, about)]
pub struct OnairArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    verbose: bool,

    /// Configuration file (TOML)
    #[clap(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP Header sent with every request
    ///
    /// Custom header. eg. "Referer: https://station.example/".
    #[clap(short = 'H', long)]
    headers: Vec<String>,

    /// Cookies sent to the station, in Set-Cookie format
    #[clap(long)]
    cookies: Vec<String>,

    /// Output file path. `-` writes to stdout
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Stop after this many seconds
    #[clap(short, long)]
    duration: Option<u64>,

    /// Only connect, report what the station serves, and exit
    #[clap(long)]
    probe: bool,

    /// Cache fixed-length responses in this directory
    #[clap(long)]
    cache_dir: Option<PathBuf>,

    /// Stream or playlist URL
    url: String,
}

impl OnairArgs {
    fn config(&self) -> anyhow::Result<OnairConfig> {
        let mut config = match &self.config {
            Some(path) => OnairConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => OnairConfig::default(),
        };
        if let Some(dir) = &self.cache_dir {
            config.cache.enabled = true;
            config.cache.dir = Some(dir.clone());
        }
        config.validate()?;
        Ok(config)
    }

    fn request(&self) -> anyhow::Result<StreamRequest> {
        let mut request = StreamRequest::parse(&self.url)?;
        for header in &self.headers {
            let Some((key, value)) = header.split_once(':') else {
                bail!("Invalid header {header:?}, expected \"Name: value\"");
            };
            request = request.with_header(key.trim(), value.trim())?;
        }
        Ok(request)
    }

    async fn output(&self) -> anyhow::Result<Option<Box<dyn AsyncWrite + Unpin + Send>>> {
        let Some(path) = &self.output else {
            return Ok(None);
        };
        let writer: Box<dyn AsyncWrite + Unpin + Send> = if path.as_os_str() == "-" {
            Box::new(tokio::io::stdout())
        } else {
            let file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(file)
        };
        Ok(Some(writer))
    }
}

/// Models a real-time player fed by the current connection.
///
/// Buffered audio is what the connection delivered minus what a player would
/// have played since it started.
struct Playback {
    control: LoadControl,
    bitrate_kbps: Option<u32>,
    bytes: u64,
    playing_since: Option<Instant>,
    started: bool,
    loading: bool,
}

impl Playback {
    fn new(control: LoadControl) -> Self {
        Self {
            control,
            bitrate_kbps: None,
            bytes: 0,
            playing_since: None,
            started: false,
            loading: true,
        }
    }

    fn connected(&mut self, bitrate_kbps: Option<u32>) {
        self.bitrate_kbps = bitrate_kbps;
        self.bytes = 0;
        self.playing_since = None;
        self.loading = true;
        self.control.reset();
    }

    fn received(&mut self, len: usize) {
        self.bytes += len as u64;
        let Some(delivered) = self
            .bitrate_kbps
            .and_then(|kbps| LoadControl::buffered_duration(self.bytes, kbps))
        else {
            return;
        };
        let played = self
            .playing_since
            .map_or(Duration::ZERO, |since| since.elapsed());
        let buffered = delivered.saturating_sub(played);

        if self.playing_since.is_none() {
            let rebuffering = self.started;
            if self.control.should_start_playback(buffered, rebuffering) {
                tracing::info!(
                    "{} with {:.1}s buffered",
                    if rebuffering { "Resumed" } else { "Ready to play" },
                    buffered.as_secs_f64()
                );
                self.playing_since = Some(Instant::now());
                self.started = true;
            }
        }

        let loading = self.control.should_continue_loading(buffered);
        if loading != self.loading {
            tracing::debug!(
                "{:.1}s buffered, a player would {} loading",
                buffered.as_secs_f64(),
                if loading { "resume" } else { "pause" }
            );
            self.loading = loading;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = OnairArgs::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .try_from_env()
                .unwrap_or_else(|_| format!("onair={default_level},{default_level}").into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = args.config()?;
    let request = args.request()?;
    let mut output = args.output().await?;

    let mut tuner = Tuner::new(config).await?;
    if !args.cookies.is_empty() {
        tuner
            .client()
            .add_cookies(args.cookies.clone(), request.url().as_str())?;
    }
    let mut playback = Playback::new(tuner.load_control());
    let mut events = tuner.tune(request).await;

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let result = loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = &mut deadline => {
                tracing::info!("Duration reached, stopping.");
                break Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping.");
                break Ok(());
            }
        };

        match event {
            Some(SessionEvent::Connected {
                url,
                length,
                headers,
            }) => {
                let bitrate: Option<u32> =
                    headers.first("icy-br").and_then(|br| br.trim().parse().ok());
                tracing::info!(
                    "Connected to {url} ({length:?}, station {:?}, {} kbps)",
                    headers.first("icy-name").unwrap_or("unknown"),
                    bitrate.map_or("?".to_string(), |br| br.to_string())
                );
                playback.connected(bitrate);
            }
            Some(SessionEvent::Data(data)) => {
                if args.probe {
                    tracing::info!("Stream format: {:?}", sniff(&data));
                    break Ok(());
                }
                playback.received(data.len());
                if let Some(output) = output.as_mut() {
                    output.write_all(&data).await?;
                }
            }
            Some(SessionEvent::Reconnecting {
                attempt,
                delay,
                error,
            }) => {
                tracing::warn!(
                    "Connection lost ({error}), reconnecting in {}ms (attempt {attempt})",
                    delay.as_millis()
                );
            }
            Some(SessionEvent::Failed(error)) => {
                break Err(anyhow::anyhow!("Cannot play this station: {error}"));
            }
            Some(SessionEvent::Stopped) | None => break Ok(()),
        }
    };

    tuner.stop().await;
    if let Some(output) = output.as_mut() {
        output.flush().await?;
    }
    result
}
