//! webfsr-remote CLI: the signaling relay plus a command-line host and remote.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webfsr_protocol::Rendezvous;
use webfsr_relay::setup::{CERT_FILE, KEY_FILE};
use webfsr_relay::RelayServer;
use webfsr_session::host::values_message;
use webfsr_session::{
    setup, Backoff, Config, HostAction, HostProfile, LastCodeStore, PairingSession, RemoteMirror,
    SessionState, ValueThrottle,
};
use webfsr_types::{ApplicationMessage, PairingCode, PeerId, Role};

/// How often the host samples its (synthetic) pad.
const SENSOR_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Parser)]
#[command(
    name = "webfsr-remote",
    about = "Pair a WebFSR desktop with a mobile remote",
    version,
    propagate_version = true
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the signaling relay.
    Relay {
        /// Address to listen on (host:port).
        #[arg(long)]
        bind: Option<String>,

        /// PEM certificate to present.
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,

        /// PEM private key for `--cert`.
        #[arg(long, requires = "cert")]
        key: Option<PathBuf>,
    },

    /// Host a pairing session and stream sensor values to the remote.
    Host {
        /// Reuse this code instead of minting a new one.
        #[arg(long)]
        code: Option<String>,

        /// Reuse the last code that connected.
        #[arg(long, conflicts_with = "code")]
        last: bool,

        /// Number of sensors on the pad.
        #[arg(long, default_value_t = 4)]
        sensors: usize,
    },

    /// Join a host as the remote.
    Join {
        /// Pairing code, bare token or share link.
        code: Option<String>,

        /// Rejoin the last code that connected.
        #[arg(long, conflicts_with = "code")]
        last: bool,
    },

    /// Show or clear the last pairing code.
    LastCode {
        #[arg(long)]
        clear: bool,
    },

    /// Generate a TLS certificate for the relay.
    GenerateCert {
        /// Output directory for certificate files.
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        /// Server name the certificate is issued for.
        #[arg(long)]
        server_name: Option<String>,
    },
}

/// Session callbacks, forwarded to the command loop.
enum SessionEvent {
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
    Message(ApplicationMessage),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = setup::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Commands::Relay { bind, cert, key } => run_relay(&config, bind, cert, key).await,
        Commands::Host {
            code,
            last,
            sensors,
        } => run_host(&config, code.as_deref(), last, sensors).await,
        Commands::Join { code, last } => run_join(&config, code.as_deref(), last).await,
        Commands::LastCode { clear } => {
            let store = setup::open_last_code_store(None);
            if clear {
                store.clear();
                println!("Cleared last pairing code");
            } else {
                match store.get() {
                    Some(code) => println!("{code}"),
                    None => println!("No pairing code stored"),
                }
            }
            Ok(())
        }
        Commands::GenerateCert {
            output,
            server_name,
        } => {
            let server_name = server_name.unwrap_or_else(|| config.relay.server_name.clone());
            info!(server_name = %server_name, output = %output.display(), "generating relay certificate");

            let cert = webfsr_certgen::generate_relay_certificate(&server_name)?;
            webfsr_relay::write_certs(&output, &cert)?;

            println!("Certificate: {}", output.join(CERT_FILE).display());
            println!("Private key: {}", output.join(KEY_FILE).display());
            println!("Fingerprint: {}", cert.fingerprint);
            Ok(())
        }
    }
}

async fn run_relay(
    config: &Config,
    bind: Option<String>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| config.relay.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {bind}"))?;

    let cert = cert.or_else(|| config.relay.cert_path.as_ref().map(PathBuf::from));
    let key = key.or_else(|| config.relay.key_path.as_ref().map(PathBuf::from));
    let certificate = match (cert, key) {
        (Some(cert), Some(key)) => webfsr_relay::load_certs(&cert, &key)?,
        _ => webfsr_relay::load_or_generate_certs(&setup::config_dir(), &config.relay.server_name)?,
    };

    let server = RelayServer::bind(addr, &certificate.cert_pem, &certificate.key_pem)?;
    println!("Relay listening on {}", server.local_addr()?);
    println!("Fingerprint: {}", certificate.fingerprint);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;
    Ok(())
}

/// Build a session against the configured relay, with its callbacks
/// forwarded to a channel.
async fn start_session(
    config: &Config,
    role: Role,
    store: Arc<LastCodeStore>,
) -> anyhow::Result<(PairingSession, mpsc::UnboundedReceiver<SessionEvent>)> {
    let rendezvous: Arc<dyn Rendezvous> =
        Arc::new(setup::connect_rendezvous(&config.relay).await?);
    let session = PairingSession::builder(role, rendezvous)
        .settle_delay(config.session.settle_delay())
        .last_code(store)
        .build();

    let (tx, rx) = mpsc::unbounded_channel();
    let events = tx.clone();
    session.on_peer_connected(move |peer| {
        let _ = events.send(SessionEvent::PeerConnected(peer.clone()));
    });
    let events = tx.clone();
    session.on_peer_disconnected(move |peer| {
        let _ = events.send(SessionEvent::PeerDisconnected(peer.clone()));
    });
    session.on_message(move |msg| {
        let _ = tx.send(SessionEvent::Message(msg));
    });
    Ok((session, rx))
}

async fn run_host(
    config: &Config,
    code: Option<&str>,
    last: bool,
    sensors: usize,
) -> anyhow::Result<()> {
    let store = Arc::new(setup::open_last_code_store(None));
    let code = resolve_host_code(code, last, &store)?;
    let (session, mut events) = start_session(config, Role::Host, store).await?;

    session.connect(code).await;
    let status = session.status();
    let Some(code) = status.code else {
        bail!("no pairing code");
    };
    if let Some(error) = status.error {
        bail!("failed to open room {code}: {error}");
    }
    println!("Pairing code: {code}");
    println!("Share link:   {}", code.share_link(&config.session.share_origin));

    let mut profile = HostProfile::new(sensors);
    let mut throttle = ValueThrottle::new(config.session.values_interval());
    let mut poll = tokio::time::interval(SENSOR_POLL_INTERVAL);
    let mut tick: u32 = 0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(event) = events.recv() => match event {
                SessionEvent::PeerConnected(peer) => {
                    println!("Remote connected: {peer}");
                    session.send(profile.sync_message());
                }
                SessionEvent::PeerDisconnected(peer) => {
                    println!("Remote disconnected: {peer}");
                }
                SessionEvent::Message(msg) => match profile.handle(&msg) {
                    Some(HostAction::Resync) => session.send(profile.sync_message()),
                    Some(HostAction::ThresholdChanged { serial_command }) => {
                        info!(command = %serial_command.trim_end(), "serial write");
                        session.send(profile.sync_message());
                    }
                    None => debug!(kind = msg.kind(), "no action for message"),
                },
            },
            _ = poll.tick() => {
                tick = tick.wrapping_add(1);
                if session.status().is_connected() && throttle.admit(Instant::now()) {
                    session.send(values_message(synthetic_values(tick, profile.sensor_count())));
                }
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

/// Triangle waves in 0..1024, offset per sensor.
fn synthetic_values(tick: u32, count: usize) -> Vec<u32> {
    (0..u32::try_from(count).unwrap_or(u32::MAX))
        .map(|i| {
            let t = tick.wrapping_mul(13).wrapping_add(i.wrapping_mul(211)) % 2048;
            if t < 1024 {
                t
            } else {
                2047 - t
            }
        })
        .collect()
}

fn resolve_join_code(
    input: Option<&str>,
    last: bool,
    store: &LastCodeStore,
) -> anyhow::Result<PairingCode> {
    match input {
        Some(input) => match PairingCode::extract(input) {
            Some(code) => Ok(code),
            None => Ok(PairingCode::parse(input)?),
        },
        None if last => store.get().context("no last pairing code stored"),
        None => bail!("pass a pairing code, or --last to rejoin the previous one"),
    }
}

/// `None` means mint a fresh code.
fn resolve_host_code(
    input: Option<&str>,
    last: bool,
    store: &LastCodeStore,
) -> anyhow::Result<Option<PairingCode>> {
    match input {
        Some(input) => Ok(Some(PairingCode::parse(input)?)),
        None if last => store
            .get()
            .map(Some)
            .context("no last pairing code stored, run without --last for a new one"),
        None => Ok(None),
    }
}

async fn run_join(config: &Config, code: Option<&str>, last: bool) -> anyhow::Result<()> {
    let store = Arc::new(setup::open_last_code_store(None));
    let code = resolve_join_code(code, last, &store)?;
    let (session, mut events) = start_session(config, Role::Remote, store).await?;
    let mut status_rx = session.subscribe();
    let mut backoff = Backoff::from_config(&config.reconnect);
    let mut mirror = RemoteMirror::default();

    println!("Joining {code}");
    session.connect(Some(code)).await;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(event) = events.recv() => match event {
                SessionEvent::PeerConnected(peer) => {
                    backoff.reset();
                    println!("Connected to host {peer}");
                    session.send(ApplicationMessage::Ready);
                }
                SessionEvent::PeerDisconnected(peer) => {
                    println!("Host {peer} left, waiting for it to come back");
                    mirror.reset();
                }
                SessionEvent::Message(msg) => {
                    mirror.apply(&msg);
                    if matches!(msg, ApplicationMessage::Sync { .. }) {
                        print_mirror(&mirror);
                    } else {
                        debug!(values = ?mirror.sensor_values, "values");
                    }
                }
            },
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = status_rx.borrow_and_update().clone();
                let failed = status.state == SessionState::Disconnected && status.peer.is_none();
                let Some(error) = status.error.filter(|_| failed) else {
                    continue;
                };
                let Some(delay) = backoff.next_delay() else {
                    bail!("giving up after {} attempts: {error}", backoff.attempt());
                };
                warn!(error = %error, ?delay, "join failed, retrying");
                tokio::time::sleep(delay).await;
                session.retry().await;
            }
        }
    }

    session.disconnect().await;
    Ok(())
}

fn print_mirror(mirror: &RemoteMirror) {
    println!(
        "Host profile: {} sensors, theme {:?}{}",
        mirror.sensor_count(),
        mirror.theme,
        if mirror.is_locked { ", locked" } else { "" }
    );
    for i in 0..mirror.sensor_count() {
        let threshold = mirror
            .thresholds
            .get(i)
            .map_or_else(|| "-".to_string(), ToString::to_string);
        println!("  {:<12} threshold {threshold:>5}  {}", mirror.label(i), mirror.bar_color(i));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_code_from_link_token_or_store() {
        let store = LastCodeStore::in_memory();
        let code = PairingCode::generate();

        let link = code.share_link("https://webfsr.com");
        assert_eq!(resolve_join_code(Some(&link), false, &store).unwrap(), code);
        assert_eq!(
            resolve_join_code(Some(code.display_token()), false, &store).unwrap(),
            code
        );

        assert!(resolve_join_code(None, true, &store).is_err());
        store.set(Some(code.clone()));
        assert_eq!(resolve_join_code(None, true, &store).unwrap(), code);
        assert!(resolve_join_code(None, false, &store).is_err());
    }

    #[test]
    fn host_code_fresh_explicit_or_last() {
        let store = LastCodeStore::in_memory();
        let code = PairingCode::generate();

        assert_eq!(resolve_host_code(None, false, &store).unwrap(), None);
        assert!(resolve_host_code(None, true, &store).is_err());
        assert_eq!(
            resolve_host_code(Some(code.display_token()), false, &store).unwrap(),
            Some(code.clone())
        );

        store.set(Some(code.clone()));
        assert_eq!(resolve_host_code(None, true, &store).unwrap(), Some(code));
        assert_eq!(resolve_host_code(None, false, &store).unwrap(), None);
    }

    #[test]
    fn synthetic_values_stay_in_range() {
        for tick in [0, 1, 100, u32::MAX] {
            let values = synthetic_values(tick, 6);
            assert_eq!(values.len(), 6);
            assert!(values.iter().all(|v| *v < 1024));
        }
    }
}
