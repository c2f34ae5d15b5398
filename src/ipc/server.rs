use anyhow::{Context, Result};
use log::{error, info, warn};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{Sender, channel},
    },
    thread,
    time::Duration,
};

use super::dispatch::{ClientCtx, Outcome, dispatch_request};
use super::pipeline::PipelineThread;
use super::runtime::socket_path;
use crate::config::DaemonConfigState;
use crate::engine::GesturePrediction;

pub enum IpcMsg {
    Reload(Sender<Result<String, String>>),
    UseProfile(String, Sender<Result<String, String>>),
    ProfilesChanged(Vec<PathBuf>),
    Snapshot(Sender<DaemonConfigState>),
    Shutdown,
}

pub enum DaemonEvent {
    Caption(GesturePrediction),
}

pub fn run_daemon() -> Result<()> {
    // socket
    let sock = socket_path()?;
    if sock.exists() {
        let _ = std::fs::remove_file(&sock);
    }
    let listener =
        UnixListener::bind(&sock).with_context(|| format!("failed to bind {}", sock.display()))?;
    info!("daemon: listening on {}", sock.display());

    // state
    let mut state = DaemonState::new()?;
    info!("daemon: active profile '{}'", state.cfg.active_name);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))?;

    // channels
    let (tx_req, rx_req) = channel::<IpcMsg>();
    let (tx_evt, rx_evt) = channel::<DaemonEvent>();

    // engine thread
    let pipeline = PipelineThread::start(state.cfg.profile.clone(), tx_evt)?;

    let _watcher = match watch_profiles(&state.cfg.paths.profiles_dir, tx_req.clone()) {
        Ok(w) => Some(w),
        Err(e) => {
            warn!("profile watcher unavailable, edits need `signctl reload`: {e}");
            None
        }
    };

    // accept loop
    listener.set_nonblocking(true)?;
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                let ctx = ClientCtx {
                    socket: sock.clone(),
                    tx_req: tx_req.clone(),
                    pipeline: pipeline.sender(),
                };
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, ctx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }

        while let Ok(evt) = rx_evt.try_recv() {
            match evt {
                DaemonEvent::Caption(p) => {
                    info!("[caption] {} ({}, {:.2})", p.text, p.symbol, p.confidence)
                }
            }
        }

        let mut reload_needed = false;
        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::Reload(reply) => {
                    let res = state.reload(&pipeline);
                    let _ = reply.send(res.map_err(|e| format!("{e:#}")));
                }
                IpcMsg::UseProfile(name, reply) => {
                    let res = match state.cfg.set_active(&name) {
                        Ok(()) => {
                            pipeline.update_profile(state.cfg.profile.clone());
                            info!("switched active profile to {}", state.cfg.active_name);
                            Ok(state.cfg.active_name.clone())
                        }
                        Err(e) => {
                            error!("use profile failed: {e:#}");
                            Err(format!("{e:#}"))
                        }
                    };
                    let _ = reply.send(res);
                }
                IpcMsg::ProfilesChanged(paths) => {
                    let active = state.cfg.paths.profile_path(&state.cfg.active_name);
                    if paths.iter().any(|p| p == &active) {
                        reload_needed = true;
                    }
                }
                IpcMsg::Snapshot(reply) => {
                    let _ = reply.send(state.cfg.clone());
                }
                IpcMsg::Shutdown => shutdown.store(true, Ordering::Relaxed),
            }
        }
        // editors write in bursts; one reload per tick is enough
        if reload_needed {
            let _ = state.reload(&pipeline);
        }

        thread::sleep(Duration::from_millis(5));
    }

    info!("daemon: shutting down");
    pipeline.shutdown();
    let _ = std::fs::remove_file(&sock);
    Ok(())
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(ev) if ev.kind.is_modify() || ev.kind.is_create() => {
                let _ = tx.send(IpcMsg::ProfilesChanged(ev.paths));
            }
            Ok(_) => {}
            Err(e) => warn!("profile watcher: {e}"),
        }
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// One request per line; a tracker keeps the connection open and streams
/// frames.
fn handle_client(stream: UnixStream, ctx: ClientCtx) -> Result<()> {
    stream.set_nonblocking(false)?;
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(req) => dispatch_request(&req, &ctx),
            Err(e) => Outcome::Continue(
                serde_json::json!({"ok": false, "error": format!("invalid request: {e}")}),
            ),
        };
        match outcome {
            Outcome::Continue(resp) => writeln!(writer, "{resp}")?,
            Outcome::Close(resp) => {
                writeln!(writer, "{resp}")?;
                break;
            }
        }
    }
    Ok(())
}

struct DaemonState {
    cfg: DaemonConfigState,
}

impl DaemonState {
    fn new() -> Result<Self> {
        let cfg = DaemonConfigState::load_or_install_default()?;
        Ok(Self { cfg })
    }

    fn reload(&mut self, pipeline: &PipelineThread) -> Result<String> {
        match self.cfg.reload() {
            Ok(()) => {
                pipeline.update_profile(self.cfg.profile.clone());
                info!("profile '{}' reloaded", self.cfg.active_name);
                Ok(self.cfg.active_name.clone())
            }
            Err(e) => {
                error!("reload failed, keeping last good profile: {e:#}");
                Err(e)
            }
        }
    }
}
