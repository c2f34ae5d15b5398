//! The engine thread. Everything that touches the engine arrives here as a
//! message, so frames from any number of clients are handled one at a time.

use anyhow::{Result, anyhow};
use log::{debug, error, info};
use std::{
    sync::mpsc::{Receiver, Sender},
    thread,
};

use super::server::DaemonEvent;
use crate::config::Profile;
use crate::engine::{EngineConfig, EngineStatus, GesturePrediction, SignEngine};
use crate::landmarks::HandDetection;

pub enum PipelineMsg {
    Frame {
        hands: Vec<HandDetection>,
        /// Recorded time; the engine's own clock when absent.
        timestamp_ms: Option<u64>,
        reply: Sender<Option<GesturePrediction>>,
    },
    Status(Sender<EngineStatus>),
    Pause,
    Resume,
    Set {
        key: String,
        value: serde_json::Value,
        reply: Sender<Result<EngineConfig, String>>,
    },
    UpdateProfile(Profile),
    Shutdown,
}

pub fn build_engine(profile: &Profile, tx_evt: Sender<DaemonEvent>) -> SignEngine {
    let mut engine = SignEngine::new(profile.build_classifier(), profile.engine, move |p| {
        let _ = tx_evt.send(DaemonEvent::Caption(p.clone()));
    });
    engine.set_captions(profile.captions.clone());
    engine
}

/// Type-checks the value only; ranges are the caller's business.
pub fn apply_setting(cfg: &mut EngineConfig, key: &str, value: &serde_json::Value) -> Result<()> {
    match key {
        "confidence_threshold" => {
            let v = value
                .as_f64()
                .ok_or_else(|| anyhow!("confidence_threshold expects a number"))?;
            cfg.confidence_threshold = v as f32;
        }
        "stability_threshold" => {
            let v = value
                .as_u64()
                .ok_or_else(|| anyhow!("stability_threshold expects a non-negative integer"))?;
            cfg.stability_threshold = v as usize;
        }
        "gesture_cooldown_ms" => {
            cfg.gesture_cooldown_ms = value
                .as_u64()
                .ok_or_else(|| anyhow!("gesture_cooldown_ms expects a non-negative integer"))?;
        }
        other => return Err(anyhow!("unknown setting: {other}")),
    }
    Ok(())
}

pub fn run_pipeline(profile: Profile, rx: Receiver<PipelineMsg>, tx_evt: Sender<DaemonEvent>) {
    let mut engine = build_engine(&profile, tx_evt);
    info!(
        "pipeline: {:?} classifier, {:?}",
        engine.classifier().vocabulary(),
        engine.config()
    );

    while let Ok(msg) = rx.recv() {
        match msg {
            PipelineMsg::Frame {
                hands,
                timestamp_ms,
                reply,
            } => {
                let p = match timestamp_ms {
                    Some(t) => engine.on_frame_at(&hands, t),
                    None => engine.on_frame(&hands),
                };
                let _ = reply.send(p);
            }
            PipelineMsg::Status(reply) => {
                let _ = reply.send(engine.status());
            }
            PipelineMsg::Pause => {
                if engine.is_running() {
                    engine.stop();
                    info!("pipeline: detection paused");
                }
            }
            PipelineMsg::Resume => {
                if !engine.is_running() {
                    engine.start();
                    info!("pipeline: detection resumed");
                }
            }
            PipelineMsg::Set { key, value, reply } => {
                let mut cfg = engine.config();
                let res = match apply_setting(&mut cfg, &key, &value) {
                    Ok(()) => {
                        engine.set_config(cfg);
                        debug!("pipeline: {key} = {value}");
                        Ok(cfg)
                    }
                    Err(e) => Err(e.to_string()),
                };
                let _ = reply.send(res);
            }
            PipelineMsg::UpdateProfile(p) => {
                engine.set_classifier(p.build_classifier());
                engine.set_config(p.engine);
                engine.set_captions(p.captions);
            }
            PipelineMsg::Shutdown => break,
        }
    }
    debug!("pipeline: exiting");
}

pub struct PipelineThread {
    tx: Sender<PipelineMsg>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PipelineThread {
    pub fn start(profile: Profile, tx_evt: Sender<DaemonEvent>) -> Result<Self> {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = thread::Builder::new()
            .name("signctl-engine".into())
            .spawn(move || run_pipeline(profile, rx, tx_evt))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> Sender<PipelineMsg> {
        self.tx.clone()
    }

    pub fn update_profile(&self, profile: Profile) {
        if self.tx.send(PipelineMsg::UpdateProfile(profile)).is_err() {
            error!("pipeline is gone; profile update dropped");
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.tx.send(PipelineMsg::Shutdown);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                error!("engine thread panicked");
            }
        }
    }
}
