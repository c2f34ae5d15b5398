use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::{
    path::PathBuf,
    sync::mpsc::{Sender, channel},
    time::Duration,
};

use super::pipeline::PipelineMsg;
use super::server::IpcMsg;
use crate::config::DaemonConfigState;
use crate::landmarks::HandDetection;

const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// What a client thread gets to work with. Profile state lives in the main
/// loop and is fetched per request, so long-lived connections see switches.
pub struct ClientCtx {
    pub socket: PathBuf,
    pub tx_req: Sender<IpcMsg>,
    pub pipeline: Sender<PipelineMsg>,
}

pub enum Outcome {
    Continue(Value),
    Close(Value),
}

fn ok(data: Value) -> Value {
    json!({"ok": true, "data": data})
}

fn fail(msg: impl std::fmt::Display) -> Value {
    json!({"ok": false, "error": msg.to_string()})
}

fn ask<M, T>(tx: &Sender<M>, make: impl FnOnce(Sender<T>) -> M) -> Result<T> {
    let (reply, rx) = channel();
    tx.send(make(reply))
        .map_err(|_| anyhow!("daemon is shutting down"))?;
    rx.recv_timeout(REPLY_TIMEOUT)
        .map_err(|e| anyhow!("no reply: {e}"))
}

fn current_cfg(ctx: &ClientCtx) -> Result<DaemonConfigState> {
    ask(&ctx.tx_req, IpcMsg::Snapshot)
}

pub fn dispatch_request(req: &Value, ctx: &ClientCtx) -> Outcome {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    let resp = match op {
        "frame" => {
            let hands = req.get("hands").cloned().unwrap_or_else(|| json!([]));
            let timestamp_ms = req.get("timestamp_ms").and_then(|v| v.as_u64());
            match serde_json::from_value::<Vec<HandDetection>>(hands) {
                Ok(hands) => {
                    let msg = |reply| PipelineMsg::Frame {
                        hands,
                        timestamp_ms,
                        reply,
                    };
                    match ask(&ctx.pipeline, msg) {
                        Ok(p) => ok(json!({ "prediction": p })),
                        Err(e) => fail(e),
                    }
                }
                Err(e) => fail(format!("bad frame: {e}")),
            }
        }
        "status" => match (current_cfg(ctx), ask(&ctx.pipeline, PipelineMsg::Status)) {
            (Ok(cfg), Ok(engine)) => ok(json!({
                "active_profile": cfg.active_name,
                "socket": ctx.socket,
                "engine": engine,
            })),
            (Err(e), _) | (_, Err(e)) => fail(e),
        },
        "pause" => match ctx.pipeline.send(PipelineMsg::Pause) {
            Ok(()) => ok(json!("paused")),
            Err(_) => fail("daemon is shutting down"),
        },
        "resume" => match ctx.pipeline.send(PipelineMsg::Resume) {
            Ok(()) => ok(json!("resumed")),
            Err(_) => fail("daemon is shutting down"),
        },
        "set" => {
            let key = req.get("key").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let value = req.get("value").cloned().unwrap_or(Value::Null);
            match ask(&ctx.pipeline, |reply| PipelineMsg::Set { key, value, reply }) {
                Ok(Ok(cfg)) => ok(json!({ "engine": cfg })),
                Ok(Err(e)) => fail(e),
                Err(e) => fail(e),
            }
        }
        "reload" => match ask(&ctx.tx_req, IpcMsg::Reload) {
            Ok(Ok(name)) => ok(json!({ "active_profile": name })),
            Ok(Err(e)) => fail(e),
            Err(e) => fail(e),
        },
        "use" => {
            let name = req
                .get("profile")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string();
            match ask(&ctx.tx_req, |reply| IpcMsg::UseProfile(name, reply)) {
                Ok(Ok(name)) => ok(json!({ "active_profile": name })),
                Ok(Err(e)) => fail(e),
                Err(e) => fail(e),
            }
        }
        "list" => match current_cfg(ctx) {
            Ok(cfg) => ok(json!({"profiles": cfg.list_profiles(), "active": cfg.active_name})),
            Err(e) => fail(e),
        },
        "doctor" => match current_cfg(ctx) {
            Ok(cfg) => ok(cfg.doctor_report(&ctx.socket)),
            Err(e) => fail(e),
        },
        "shutdown" => {
            let _ = ctx.tx_req.send(IpcMsg::Shutdown);
            return Outcome::Close(ok(json!("shutting down")));
        }
        _ => fail(format!("unknown op: {op}")),
    };
    Outcome::Continue(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigPaths;
    use crate::ipc::pipeline::PipelineThread;
    use crate::landmarks::testkit::detection;
    use std::{sync::mpsc::Receiver, thread};

    struct Harness {
        ctx: ClientCtx,
        pipeline: PipelineThread,
        _dir: tempfile::TempDir,
    }

    /// The main loop's side of the control channel, minus the socket.
    fn serve_control(
        mut cfg: DaemonConfigState,
        rx: Receiver<IpcMsg>,
        pipeline: Sender<PipelineMsg>,
    ) {
        while let Ok(msg) = rx.recv() {
            match msg {
                IpcMsg::Snapshot(reply) => {
                    let _ = reply.send(cfg.clone());
                }
                IpcMsg::UseProfile(name, reply) => {
                    let res = match cfg.set_active(&name) {
                        Ok(()) => {
                            let _ = pipeline.send(PipelineMsg::UpdateProfile(cfg.profile.clone()));
                            Ok(cfg.active_name.clone())
                        }
                        Err(e) => Err(format!("{e:#}")),
                    };
                    let _ = reply.send(res);
                }
                _ => {}
            }
        }
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cfg = DaemonConfigState::load_or_install_in(ConfigPaths::new(dir.path().to_path_buf()))
            .unwrap();
        let (tx_evt, _rx_evt) = channel();
        let pipeline = PipelineThread::start(cfg.profile.clone(), tx_evt).unwrap();
        let (tx_req, rx_req) = channel();
        let control = pipeline.sender();
        thread::spawn(move || serve_control(cfg, rx_req, control));
        let ctx = ClientCtx {
            socket: dir.path().join("signctl.sock"),
            tx_req,
            pipeline: pipeline.sender(),
        };
        Harness {
            ctx,
            pipeline,
            _dir: dir,
        }
    }

    fn call(ctx: &ClientCtx, req: Value) -> Value {
        match dispatch_request(&req, ctx) {
            Outcome::Continue(v) | Outcome::Close(v) => v,
        }
    }

    #[test]
    fn frames_flow_through_to_a_prediction() {
        let h = harness();
        let hand = serde_json::to_value(detection([true, false, false, false, false], 0.9)).unwrap();
        let mut resp = Value::Null;
        for _ in 0..3 {
            resp = call(&h.ctx, json!({"op": "frame", "hands": [hand.clone()]}));
            assert_eq!(resp["ok"], true);
        }
        assert_eq!(resp["data"]["prediction"]["symbol"], "a");
        assert_eq!(resp["data"]["prediction"]["is_stable"], true);

        let st = call(&h.ctx, json!({"op": "status"}));
        assert_eq!(st["data"]["engine"]["last_stable"], "a");
        assert_eq!(st["data"]["active_profile"], "default");
        h.pipeline.shutdown();
    }

    #[test]
    fn open_connection_sees_profile_switch() {
        let h = harness();
        let before = call(&h.ctx, json!({"op": "status"}));
        assert_eq!(before["data"]["active_profile"], "default");

        let used = call(&h.ctx, json!({"op": "use", "profile": "macro"}));
        assert_eq!(used["data"]["active_profile"], "macro");

        let after = call(&h.ctx, json!({"op": "status"}));
        assert_eq!(after["data"]["active_profile"], "macro");
        assert_eq!(after["data"]["engine"]["vocabulary"], "macro");
        assert_eq!(call(&h.ctx, json!({"op": "list"}))["data"]["active"], "macro");
        h.pipeline.shutdown();
    }

    #[test]
    fn malformed_frame_is_an_error_response() {
        let h = harness();
        let resp = call(&h.ctx, json!({"op": "frame", "hands": [{"handedness": "Left"}]}));
        assert_eq!(resp["ok"], false);
        assert!(resp["error"].as_str().unwrap().starts_with("bad frame"));
        h.pipeline.shutdown();
    }

    #[test]
    fn set_updates_engine_config() {
        let h = harness();
        let resp = call(
            &h.ctx,
            json!({"op": "set", "key": "gesture_cooldown_ms", "value": 250}),
        );
        assert_eq!(resp["data"]["engine"]["gesture_cooldown_ms"], 250);
        let bad = call(&h.ctx, json!({"op": "set", "key": "nope", "value": 1}));
        assert_eq!(bad["ok"], false);
        h.pipeline.shutdown();
    }

    #[test]
    fn unknown_op_and_shutdown() {
        let h = harness();
        let resp = call(&h.ctx, json!({"op": "dance"}));
        assert_eq!(resp["error"], "unknown op: dance");
        assert!(matches!(
            dispatch_request(&json!({"op": "shutdown"}), &h.ctx),
            Outcome::Close(_)
        ));
        h.pipeline.shutdown();
    }
}
