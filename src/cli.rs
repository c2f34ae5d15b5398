use anyhow::{Result, anyhow};
use pico_args::Arguments;
use serde_json::{Value, json};
use std::{env, process::Command, thread, time::Duration};

use crate::config::{DaemonConfigState, Profile};
use crate::engine::SignEngine;
use crate::gestures::GestureSymbol;
use crate::input::{read_frames, timeline};
use crate::ipc;
use crate::replay::{classify_frames, replay};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        return ipc::run_daemon();
    }

    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    // options shared by the offline commands
    let profile: Option<String> = pargs.opt_value_from_str("--profile")?;
    let raw = pargs.contains("--raw");
    let fast = pargs.contains("--fast");

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            match topic {
                Some(t) => print_subcmd_help(&t),
                None => print_help(),
            }
            Ok(())
        }

        Some("start") => {
            let exe = env::current_exe()?;
            let child = Command::new(exe).arg("--daemon").spawn()?;
            println!("signctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some(op @ ("stop" | "status" | "pause" | "resume" | "reload" | "list" | "doctor")) => {
            let op = if op == "stop" { "shutdown" } else { op };
            let r = ipc::client_request(json!({ "op": op }))?;
            print_response(&r);
            Ok(())
        }

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: signctl use <profile_name>"))?;
            let r = ipc::client_request(json!({"op": "use", "profile": name}))?;
            print_response(&r);
            Ok(())
        }

        Some("set") => {
            let usage = || anyhow!("usage: signctl set <key> <value>");
            let key: String = pargs.free_from_str().map_err(|_| usage())?;
            let value: String = pargs.free_from_str().map_err(|_| usage())?;
            // numbers go over as numbers, anything else as a string
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            let r = ipc::client_request(json!({"op": "set", "key": key, "value": value}))?;
            print_response(&r);
            Ok(())
        }

        Some("send") => {
            let path: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: signctl send <frames.jsonl|-> [--fast]"))?;
            send_frames(&path, fast)
        }

        Some("replay") => {
            let path: String = pargs.free_from_str().map_err(|_| {
                anyhow!("usage: signctl replay <frames.jsonl|-> [--profile <name>] [--raw]")
            })?;
            replay_frames(&path, profile.as_deref(), raw)
        }

        Some("symbols") => {
            let profile = load_profile(profile.as_deref())?;
            print_symbols(&profile);
            Ok(())
        }

        Some("rules") => {
            let profile = load_profile(profile.as_deref())?;
            print_rules(&profile);
            Ok(())
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

/// Streams a recording to the running daemon, keeping the recorded pace.
/// Frames carry their recorded time so the daemon's cooldown matches replay.
fn send_frames(path: &str, fast: bool) -> Result<()> {
    let frames = read_frames(path)?;
    let times = timeline(&frames);
    let mut client = ipc::Client::connect()?;
    let mut prev: Option<u64> = None;
    for (i, (frame, t)) in frames.iter().zip(&times).enumerate() {
        if let (false, Some(p)) = (fast, prev) {
            thread::sleep(Duration::from_millis(t.saturating_sub(p)));
        }
        prev = Some(*t);
        let r = client.request(&json!({"op": "frame", "hands": frame.hands, "timestamp_ms": t}))?;
        if r["ok"] != true {
            return Err(anyhow!(
                "frame {}: {}",
                i + 1,
                r["error"].as_str().unwrap_or("daemon refused the frame")
            ));
        }
        let p = &r["data"]["prediction"];
        if !p.is_null() {
            println!(
                "frame {:>5}  {:<8} {:.2}  {}",
                i + 1,
                p["symbol"].as_str().unwrap_or(""),
                p["confidence"].as_f64().unwrap_or(0.0),
                p["text"].as_str().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn replay_frames(path: &str, profile: Option<&str>, raw: bool) -> Result<()> {
    let profile = load_profile(profile)?;
    let frames = read_frames(path)?;
    if raw {
        let classifier = profile.build_classifier();
        for (i, symbols) in classify_frames(&classifier, &frames).iter().enumerate() {
            let names: Vec<&str> = symbols.iter().map(|s| s.as_str()).collect();
            println!("frame {:>5}  {}", i + 1, names.join(" "));
        }
        return Ok(());
    }
    let mut engine = offline_engine(&profile);
    let emissions = replay(&mut engine, &frames);
    for e in &emissions {
        println!(
            "frame {:>5} @{:>7}ms  {:<8} {:.2}  {}",
            e.frame,
            e.timestamp_ms,
            e.prediction.symbol.as_str(),
            e.prediction.confidence,
            e.prediction.text
        );
    }
    println!("{} frames, {} emitted", frames.len(), emissions.len());
    Ok(())
}

fn load_profile(name: Option<&str>) -> Result<Profile> {
    let cfg = DaemonConfigState::load_or_install_default()?;
    match name {
        Some(name) => cfg.load_named(name),
        None => Ok(cfg.profile),
    }
}

fn offline_engine(profile: &Profile) -> SignEngine {
    let mut engine = SignEngine::new(profile.build_classifier(), profile.engine, |_| {});
    engine.set_captions(profile.captions.clone());
    engine
}

fn print_symbols(profile: &Profile) {
    let engine = offline_engine(profile);
    let produced = engine.classifier().symbols();
    for symbol in &produced {
        let kind = if symbol.is_macro() { "macro" } else { "" };
        println!("{:<8} {:<6} {}", symbol.as_str(), kind, engine.caption(*symbol));
    }
    let missing: Vec<&str> = GestureSymbol::ALL
        .iter()
        .filter(|s| !produced.contains(s))
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        println!("not produced by this profile: {}", missing.join(" "));
    }
}

fn print_rules(profile: &Profile) {
    let classifier = profile.build_classifier();
    let shadowed = classifier.shadowed();
    println!(
        "{:?} vocabulary, {:?}",
        classifier.vocabulary(),
        classifier.strategy()
    );
    for (i, rule) in classifier.rules().iter().enumerate() {
        let cues: Vec<String> = rule.cues.iter().map(|c| format!("{c:?}")).collect();
        let mut line = format!(
            "{:>3}  {:<8} {:<6} {}",
            i + 1,
            rule.symbol.as_str(),
            rule.fingers.to_string(),
            cues.join("+")
        );
        if let Some(s) = shadowed.iter().find(|s| s.rule == *rule) {
            line.push_str(&format!("  (shadowed by {})", s.by));
        }
        println!("{}", line.trim_end());
    }
}

fn print_help() {
    println!(
        r#"signctl - hand-sign recognition daemon

USAGE:
  signctl help [command]                  Show general or command-specific help
  signctl start                           Start the daemon
  signctl stop                            Stop the daemon
  signctl status                          Show engine state and active profile
  signctl pause                           Ignore frames until resumed
  signctl resume                          Accept frames again
  signctl set <key> <value>               Change an engine setting live
  signctl reload                          Reload active profile
  signctl use <name>                      Switch active profile
  signctl list                            List profiles
  signctl doctor                          Diagnose config and socket
  signctl send <frames.jsonl|-> [--fast]  Stream recorded frames to the daemon
  signctl replay <frames.jsonl|->         Run recorded frames offline
  signctl symbols [--profile <name>]      List symbols and their captions
  signctl rules [--profile <name>]        Print the rule table

TIPS:
  - Profiles: ~/.config/signctl/profiles
  - Active profile pointer: ~/.config/signctl/active
  - Log level: SIGNCTL_LOG=debug (falls back to RUST_LOG)
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "start" => println!("usage: signctl start\nStarts the background daemon."),
        "stop" => println!("usage: signctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: signctl status\nShows running flag, settings, history and last emitted symbol."
        ),
        "pause" => println!("usage: signctl pause\nStops the engine; its state is cleared."),
        "resume" => println!("usage: signctl resume\nStarts the engine again from a clean state."),
        "set" => println!(
            "usage: signctl set <key> <value>\nKeys: confidence_threshold, stability_threshold, gesture_cooldown_ms."
        ),
        "reload" => println!(
            "usage: signctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: signctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: signctl list\nLists available profiles and the active one."),
        "doctor" => println!(
            "usage: signctl doctor\nReports directories, profile problems and the socket."
        ),
        "send" => println!(
            "usage: signctl send <frames.jsonl|-> [--fast]\nSends one frame per line to the daemon and prints emitted predictions.\n--fast ignores recorded timestamps."
        ),
        "replay" => println!(
            "usage: signctl replay <frames.jsonl|-> [--profile <name>] [--raw]\nRuns frames through a local engine on the recording's clock.\n--raw prints the classifier output for every hand instead."
        ),
        "symbols" => println!(
            "usage: signctl symbols [--profile <name>]\nLists every symbol the profile's classifier can produce."
        ),
        "rules" => println!(
            "usage: signctl rules [--profile <name>]\nPrints the ordered rule table and which rules can never fire."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
