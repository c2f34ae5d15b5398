use anyhow::{Context, Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::{Deserialize, Deserializer};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::classifier::{Classifier, CueThresholds, Vocabulary};
use crate::engine::EngineConfig;
use crate::gestures::GestureSymbol;
use crate::history::HISTORY_CAPACITY;
use crate::predicates::ExtensionStrategy;

#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierSettings {
    pub vocabulary: Vocabulary,
    /// Falls back to the vocabulary's own strategy.
    #[serde(default)]
    pub extension: Option<ExtensionStrategy>,
    #[serde(default)]
    pub thresholds: CueThresholds,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            vocabulary: Vocabulary::Alphabet,
            extension: None,
            thresholds: CueThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub meta: Meta,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub classifier: ClassifierSettings,

    // group tables are allowed: [captions.letters] a = "..." keys on "a"
    #[serde(default, deserialize_with = "deserialize_captions")]
    pub captions: HashMap<GestureSymbol, String>,
}

impl Profile {
    pub fn parse(text: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(text)?;
        validate_profile(&profile)?;
        Ok(profile)
    }

    pub fn build_classifier(&self) -> Classifier {
        let c = &self.classifier;
        Classifier::new(
            c.vocabulary,
            c.extension.unwrap_or_else(|| c.vocabulary.default_strategy()),
            c.thresholds,
        )
    }
}

// --------- captions deserializer (tolerant of group tables) ----------
fn deserialize_captions<'de, D>(
    de: D,
) -> std::result::Result<HashMap<GestureSymbol, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val = toml::Value::deserialize(de)?;
    let table = match val {
        toml::Value::Table(t) => t,
        other => {
            return Err(serde::de::Error::custom(format!(
                "captions must be a table, got {}",
                other.type_str()
            )));
        }
    };

    let mut out = HashMap::new();
    collect_captions("", &table, &mut out).map_err(serde::de::Error::custom)?;
    Ok(out)
}

fn collect_captions(
    prefix: &str,
    table: &toml::value::Table,
    out: &mut HashMap<GestureSymbol, String>,
) -> std::result::Result<(), String> {
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        match v {
            toml::Value::String(s) => {
                let symbol: GestureSymbol = k
                    .parse()
                    .map_err(|e| format!("caption '{path}': {e}"))?;
                if out.insert(symbol, s.clone()).is_some() {
                    return Err(format!("caption for '{symbol}' given twice (at '{path}')"));
                }
            }
            toml::Value::Table(sub) => {
                collect_captions(&path, sub, out)?;
            }
            other => {
                return Err(format!(
                    "caption '{}' must be a string, got {}",
                    path,
                    other.type_str()
                ));
            }
        }
    }
    Ok(())
}
// ------------------------------------------------------------

/// Where profiles live: `<root>/profiles/*.toml` plus an `active` pointer.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

impl ConfigPaths {
    pub fn new(config_dir: PathBuf) -> Self {
        Self {
            profiles_dir: config_dir.join("profiles"),
            active_ptr: config_dir.join("active"),
            config_dir,
        }
    }

    pub fn from_home() -> Result<Self> {
        let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot locate home directory"))?;
        Ok(Self::new(dirs.home_dir().join(".config").join("signctl")))
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }
}

const BUNDLED_PROFILES: &[(&str, &str)] = &[
    ("default", include_str!("../profiles/default.toml")),
    ("macro", include_str!("../profiles/macro.toml")),
];

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub paths: ConfigPaths,
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_or_install_in(ConfigPaths::from_home()?)
    }

    pub fn load_or_install_in(paths: ConfigPaths) -> Result<Self> {
        fs::create_dir_all(&paths.profiles_dir)
            .with_context(|| format!("failed to create {}", paths.profiles_dir.display()))?;

        for (name, text) in BUNDLED_PROFILES {
            let p = paths.profile_path(name);
            if !p.exists() {
                fs::write(&p, text)?;
                info!("installed {name} profile at {}", p.display());
            }
        }

        if !paths.active_ptr.exists() {
            fs::write(&paths.active_ptr, b"default")?;
        }

        let mut active_name = fs::read_to_string(&paths.active_ptr)?.trim().to_string();
        if active_name.is_empty() {
            warn!("active profile pointer is empty; using 'default'");
            active_name = "default".to_string();
        }
        let profile = load_profile(&paths, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            paths,
        })
    }

    /// Keeps the last good profile when the file on disk is broken.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.paths, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        check_profile_name(name)?;
        let p = self.paths.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.paths, name)?;
        fs::write(&self.paths.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn load_named(&self, name: &str) -> Result<Profile> {
        load_profile(&self.paths, name)
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.paths.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self, socket: &Path) -> serde_json::Value {
        let broken: Vec<_> = self
            .list_profiles()
            .into_iter()
            .filter_map(|name| {
                load_profile(&self.paths, &name)
                    .err()
                    .map(|e| serde_json::json!({"profile": name, "error": format!("{e:#}")}))
            })
            .collect();
        serde_json::json!({
            "user": whoami::username(),
            "config_dir": self.paths.config_dir,
            "profiles_dir": self.paths.profiles_dir,
            "active_profile": self.active_name,
            "profile_name": self.profile.meta.name,
            "profile_description": self.profile.meta.description,
            "vocabulary": self.profile.classifier.vocabulary,
            "broken_profiles": broken,
            "socket": socket,
            "socket_present": socket.exists(),
            "log_filter": std::env::var(crate::logging::LOG_ENV).ok(),
        })
    }
}

/// Profile names are file stems inside `profiles/`, never paths.
fn check_profile_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
        return Err(anyhow!("invalid profile name '{name}'"));
    }
    Ok(())
}

fn load_profile(paths: &ConfigPaths, name: &str) -> Result<Profile> {
    check_profile_name(name)?;
    let path = paths.profile_path(name);
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to parse {}: {e:#}", path.display()))
}

fn validate_profile(p: &Profile) -> Result<()> {
    let e = &p.engine;
    if !(0.0..=1.0).contains(&e.confidence_threshold) {
        return Err(anyhow!("engine.confidence_threshold must be in [0,1]"));
    }
    if e.stability_threshold == 0 {
        return Err(anyhow!("engine.stability_threshold must be at least 1"));
    }
    if e.stability_threshold > HISTORY_CAPACITY {
        return Err(anyhow!(
            "engine.stability_threshold {} exceeds the history size {HISTORY_CAPACITY} and could never be met",
            e.stability_threshold
        ));
    }

    let t = &p.classifier.thresholds;
    for (key, v) in [
        ("touch", t.touch),
        ("ring_min", t.ring_min),
        ("ring_max", t.ring_max),
        ("cluster_gap", t.cluster_gap),
        ("raised_height", t.raised_height),
    ] {
        if !(v > 0.0 && v < 1.0) {
            return Err(anyhow!(
                "classifier.thresholds.{key} must be in (0,1) normalized units"
            ));
        }
    }
    if t.ring_min >= t.ring_max {
        return Err(anyhow!("classifier.thresholds.ring_min must be below ring_max"));
    }
    if let Some(ExtensionStrategy::WristRatio { ratio }) = p.classifier.extension {
        if ratio <= 0.0 {
            return Err(anyhow!("classifier.extension.ratio must be positive"));
        }
    }

    for (symbol, text) in &p.captions {
        if text.trim().is_empty() && !symbol.is_idle() {
            return Err(anyhow!("caption for '{symbol}' is empty"));
        }
    }
    Ok(())
}
