use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::{self, Store};

pub const LOGIN_SERVER_PUG: &str = "ta.dodgesdomain.com";
pub const LOGIN_SERVER_COMMUNITY: &str = "ta.kfk4ever.com:9080";

const APP_DIR_NAME: &str = "tamods-launcher";

/// Where the launcher keeps its own files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherPaths {
    data_dir: PathBuf,
}

impl LauncherPaths {
    /// `<local data dir>/tamods-launcher`.
    pub fn resolve() -> Result<Self> {
        let base = dirs::data_local_dir().ok_or(Error::MissingDir("local data"))?;
        Ok(Self::at(base.join(APP_DIR_NAME)))
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn completed_file(&self) -> PathBuf {
        self.data_dir.join("completed.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoginServer {
    #[default]
    Community,
    #[serde(rename = "PUG")]
    Pug,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LaunchMethod {
    Steam,
    #[default]
    #[serde(rename = "Non-Steam")]
    NonSteam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DllChannel {
    #[default]
    Release,
    Beta,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

/// User preferences, stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LauncherConfig {
    pub game_path: String,
    pub login_server: LoginServer,
    #[serde(rename = "customServerIP")]
    pub custom_server_ip: String,
    pub launch_method: LaunchMethod,
    #[serde(rename = "dllVersion")]
    pub dll_channel: DllChannel,
    #[serde(rename = "customDLLPath")]
    pub custom_dll_path: String,
    pub launch_args: String,
    pub dpi: u32,
    pub units: Units,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            game_path: String::new(),
            login_server: LoginServer::Community,
            custom_server_ip: String::new(),
            launch_method: LaunchMethod::NonSteam,
            dll_channel: DllChannel::Release,
            custom_dll_path: String::new(),
            launch_args: String::new(),
            dpi: 800,
            units: Units::Metric,
        }
    }
}

impl LauncherConfig {
    /// Host (and port, where needed) passed to the game as `-hostx`.
    pub fn login_server_address(&self) -> &str {
        match self.login_server {
            LoginServer::Pug => LOGIN_SERVER_PUG,
            LoginServer::Community => LOGIN_SERVER_COMMUNITY,
            LoginServer::Custom => self.custom_server_ip.trim(),
        }
    }

    /// Package that carries the DLL for the selected channel.
    pub fn dll_package_id(&self) -> &'static str {
        match self.dll_channel {
            DllChannel::Release => "tamods-dll",
            DllChannel::Beta => "tamods-dll-beta",
            DllChannel::Edge => "tamods-dll-edge",
        }
    }

    pub fn has_game_path(&self) -> bool {
        !self.game_path.trim().is_empty()
    }
}

/// Current config plus the store it is written back to on every change.
pub struct ConfigManager {
    config: LauncherConfig,
    store: Box<dyn Store<LauncherConfig>>,
}

impl ConfigManager {
    pub fn load(store: Box<dyn Store<LauncherConfig>>) -> Self {
        let config = store::load_or_default(&*store, "launcher config");
        Self { config, store }
    }

    pub fn get(&self) -> &LauncherConfig {
        &self.config
    }

    /// Apply a change and save it. The in-memory value keeps the change even if
    /// the save fails.
    pub fn update(&mut self, f: impl FnOnce(&mut LauncherConfig)) -> Result<()> {
        f(&mut self.config);
        self.save()
    }

    pub fn replace(&mut self, config: LauncherConfig) -> Result<()> {
        self.config = config;
        self.save()
    }

    pub fn reload(&mut self) {
        self.config = store::load_or_default(&*self.store, "launcher config");
    }

    fn save(&self) -> Result<()> {
        self.store.save(&self.config).inspect_err(|e| {
            log::error!("failed to save launcher config: {e}");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    #[test]
    fn defaults_match_first_run() {
        let cfg = LauncherConfig::default();
        assert_eq!(cfg.dpi, 800);
        assert_eq!(cfg.login_server_address(), LOGIN_SERVER_COMMUNITY);
        assert_eq!(cfg.dll_package_id(), "tamods-dll");
        assert!(!cfg.has_game_path());
    }

    #[test]
    fn wire_names() {
        let json = serde_json::to_value(LauncherConfig::default()).unwrap();
        assert_eq!(json["launchMethod"], "Non-Steam");
        assert_eq!(json["dllVersion"], "Release");
        assert!(json.get("customServerIP").is_some());
        assert!(json.get("customDLLPath").is_some());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: LauncherConfig =
            serde_json::from_str(r#"{ "gamePath": "C:/Games/TribesAscend.exe", "loginServer": "PUG" }"#)
                .unwrap();
        assert_eq!(cfg.login_server, LoginServer::Pug);
        assert_eq!(cfg.login_server_address(), LOGIN_SERVER_PUG);
        assert_eq!(cfg.dpi, 800);
    }

    #[test]
    fn custom_server_uses_ip() {
        let cfg = LauncherConfig {
            login_server: LoginServer::Custom,
            custom_server_ip: " 10.0.0.5:9000 ".into(),
            ..Default::default()
        };
        assert_eq!(cfg.login_server_address(), "10.0.0.5:9000");
    }

    #[test]
    fn update_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = LauncherPaths::at(dir.path());
        let mut mgr = ConfigManager::load(Box::new(JsonFileStore::<LauncherConfig>::new(paths.config_file())));
        assert_eq!(mgr.get(), &LauncherConfig::default());

        mgr.update(|c| {
            c.dll_channel = DllChannel::Edge;
            c.dpi = 1600;
        })
        .unwrap();

        let reloaded = ConfigManager::load(Box::new(JsonFileStore::<LauncherConfig>::new(paths.config_file())));
        assert_eq!(reloaded.get().dll_package_id(), "tamods-dll-edge");
        assert_eq!(reloaded.get().dpi, 1600);
    }

    #[test]
    fn failed_save_keeps_change_in_memory() {
        let store: MemoryStore<LauncherConfig> = MemoryStore::new();
        store.set_fail_saves(true);
        let mut mgr = ConfigManager::load(Box::new(store.clone()));
        assert!(mgr.update(|c| c.units = Units::Imperial).is_err());
        assert_eq!(mgr.get().units, Units::Imperial);

        mgr.reload();
        assert_eq!(mgr.get().units, Units::Metric);
    }
}
