use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub explorer: ExplorerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    /// Extra SQL script applied after the built-in migrations.
    #[serde(default)]
    pub init_sql: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    #[serde(default = "default_depth")]
    pub default_depth: i32,
    #[serde(default)]
    pub show_hidden: bool,
}

fn default_depth() -> i32 {
    1
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            show_hidden: false,
        }
    }
}

/// `PROJECT_ROOT` when set, otherwise the working directory.
pub fn project_root() -> PathBuf {
    if let Some(root) = std::env::var_os("PROJECT_ROOT") {
        return PathBuf::from(root);
    }
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// Layers, later wins: defaults, `config/default`, `config/<APP_ENV>`, the
/// explicit file, `FILEMANAGER__*` variables, then `DB_PATH` / `DB_INIT_SQL` /
/// `SERVER_PORT`. A `.env` in the project root is read first.
pub fn load(path: Option<&str>) -> anyhow::Result<AppConfig> {
    let root = project_root();
    let _ = dotenv::from_path(root.join(".env"));
    let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

    let mut settings = config::Config::builder()
        .set_default("database.path", "database/filemanager.db")?
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .add_source(config::File::from(root.join("config/default")).required(false))
        .add_source(config::File::from(root.join(format!("config/{env}"))).required(false));
    if let Some(p) = path {
        settings = settings.add_source(config::File::with_name(p));
    }
    settings = settings
        .add_source(
            config::Environment::with_prefix("FILEMANAGER")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("database.path", std::env::var("DB_PATH").ok())?
        .set_override_option("database.init_sql", std::env::var("DB_INIT_SQL").ok())?
        .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?;

    let cfg = settings.build().context("build configuration")?;
    let mut app: AppConfig = cfg.try_deserialize().context("parse configuration")?;
    app.resolve_paths(&root);
    Ok(app)
}

impl AppConfig {
    /// Anchors relative file locations at `root`; `sqlite:` URLs are left alone.
    pub fn resolve_paths(&mut self, root: &Path) {
        if !self.database.path.starts_with("sqlite:") {
            self.database.path = anchor(root, &self.database.path);
        }
        if let Some(script) = self.database.init_sql.as_mut() {
            *script = anchor(root, script);
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn anchor(root: &Path, path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        path.to_string()
    } else {
        root.join(p).to_string_lossy().into_owned()
    }
}
