use anyhow::{bail, Context, Result};
use ini::Ini;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const PLACEHOLDER_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const PLACEHOLDER_SPREADSHEET_ID: &str = "SPREADSHEET_ID";
pub const PLACEHOLDER_SHEET_ID: &str = "SHEET_ID";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub sheets: SheetsConfig,
    pub auth: Option<AuthConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SheetsConfig {
    pub scope: String,
    pub spreadsheet_id: String,
    pub sheet_id: String,
}

/// Where the OAuth client secrets and the persisted session live.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("token.json")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig {
                token: PLACEHOLDER_TOKEN.to_string(),
            },
            sheets: SheetsConfig {
                scope: DEFAULT_SCOPE.to_string(),
                spreadsheet_id: PLACEHOLDER_SPREADSHEET_ID.to_string(),
                sheet_id: PLACEHOLDER_SHEET_ID.to_string(),
            },
            auth: None,
        }
    }
}

fn required(ini: &Ini, section: &str, key: &str) -> Result<String> {
    ini.section(Some(section))
        .with_context(|| format!("Config is missing the [{}] section", section))?
        .get(key)
        .map(|value| value.trim().to_string())
        .with_context(|| format!("Config is missing {}.{}", section, key))
}

impl Config {
    /// OAuth client secrets file (from [auth] credentials_path, default `credentials.json`).
    pub fn credentials_path(&self) -> PathBuf {
        self.auth
            .as_ref()
            .map(|a| a.credentials_path.clone())
            .unwrap_or_else(default_credentials_path)
    }

    /// Persisted session file (from [auth] token_path, default `token.json`).
    pub fn token_path(&self) -> PathBuf {
        self.auth
            .as_ref()
            .map(|a| a.token_path.clone())
            .unwrap_or_else(default_token_path)
    }

    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let auth = ini.section(Some("auth")).map(|section| AuthConfig {
            credentials_path: section
                .get("credentials_path")
                .map(|p| PathBuf::from(p.trim()))
                .unwrap_or_else(default_credentials_path),
            token_path: section
                .get("token_path")
                .map(|p| PathBuf::from(p.trim()))
                .unwrap_or_else(default_token_path),
        });

        Ok(Self {
            telegram: TelegramConfig {
                token: required(ini, "telegram", "token")?,
            },
            sheets: SheetsConfig {
                scope: required(ini, "sheets", "scope")?,
                spreadsheet_id: required(ini, "sheets", "spreadsheet_id")?,
                sheet_id: required(ini, "sheets", "sheet_id")?,
            },
            auth,
        })
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("telegram"))
            .set("token", self.telegram.token.as_str());
        ini.with_section(Some("sheets"))
            .set("scope", self.sheets.scope.as_str())
            .set("spreadsheet_id", self.sheets.spreadsheet_id.as_str())
            .set("sheet_id", self.sheets.sheet_id.as_str());
        if let Some(auth) = &self.auth {
            ini.with_section(Some("auth"))
                .set("credentials_path", auth.credentials_path.to_string_lossy())
                .set("token_path", auth.token_path.to_string_lossy());
        }
        ini
    }

    pub fn load(path: &Path) -> Result<Self> {
        let ini = Ini::load_from_file(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_ini(&ini)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.to_ini()
            .write_to_file(path)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    /// Loads the config, writing a placeholder one first if the file is missing.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        let config = Self::default();
        config.save(path)?;
        warn!(
            "Config file {} not found, wrote defaults. Fill in the placeholders before running the bot.",
            path.display()
        );
        Ok(config)
    }

    /// True while any required value still holds its generated placeholder.
    pub fn has_placeholders(&self) -> bool {
        self.telegram.token == PLACEHOLDER_TOKEN
            || self.sheets.spreadsheet_id == PLACEHOLDER_SPREADSHEET_ID
            || self.sheets.sheet_id == PLACEHOLDER_SHEET_ID
    }

    /// Numeric sheet id as the Sheets API expects it.
    pub fn sheet_id(&self) -> Result<i64> {
        self.sheets
            .sheet_id
            .trim()
            .parse()
            .with_context(|| format!("sheets.sheet_id is not a number: {:?}", self.sheets.sheet_id))
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("telegram.token", &self.telegram.token),
            ("sheets.scope", &self.sheets.scope),
            ("sheets.spreadsheet_id", &self.sheets.spreadsheet_id),
            ("sheets.sheet_id", &self.sheets.sheet_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                bail!("Config value {} must not be empty", key);
            }
        }
        if self.has_placeholders() {
            bail!("Config still contains placeholder values");
        }
        self.sheet_id()?;
        Ok(())
    }
}
