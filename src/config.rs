//! Configuration loader and validator for the time/expense portal.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub supabase: Supabase,
    pub monday: Monday,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub public_dir: String,
    pub upload_dir: String,
    /// Controls the `Secure` flag on the session cookie.
    #[serde(default)]
    pub production: bool,
}

/// Supabase project used to validate session tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supabase {
    pub url: String,
    pub anon_key: String,
}

/// monday.com API settings and board mappings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Monday {
    pub token: String,
    pub boards: Boards,
}

/// Board mapping configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Boards {
    pub hours: HoursBoard,
    pub expenses: ExpenseBoard,
    pub employees: EmployeeBoard,
}

/// Time-tracking board mapping. Column values are display titles; the
/// schema resolver maps them to column ids at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HoursBoard {
    pub id: String,
    pub columns: HoursColumns,
}

/// Column titles on the time-tracking board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HoursColumns {
    pub start: String,
    pub end: String,
    pub pause: String,
    pub project: String,
    pub employee: String,
}

/// Expense board mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpenseBoard {
    pub id: String,
    pub columns: ExpenseColumns,
}

/// Column titles on the expense board. `amount` has changed its display
/// title before, which is why it lives here and not in code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpenseColumns {
    pub description: String,
    pub amount: String,
    pub project: String,
    pub employee: String,
    pub receipt: String,
}

/// Employee board mapping. The board id itself is derived from the hours
/// board's employee relation column; only the relation column that links
/// employees to their projects is configured.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmployeeBoard {
    pub participation_column: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.upload_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.upload_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.upload_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.public_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.public_dir must be non-empty"));
    }
    if cfg.app.upload_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.upload_dir must be non-empty"));
    }

    if cfg.supabase.url.trim().is_empty() {
        return Err(ConfigError::Invalid("supabase.url must be non-empty"));
    }
    if cfg.supabase.anon_key.trim().is_empty() {
        return Err(ConfigError::Invalid("supabase.anon_key must be non-empty"));
    }

    if cfg.monday.token.trim().is_empty() {
        return Err(ConfigError::Invalid("monday.token must be non-empty"));
    }

    if cfg.monday.boards.hours.id.trim().is_empty() {
        return Err(ConfigError::Invalid("monday.boards.hours.id must be non-empty"));
    }
    let hc = &cfg.monday.boards.hours.columns;
    if hc.start.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.hours.columns.start must be non-empty",
        ));
    }
    if hc.end.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.hours.columns.end must be non-empty",
        ));
    }
    if hc.pause.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.hours.columns.pause must be non-empty",
        ));
    }
    if hc.project.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.hours.columns.project must be non-empty",
        ));
    }
    if hc.employee.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.hours.columns.employee must be non-empty",
        ));
    }

    if cfg.monday.boards.expenses.id.trim().is_empty() {
        return Err(ConfigError::Invalid("monday.boards.expenses.id must be non-empty"));
    }
    let ec = &cfg.monday.boards.expenses.columns;
    if ec.description.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.expenses.columns.description must be non-empty",
        ));
    }
    if ec.amount.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.expenses.columns.amount must be non-empty",
        ));
    }
    if ec.project.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.expenses.columns.project must be non-empty",
        ));
    }
    if ec.employee.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.expenses.columns.employee must be non-empty",
        ));
    }
    if ec.receipt.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.expenses.columns.receipt must be non-empty",
        ));
    }

    if cfg.monday.boards.employees.participation_column.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "monday.boards.employees.participation_column must be non-empty",
        ));
    }

    Ok(())
}

/// Example configuration document.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "0.0.0.0:3000"
  public_dir: "./public"
  upload_dir: "./uploads"
  production: false

supabase:
  url: "https://YOUR_PROJECT.supabase.co"
  anon_key: "YOUR_SUPABASE_ANON_KEY"

monday:
  token: "YOUR_MONDAY_API_TOKEN"

  boards:
    hours:
      id: "MONDAY_HOURS_BOARD_ID"
      columns:
        start: "Anfang Datum"
        end: "Ende Datum"
        pause: "Pause in Mins"
        project: "Projekt"
        employee: "Mitarbeiter"
    expenses:
      id: "MONDAY_EXPENSES_BOARD_ID"
      columns:
        description: "Beschreibung"
        amount: "Summe von Ausgabe [€]"
        project: "Projekt"
        employee: "Mitarbeiter"
        receipt: "Beleg"
    employees:
      participation_column: "Beteiligung"
"#
}
