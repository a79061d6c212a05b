use crate::core::charset::HeaderCharsetResolver;
use crate::domain::model::FetchMode;
use crate::utils::error::{RefreshError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Offset the hourly jobs start with: 60 + (42 % 60) minutes.
pub const DEFAULT_HOURLY_START_OFFSET_MINUTES: i64 = 102;
/// Below the hourly tick so each tick sees the previous run as stale.
pub const DEFAULT_INTERVAL_SECONDS: u64 = 3000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_seconds: Option<u64>,
    pub connect_timeout_seconds: Option<u64>,
    pub user_agent: Option<String>,
    #[serde(default = "default_charset")]
    pub default_charset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_start_offset")]
    pub hourly_start_offset_minutes: i64,
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub url: String,
    pub output_path: String,
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    #[serde(default)]
    pub mode: FetchMode,
}

fn default_charset() -> String {
    "UTF-8".to_string()
}

fn default_start_offset() -> i64 {
    DEFAULT_HOURLY_START_OFFSET_MINUTES
}

fn default_repeat_interval() -> i64 {
    1
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: None,
            connect_timeout_seconds: None,
            user_agent: None,
            default_charset: default_charset(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hourly_start_offset_minutes: default_start_offset(),
            repeat_interval_hours: default_repeat_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn hourly_start_offset(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.hourly_start_offset_minutes)
    }

    pub fn repeat_interval(&self) -> chrono::Duration {
        chrono::Duration::hours(self.repeat_interval_hours)
    }
}

impl JobConfig {
    /// True when the staleness interval is a whole multiple of the trigger
    /// period. The run stamped at one tick is then still up to date at the
    /// next tick (the boundary is inclusive), so ticks get skipped.
    pub fn skips_ticks(&self, schedule: &ScheduleConfig) -> bool {
        let period = u64::try_from(schedule.repeat_interval().num_seconds()).unwrap_or(0);
        period > 0 && self.interval_seconds >= period && self.interval_seconds % period == 0
    }
}

impl RefreshConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| RefreshError::ConfigParse {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| RefreshError::ConfigParse {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${FEED_TOKEN})，未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| RefreshError::ConfigParse {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

impl Validate for HttpConfig {
    fn validate(&self) -> Result<()> {
        if let Some(timeout) = self.timeout_seconds {
            validation::validate_range("http.timeout_seconds", timeout, 1, 86_400)?;
        }
        if let Some(timeout) = self.connect_timeout_seconds {
            validation::validate_range("http.connect_timeout_seconds", timeout, 1, 3_600)?;
        }
        if let Some(agent) = &self.user_agent {
            validation::validate_non_empty_string("http.user_agent", agent)?;
        }
        HeaderCharsetResolver::from_label(&self.default_charset)?;
        Ok(())
    }
}

impl Validate for ScheduleConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_range(
            "schedule.hourly_start_offset_minutes",
            self.hourly_start_offset_minutes,
            0,
            24 * 60,
        )?;
        validation::validate_range(
            "schedule.repeat_interval_hours",
            self.repeat_interval_hours,
            1,
            24 * 7,
        )
    }
}

impl Validate for JobConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("jobs.name", &self.name)?;
        validation::validate_url("jobs.url", &self.url)?;
        validation::validate_path("jobs.output_path", &self.output_path)
    }
}

impl Validate for RefreshConfig {
    fn validate(&self) -> Result<()> {
        self.http.validate()?;
        self.schedule.validate()?;

        if self.jobs.is_empty() {
            return Err(RefreshError::MissingConfig {
                field: "jobs".to_string(),
            });
        }
        for job in &self.jobs {
            job.validate()?;
            if job.skips_ticks(&self.schedule) {
                tracing::warn!(
                    "Job {} has interval_seconds = {}, a multiple of the {}h trigger period; \
                     it will only refresh every {} ticks",
                    job.name,
                    job.interval_seconds,
                    self.schedule.repeat_interval_hours,
                    job.interval_seconds / (self.schedule.repeat_interval_hours as u64 * 3600) + 1
                );
            }
        }
        validation::validate_unique("jobs.name", self.jobs.iter().map(|job| job.name.as_str()))
    }
}
