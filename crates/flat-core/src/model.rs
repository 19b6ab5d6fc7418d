use crate::error::{FlatError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

/// Constant document name written at the top of every workflow.
pub const DOCUMENT_NAME: &str = "Flat";

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTrigger {
    #[serde(default)]
    pub branches: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub cron: String,
}

/// The `on` block: which events start the workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triggers {
    #[serde(default)]
    pub workflow_dispatch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushTrigger>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

// ---------------------------------------------------------------------------
// Step configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlFormat {
    Csv,
    Json,
}

impl SqlFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SqlFormat::Csv => "csv",
            SqlFormat::Json => "json",
        }
    }
}

impl fmt::Display for SqlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SqlFormat {
    type Err = FlatError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "csv" => Ok(SqlFormat::Csv),
            "json" => Ok(SqlFormat::Json),
            _ => Err(FlatError::InvalidSqlFormat(s.to_string())),
        }
    }
}

/// Parameters of a data-fetch step. The HTTP and SQL field sets are mutually
/// exclusive; in YAML the variant is inferred from which set is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PullConfig {
    Http {
        http_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outfile_basename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        postprocessing: Option<String>,
    },
    Sql {
        sql_connstring: String,
        sql_queryfile: String,
        sql_format: SqlFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outfile_basename: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        postprocessing: Option<String>,
    },
}

impl PullConfig {
    pub fn http(url: impl Into<String>, outfile_basename: impl Into<String>) -> Self {
        PullConfig::Http {
            http_url: url.into(),
            outfile_basename: Some(outfile_basename.into()),
            postprocessing: None,
        }
    }

    pub fn sql(
        connstring: impl Into<String>,
        queryfile: impl Into<String>,
        format: SqlFormat,
        outfile_basename: impl Into<String>,
    ) -> Self {
        PullConfig::Sql {
            sql_connstring: connstring.into(),
            sql_queryfile: queryfile.into(),
            sql_format: format,
            outfile_basename: Some(outfile_basename.into()),
            postprocessing: None,
        }
    }

    pub fn outfile_basename(&self) -> Option<&str> {
        match self {
            PullConfig::Http {
                outfile_basename, ..
            }
            | PullConfig::Sql {
                outfile_basename, ..
            } => outfile_basename.as_deref(),
        }
    }
}

/// The push action has no fixed schema yet, so its `with` fields are carried
/// through as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    Checkout,
    Pull { config: PullConfig },
    Push { config: PushConfig },
    /// A step whose action this editor does not understand. Kept verbatim.
    Opaque { step: serde_yaml::Value },
}

impl Step {
    pub fn pull(config: PullConfig) -> Self {
        Step::Pull { config }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Step::Checkout => "checkout",
            Step::Pull {
                config: PullConfig::Http { .. },
            } => "pull-http",
            Step::Pull {
                config: PullConfig::Sql { .. },
            } => "pull-sql",
            Step::Push { .. } => "push",
            Step::Opaque { .. } => "opaque",
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub name: String,
    pub runs_on: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Job {
    pub fn new(name: impl Into<String>, runs_on: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runs_on: runs_on.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn remove_step(&mut self, index: usize) -> Result<Step> {
        if index >= self.steps.len() {
            return Err(FlatError::StepNotFound {
                job: self.name.clone(),
                index,
            });
        }
        Ok(self.steps.remove(index))
    }
}

// ---------------------------------------------------------------------------
// FlatState
// ---------------------------------------------------------------------------

/// The structured form of a workflow document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatState {
    pub name: String,
    #[serde(default)]
    pub on: Triggers,
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl Default for FlatState {
    fn default() -> Self {
        Self::stub()
    }
}

fn job_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid regex"))
}

/// Job names become YAML mapping keys and GitHub job ids.
pub fn is_valid_job_name(name: &str) -> bool {
    job_name_re().is_match(name)
}

fn check_job_name(name: &str) -> Result<()> {
    if is_valid_job_name(name) {
        Ok(())
    } else {
        Err(FlatError::InvalidJobName(name.to_string()))
    }
}

impl FlatState {
    /// State used when there is no prior document content.
    pub fn stub() -> Self {
        Self {
            name: DOCUMENT_NAME.to_string(),
            on: Triggers {
                workflow_dispatch: true,
                push: None,
                schedule: None,
            },
            jobs: Vec::new(),
        }
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    pub fn job_mut(&mut self, name: &str) -> Result<&mut Job> {
        self.jobs
            .iter_mut()
            .find(|j| j.name == name)
            .ok_or_else(|| FlatError::JobNotFound(name.to_string()))
    }

    pub fn add_job(&mut self, job: Job) -> Result<()> {
        check_job_name(&job.name)?;
        if self.job(&job.name).is_some() {
            return Err(FlatError::JobExists(job.name));
        }
        self.jobs.push(job);
        Ok(())
    }

    pub fn remove_job(&mut self, name: &str) -> Result<Job> {
        let pos = self
            .jobs
            .iter()
            .position(|j| j.name == name)
            .ok_or_else(|| FlatError::JobNotFound(name.to_string()))?;
        Ok(self.jobs.remove(pos))
    }

    pub fn rename_job(&mut self, from: &str, to: &str) -> Result<()> {
        check_job_name(to)?;
        if from != to && self.job(to).is_some() {
            return Err(FlatError::JobExists(to.to_string()));
        }
        self.job_mut(from)?.name = to.to_string();
        Ok(())
    }

    /// Move a job to `index`, clamped to the end of the list.
    pub fn move_job(&mut self, name: &str, index: usize) -> Result<()> {
        let job = self.remove_job(name)?;
        let index = index.min(self.jobs.len());
        self.jobs.insert(index, job);
        Ok(())
    }
}
