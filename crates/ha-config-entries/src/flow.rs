//! Config and options flows
//!
//! A flow is a small state machine that collects user input one step at a
//! time and finishes by creating (or updating) a config entry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::entry::{ConfigEntry, ConfigEntryUpdate};
use crate::manager::{ConfigEntries, ConfigEntriesError};

/// User input submitted to a step
pub type FlowData = HashMap<String, Value>;

/// Errors raised while driving a flow
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),

    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Entries(#[from] ConfigEntriesError),
}

/// Input widget type of a form field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum FieldType {
    String,
    Password,
    Boolean,
    Integer,
    Select(Vec<String>),
    MultiSelect(Vec<String>),
}

/// One field of a form step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowField {
    pub key: String,
    #[serde(flatten)]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FlowField {
    pub fn required(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            field_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            required: false,
            ..Self::required(key, field_type)
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Outcome of one flow step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show a form; `errors` maps a field (or `base`) to an error key
    Form {
        step_id: String,
        schema: Vec<FlowField>,
        errors: HashMap<String, String>,
    },
    /// Finish and create an entry (or, for options flows, store options)
    CreateEntry {
        title: String,
        data: FlowData,
        options: FlowData,
    },
    /// Stop without creating anything
    Abort { reason: String },
}

impl FlowResult {
    pub fn form(step_id: impl Into<String>, schema: Vec<FlowField>) -> Self {
        FlowResult::Form {
            step_id: step_id.into(),
            schema,
            errors: HashMap::new(),
        }
    }

    /// A form showing a single error under `base`
    pub fn form_error(
        step_id: impl Into<String>,
        schema: Vec<FlowField>,
        error: impl Into<String>,
    ) -> Self {
        FlowResult::Form {
            step_id: step_id.into(),
            schema,
            errors: HashMap::from([("base".to_string(), error.into())]),
        }
    }

    pub fn create_entry(title: impl Into<String>, data: FlowData) -> Self {
        FlowResult::CreateEntry {
            title: title.into(),
            data,
            options: FlowData::new(),
        }
    }

    pub fn abort(reason: impl Into<String>) -> Self {
        FlowResult::Abort {
            reason: reason.into(),
        }
    }

    /// Error keys of a form result
    pub fn errors(&self) -> Option<&HashMap<String, String>> {
        match self {
            FlowResult::Form { errors, .. } => Some(errors),
            _ => None,
        }
    }
}

/// Deserialize step input into a typed struct
pub fn parse_input<T: DeserializeOwned>(input: FlowData) -> Result<T, FlowError> {
    serde_json::to_value(input)
        .and_then(serde_json::from_value)
        .map_err(|e| FlowError::InvalidInput(e.to_string()))
}

/// Onboarding flow of an integration
///
/// The first step is `user`. Input `None` asks the flow to render the form
/// for `step_id`.
#[async_trait]
pub trait ConfigFlow: Send {
    async fn step(&mut self, step_id: &str, input: Option<FlowData>)
        -> Result<FlowResult, FlowError>;

    /// Unique id chosen so far; duplicates abort with `already_configured`
    fn unique_id(&self) -> Option<String> {
        None
    }
}

/// Options flow of an existing entry; the first step is `init`
#[async_trait]
pub trait OptionsFlow: Send {
    async fn step(
        &mut self,
        entry: &ConfigEntry,
        step_id: &str,
        input: Option<FlowData>,
    ) -> Result<FlowResult, FlowError>;
}

/// Result of driving a flow one step
#[derive(Debug, Clone)]
pub struct FlowStep {
    pub flow_id: String,
    pub result: FlowResult,
    /// Entry created or updated by a finishing step
    pub entry: Option<ConfigEntry>,
}

enum Handler {
    Config {
        domain: String,
        flow: Box<dyn ConfigFlow>,
    },
    Options {
        entry_id: String,
        flow: Box<dyn OptionsFlow>,
    },
}

struct ActiveFlow {
    step_id: String,
    handler: Handler,
}

/// Tracks in-progress flows and turns finished ones into entries
pub struct FlowManager {
    entries: Arc<ConfigEntries>,
    flows: Mutex<HashMap<String, ActiveFlow>>,
}

impl FlowManager {
    pub fn new(entries: Arc<ConfigEntries>) -> Self {
        Self {
            entries,
            flows: Mutex::new(HashMap::new()),
        }
    }

    pub fn entries(&self) -> &Arc<ConfigEntries> {
        &self.entries
    }

    /// Start a config flow at its `user` step
    #[instrument(skip(self, flow))]
    pub async fn init(
        &self,
        domain: &str,
        flow: Box<dyn ConfigFlow>,
    ) -> Result<FlowStep, FlowError> {
        let active = ActiveFlow {
            step_id: "user".to_string(),
            handler: Handler::Config {
                domain: domain.to_string(),
                flow,
            },
        };
        self.run(ulid::Ulid::new().to_string(), active, None).await
    }

    /// Start an options flow for `entry_id` at its `init` step
    #[instrument(skip(self, flow))]
    pub async fn init_options(
        &self,
        entry_id: &str,
        flow: Box<dyn OptionsFlow>,
    ) -> Result<FlowStep, FlowError> {
        if self.entries.get(entry_id).is_none() {
            return Err(ConfigEntriesError::NotFound(entry_id.to_string()).into());
        }
        let active = ActiveFlow {
            step_id: "init".to_string(),
            handler: Handler::Options {
                entry_id: entry_id.to_string(),
                flow,
            },
        };
        self.run(ulid::Ulid::new().to_string(), active, None).await
    }

    /// Submit input to the current step of a flow
    #[instrument(skip(self, input))]
    pub async fn configure(&self, flow_id: &str, input: FlowData) -> Result<FlowStep, FlowError> {
        let active = self
            .flows
            .lock()
            .await
            .remove(flow_id)
            .ok_or_else(|| FlowError::UnknownFlow(flow_id.to_string()))?;
        self.run(flow_id.to_string(), active, Some(input)).await
    }

    /// Drop an in-progress flow
    pub async fn abort(&self, flow_id: &str) -> bool {
        self.flows.lock().await.remove(flow_id).is_some()
    }

    /// Number of flows waiting for input
    pub async fn in_progress(&self) -> usize {
        self.flows.lock().await.len()
    }

    async fn run(
        &self,
        flow_id: String,
        mut active: ActiveFlow,
        input: Option<FlowData>,
    ) -> Result<FlowStep, FlowError> {
        let result = match &mut active.handler {
            Handler::Config { domain, flow } => {
                let result = flow.step(&active.step_id, input).await?;
                match flow.unique_id() {
                    Some(unique_id)
                        if !matches!(result, FlowResult::Abort { .. })
                            && self.entries.find_by_unique_id(domain, &unique_id).is_some() =>
                    {
                        debug!(unique_id = %unique_id, "Flow aborted, already configured");
                        FlowResult::abort("already_configured")
                    }
                    _ => result,
                }
            }
            Handler::Options { entry_id, flow } => {
                let entry = self
                    .entries
                    .get(entry_id)
                    .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.clone()))?;
                flow.step(&entry, &active.step_id, input).await?
            }
        };

        let mut entry = None;
        match &result {
            FlowResult::Form { step_id, .. } => {
                active.step_id = step_id.clone();
                self.flows.lock().await.insert(flow_id.clone(), active);
            }
            FlowResult::CreateEntry {
                title,
                data,
                options,
            } => {
                entry = Some(self.finish(&active.handler, title, data, options)?);
            }
            FlowResult::Abort { reason } => {
                debug!(flow_id = %flow_id, reason = %reason, "Flow aborted");
            }
        }

        Ok(FlowStep {
            flow_id,
            result,
            entry,
        })
    }

    fn finish(
        &self,
        handler: &Handler,
        title: &str,
        data: &FlowData,
        options: &FlowData,
    ) -> Result<ConfigEntry, FlowError> {
        match handler {
            Handler::Config { domain, flow } => {
                let mut entry = ConfigEntry::new(domain.as_str(), title)
                    .with_data(data.clone())
                    .with_options(options.clone());
                entry.unique_id = flow.unique_id();
                let entry = self.entries.add(entry)?;
                info!(domain = %domain, "Flow created entry {}", entry.title);
                Ok(entry)
            }
            Handler::Options { entry_id, .. } => {
                let mut update = ConfigEntryUpdate::new().options(data.clone());
                if !title.is_empty() {
                    update = update.title(title);
                }
                Ok(self.entries.update(entry_id, update)?)
            }
        }
    }
}
