//! Pipeline configuration from YAML
//!
//! The YAML surface covers process steps only; callable steps are a library
//! API and cannot be described declaratively.

use crate::core::pipeline::Pipeline;
use crate::core::step::ProcessStep;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Ignore step failures pipeline-wide
    #[serde(default)]
    pub ignore_failure: bool,

    /// Log file receiving a copy of all output (append mode)
    #[serde(default)]
    pub log: Option<String>,

    /// Pipeline steps, in execution order
    pub steps: Vec<StepConfig>,
}

/// Step configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Human-readable step name
    pub name: String,

    /// Shell commands to run, in order
    pub commands: Vec<String>,

    /// Commands to run when the step is skipped instead
    #[serde(default)]
    pub skip_commands: Vec<String>,

    /// Environment overrides for this step's commands
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Suppress informational messages for this step
    #[serde(default)]
    pub silent: bool,

    /// Step-local failure policy (overrides the pipeline flag)
    #[serde(default)]
    pub ignore_failure: Option<bool>,
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_yaml::from_str(yaml).context("Failed to parse pipeline YAML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.name.is_empty(), "Pipeline name must not be empty");
        for (i, step) in self.steps.iter().enumerate() {
            anyhow::ensure!(
                !step.name.is_empty(),
                "Step {} has an empty name",
                i
            );
        }
        Ok(())
    }

    /// Build a runnable pipeline from this configuration.
    pub fn to_pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new(&self.name).ignore_failure(self.ignore_failure);

        for step in &self.steps {
            let mut process = ProcessStep::new(&step.name, step.commands.clone())
                .skip_commands(step.skip_commands.clone())
                .env(step.env.clone())
                .silent(step.silent);
            if let Some(ignore) = step.ignore_failure {
                process = process.ignore_failure(ignore);
            }
            pipeline.add_step(process);
        }

        pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_pipeline() {
        let yaml = r#"
name: "Build"
steps:
  - name: "compile"
    commands:
      - "make -j4"
  - name: "test"
    commands:
      - "make check"
    skip_commands:
      - "echo skipping tests"
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.name, "Build");
        assert!(!config.ignore_failure);
        assert_eq!(config.steps.len(), 2);
        assert_eq!(config.steps[1].skip_commands, vec!["echo skipping tests"]);
    }

    #[test]
    fn test_parse_env_and_policies() {
        let yaml = r#"
name: "Deploy"
ignore_failure: true
log: "deploy.log"
steps:
  - name: "push"
    commands: ["scp build host:"]
    env:
      SSH_AUTH_SOCK: "/tmp/agent"
    ignore_failure: false
    silent: true
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert!(config.ignore_failure);
        assert_eq!(config.log.as_deref(), Some("deploy.log"));

        let step = &config.steps[0];
        assert_eq!(step.env.get("SSH_AUTH_SOCK").unwrap(), "/tmp/agent");
        assert_eq!(step.ignore_failure, Some(false));
        assert!(step.silent);
    }

    #[test]
    fn test_to_pipeline_preserves_order_and_policy() {
        let yaml = r#"
name: "Ordered"
ignore_failure: true
steps:
  - name: "one"
    commands: ["true"]
  - name: "two"
    commands: ["true"]
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        let pipeline = config.to_pipeline();
        assert!(pipeline.ignore_failure);
        assert_eq!(pipeline.step_names(), vec!["one", "two"]);
    }

    #[test]
    fn test_invalid_yaml_is_rejected() {
        assert!(PipelineConfig::from_yaml("steps: [").is_err());
        // missing steps field
        assert!(PipelineConfig::from_yaml("name: x").is_err());
        // empty step name
        let yaml = r#"
name: "Bad"
steps:
  - name: ""
    commands: ["true"]
"#;
        assert!(PipelineConfig::from_yaml(yaml).is_err());
    }
}
