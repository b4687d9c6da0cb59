//! Prompt rendering for the opening messages of a run.
//!
//! Both templates are fixed at compile time. The system prompt is rendered once
//! per run from the registered task descriptions and never regenerated.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde_json::Value;

use crate::core::types::TaskDescription;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const GOAL_TEMPLATE: &str = include_str!("prompts/goal.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .context("load system template")?;
        env.add_template("goal", GOAL_TEMPLATE)
            .context("load goal template")?;
        Ok(Self { env })
    }

    /// System message listing the action protocol and available tasks.
    pub fn render_system(&self, tasks: &[TaskDescription]) -> Result<String> {
        let template = self.env.get_template("system")?;
        let rendered = template
            .render(context! { tasks => tasks })
            .context("render system prompt")?;
        Ok(rendered)
    }

    /// Opening user message carrying the goal and caller context.
    pub fn render_goal(&self, goal: &str, context: &Value) -> Result<String> {
        let context_json = serde_json::to_string(context).context("serialize run context")?;
        let template = self.env.get_template("goal")?;
        let rendered = template
            .render(context! { goal => goal, context => context_json })
            .context("render goal prompt")?;
        Ok(rendered)
    }
}
