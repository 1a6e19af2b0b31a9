//! Task prompt rendering.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const TASK_TEMPLATE: &str = include_str!("prompts/task.md");

/// Template engine wrapper around minijinja.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("task", TASK_TEMPLATE)
            .context("load task template")?;
        Ok(Self { env })
    }

    /// Render the intent, the marker instruction and the file context.
    pub fn build(&self, intent: &str, context: &str) -> Result<String> {
        let template = self.env.get_template("task")?;
        let rendered = template
            .render(context! {
                intent => intent.trim(),
                context => (!context.trim().is_empty()).then_some(context),
            })
            .context("render task prompt")?;
        Ok(rendered)
    }
}

impl std::fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_intent_instruction_and_context() {
        let builder = PromptBuilder::new().expect("builder");
        let prompt = builder
            .build("  add a logger ", "***a.js***\n```js\nlet a;\n```")
            .expect("render");

        assert!(prompt.starts_with("### Intent\nadd a logger\n\n> IMPORTANT:"));
        assert!(prompt.contains("strong tag on its own line"));
        assert!(prompt.ends_with("e.g. ***src/main.js***\n\n***a.js***\n```js\nlet a;\n```"));
    }

    #[test]
    fn empty_context_is_omitted() {
        let builder = PromptBuilder::new().expect("builder");
        let prompt = builder.build("hello", "").expect("render");
        assert!(prompt.ends_with("e.g. ***src/main.js***"));
    }

    #[test]
    fn context_is_not_html_escaped() {
        let builder = PromptBuilder::new().expect("builder");
        let prompt = builder.build("x", "if a < b && c > d {}").expect("render");
        assert!(prompt.contains("if a < b && c > d {}"));
    }
}
