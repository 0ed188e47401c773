//! Configuration view and validation commands: `gatekeeper config`.

use anyhow::Result;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    use gatekeeper::config::{CONFIG_FILE, GatekeeperConfig, GatekeeperToml};

    let config = GatekeeperConfig::new(project_dir)?;
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("{}", console::style("Gatekeeper Configuration").bold().cyan());
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                println!();
                println!("{}", toml::to_string_pretty(&config.toml)?);
            } else {
                println!("No {} found at {}", CONFIG_FILE, config_path.display());
                println!("Using default configuration.");
                println!();
            }

            let project = config.project();
            let review = project.effective_review();
            println!("Effective values (with env overrides):");
            println!("  project.id = \"{}\"", project.id);
            println!("  project.name = \"{}\"", project.name);
            if project.review.is_none() {
                println!("  {}", console::style("(no review configuration; defaults apply)").dim());
            }
            println!("  review.enabled = {}", review.enabled);
            println!("  review.command = \"{}\"", review.command);
            println!("  review.max_revisions = {}", review.max_revisions);
            if let Some(model) = &review.model {
                println!("  review.model = \"{}\"", model);
            }
            if let Some(branch) = &review.base_branch {
                println!("  review.base_branch = \"{}\"", branch);
            }
            println!("  review.staged_only = {}", review.staged_only);
            println!("  review.test_timeout_secs = {}", review.test_timeout_secs);
            println!("  review.lint_timeout_secs = {}", review.lint_timeout_secs);
            println!();

            if !config_path.exists() {
                println!("Run 'gatekeeper config init' to create a {} file.", CONFIG_FILE);
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let warnings = config.toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("{}", console::style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            let project_id = config.project().id;
            GatekeeperToml::starter(&project_id).save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [project] id, name");
            println!("  - [review] command, model, max_revisions, base_branch, timeouts");
            println!("  - [review.context] which evidence goes into the prompt");
            println!();
        }
    }

    Ok(())
}
