//! taskorder init command implementation
//!
//! Creates the data directory, an empty item snapshot and a default config.

use std::path::{Path, PathBuf};

use super::Context;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::{emit_success, HumanOutput};

#[derive(serde::Serialize)]
struct InitReport {
    root: PathBuf,
    created: InitCreated,
}

#[derive(serde::Serialize)]
struct InitCreated {
    config: bool,
    data_dir: bool,
    items: bool,
}

pub fn run(ctx: &Context) -> Result<()> {
    let root = ctx.storage.root().to_path_buf();

    let created_data_dir = !ctx.storage.data_dir().exists();
    let created_items = !ctx.storage.is_initialized();
    ctx.storage.init()?;
    let created_config = ensure_config(&root)?;

    let report = InitReport {
        root: root.clone(),
        created: InitCreated {
            config: created_config,
            data_dir: created_data_dir,
            items: created_items,
        },
    };

    let mut created = Vec::new();
    if created_config {
        created.push(crate::config::CONFIG_FILE);
    }
    if created_data_dir {
        created.push(".taskorder/");
    }
    if created_items {
        created.push(".taskorder/items.json");
    }

    let header = if created.is_empty() {
        "taskorder init: nothing to do".to_string()
    } else {
        "taskorder init: initialized".to_string()
    };

    let mut human = HumanOutput::new(header);
    human.push_summary("root", root.display().to_string());
    human.push_summary(
        "created",
        if created.is_empty() {
            "none".to_string()
        } else {
            created.join(", ")
        },
    );
    human.push_next_step("taskorder add <title> --list <list>");

    emit_success(ctx.options, "init", &report, Some(&human))
}

fn ensure_config(root: &Path) -> Result<bool> {
    let config_path = Config::path_for(root);
    if config_path.exists() {
        if !config_path.is_file() {
            return Err(Error::OperationFailed(format!(
                "{} exists but is not a file",
                config_path.display()
            )));
        }
        return Ok(false);
    }

    Config::default().save(&config_path)?;
    Ok(true)
}
