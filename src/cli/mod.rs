//! Command-line interface for taskorder
//!
//! This module defines the CLI structure using clap derive macros.
//! Commands are grouped by concern in submodules.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;
use crate::error::Result;
use crate::item::{PlacementIntention, Scope};
use crate::orderer::Orderer;
use crate::output::OutputOptions;
use crate::rebalance::{RebalanceDispatcher, RebalanceQueue};
use crate::rebalancer::BackgroundRebalancer;
use crate::storage::Storage;
use crate::store::FileStore;

mod init;
mod item;
mod order;

/// taskorder - ordered, hierarchical task lists
///
/// Keeps a stable total order over tasks in each list and parent, with
/// randomized sparse positions and background rebalancing.
#[derive(Parser, Debug)]
#[command(name = "taskorder")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding `.taskorder/` (defaults to current directory)
    #[arg(long, global = true, env = "TASKORDER_ROOT")]
    pub root: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create `.taskorder/` and a default `.taskorder.toml`
    Init,

    /// Add an item to a list
    Add {
        /// Item title
        title: String,

        #[command(flatten)]
        scope: ScopeArgs,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    /// Reposition an item among its current siblings
    Move {
        /// Item ID
        id: String,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    /// Move an item under another parent
    Reparent {
        /// Item ID
        id: String,

        /// New parent item ID
        #[arg(long, required_unless_present = "root_level")]
        parent: Option<String>,

        /// Move the item to the top level of its list
        #[arg(long, conflicts_with = "parent")]
        root_level: bool,

        #[command(flatten)]
        placement: PlacementArgs,
    },

    /// Tombstone an item (refused while it has kept children)
    Rm {
        /// Item ID
        id: String,
    },

    /// Permanently delete every item in a list
    DropList {
        /// List ID
        list: String,
    },

    /// Show kept items in order
    Ls {
        #[command(flatten)]
        scope: ScopeArgs,

        /// Show every scope of the list, not just one sibling set
        #[arg(long, conflicts_with = "parent")]
        all: bool,
    },

    /// Report whether a sibling set needs rebalancing
    Check {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Rebalance a sibling set now
    Rebalance {
        #[command(flatten)]
        scope: ScopeArgs,
    },
}

/// `(list, parent)` selection shared by several commands
#[derive(Args, Debug, Clone)]
pub struct ScopeArgs {
    /// List ID
    #[arg(long)]
    pub list: String,

    /// Parent item ID (omit for the top level)
    #[arg(long)]
    pub parent: Option<String>,
}

impl ScopeArgs {
    pub fn scope(&self) -> Scope {
        Scope::new(self.list.clone(), self.parent.clone())
    }
}

/// Where to place the item; the end of the list when nothing is given
#[derive(Args, Debug, Clone, Default)]
pub struct PlacementArgs {
    /// Place before every sibling
    #[arg(long, conflicts_with_all = ["after", "end"])]
    pub top: bool,

    /// Place directly after this sibling
    #[arg(long, value_name = "ID", conflicts_with = "end")]
    pub after: Option<String>,

    /// Place after every sibling
    #[arg(long)]
    pub end: bool,
}

impl PlacementArgs {
    pub fn intention(&self) -> PlacementIntention {
        if self.top {
            PlacementIntention::Top
        } else if let Some(target) = &self.after {
            PlacementIntention::After(target.clone())
        } else {
            PlacementIntention::None
        }
    }
}

/// Resolved root, configuration and output flags for one invocation
pub(crate) struct Context {
    pub storage: Storage,
    pub config: Config,
    pub options: OutputOptions,
}

impl Context {
    fn open(root: Option<PathBuf>, json: bool, quiet: bool) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        let config_path = Config::path_for(&root);
        let config = if config_path.exists() {
            Config::load(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self {
            storage: Storage::new(root),
            config,
            options: OutputOptions { json, quiet },
        })
    }

    fn store(&self) -> Result<Arc<FileStore>> {
        self.storage.ensure_initialized()?;
        Ok(Arc::new(FileStore::new(self.storage.clone())))
    }

    /// Orderer whose rebalance requests are only collected, never run
    pub(crate) fn inline_orderer(&self) -> Result<(Orderer<FileStore>, Arc<RebalanceQueue>)> {
        let queue = Arc::new(RebalanceQueue::new());
        let orderer = Orderer::new(
            self.store()?,
            &self.config,
            Arc::clone(&queue) as Arc<dyn RebalanceDispatcher>,
        );
        Ok((orderer, queue))
    }

    /// Run a write with the background rebalancer attached, then flush it.
    ///
    /// The write's own result is returned even when the flush fails; the
    /// failure comes back as a warning.
    pub(crate) fn write<T, F>(&self, op: F) -> Result<(T, Vec<String>)>
    where
        F: FnOnce(&Orderer<FileStore>) -> Result<T>,
    {
        let store = self.store()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let (value, handle) = {
            let _guard = runtime.enter();
            let handle = BackgroundRebalancer::start(Arc::clone(&store), &self.config.rebalance);
            let orderer = Orderer::new(store, &self.config, Arc::new(handle.clone()));
            (op(&orderer)?, handle)
        };

        let mut warnings = Vec::new();
        if let Err(err) = runtime.block_on(handle.flush()) {
            tracing::warn!(error = %err, "background rebalance did not complete");
            warnings.push(format!("background rebalance did not complete: {err}"));
        }
        if let Err(err) = runtime.block_on(handle.shutdown()) {
            tracing::debug!(error = %err, "rebalancer already stopped");
        }

        Ok((value, warnings))
    }
}

impl Cli {
    /// Execute the CLI command
    pub fn run(self) -> Result<()> {
        let ctx = Context::open(self.root, self.json, self.quiet)?;
        match self.command {
            Commands::Init => init::run(&ctx),
            Commands::Add {
                title,
                scope,
                placement,
            } => item::run_add(
                &ctx,
                item::AddOptions {
                    title,
                    scope,
                    placement,
                },
            ),
            Commands::Move { id, placement } => {
                item::run_move(&ctx, item::MoveOptions { id, placement })
            }
            Commands::Reparent {
                id,
                parent,
                root_level,
                placement,
            } => item::run_reparent(
                &ctx,
                item::ReparentOptions {
                    id,
                    parent: parent.filter(|_| !root_level),
                    placement,
                },
            ),
            Commands::Rm { id } => item::run_rm(&ctx, &id),
            Commands::DropList { list } => item::run_drop_list(&ctx, &list),
            Commands::Ls { scope, all } => order::run_ls(&ctx, order::LsOptions { scope, all }),
            Commands::Check { scope } => order::run_check(&ctx, &scope.scope()),
            Commands::Rebalance { scope } => order::run_rebalance(&ctx, &scope.scope()),
        }
    }
}
